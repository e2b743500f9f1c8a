use tokio::process::Command;

use crate::runtime::HostRuntime;

#[cfg(target_os = "macos")]
const ENGINE_HOME_ENV: &str = "KILN_ENGINE_HOME";
#[cfg(target_os = "macos")]
const FALLBACK_LIBRARY_PATH_ENV: &str = "KILN_FALLBACK_LIBRARY_PATH";

/// Per-OS-family environment shimming, selected once at startup so the
/// supervisor and spawner never branch on the platform inline.
pub trait PlatformEnv: Send + Sync {
    /// Publishes the local peer rendezvous identifier for `port` into the
    /// process environment. Idempotent for a given port.
    fn publish_local_peer(&self, port: u16);

    /// Applies dynamic-library preload hints to the child command before it
    /// is spawned.
    fn apply_preload_shim(&self, runtime: &HostRuntime, cmd: &mut Command);
}

pub fn host_platform() -> Box<dyn PlatformEnv> {
    #[cfg(windows)]
    {
        Box::new(WindowsEnv)
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(MacEnv)
    }
    #[cfg(not(any(windows, target_os = "macos")))]
    {
        Box::new(PosixEnv)
    }
}

/// Named-channel rendezvous identifier shared by the child and its
/// descendants.
#[cfg(any(test, windows))]
pub(crate) fn local_peer_name(port: u16) -> String {
    format!(r"\\.\pipe\kiln-{port}")
}

/// Unions the private fallback directory with any pre-existing loader search
/// path instead of overwriting it.
#[cfg(any(test, target_os = "macos"))]
pub(crate) fn union_search_path(fallback: &std::path::Path, existing: Option<&str>) -> String {
    match existing {
        Some(prior) if !prior.is_empty() => format!("{}:{prior}", fallback.display()),
        _ => fallback.display().to_string(),
    }
}

#[cfg(windows)]
struct WindowsEnv;

#[cfg(windows)]
impl PlatformEnv for WindowsEnv {
    fn publish_local_peer(&self, port: u16) {
        // SAFETY: called only from the single supervisor task.
        unsafe { std::env::set_var("KILN_LOCAL_PEER", local_peer_name(port)) };
    }

    fn apply_preload_shim(&self, _runtime: &HostRuntime, _cmd: &mut Command) {}
}

#[cfg(target_os = "macos")]
struct MacEnv;

#[cfg(target_os = "macos")]
impl PlatformEnv for MacEnv {
    fn publish_local_peer(&self, _port: u16) {}

    fn apply_preload_shim(&self, runtime: &HostRuntime, cmd: &mut Command) {
        // The hardened runtime's lazy symbol binding is not enough for the
        // engine's interpreter plugin; force-load the runtime library when it
        // is present under the engine home.
        if let Ok(home) = std::env::var(ENGINE_HOME_ENV) {
            let lib = std::path::Path::new(&home)
                .join("lib")
                .join("libkiln-engine.dylib");
            if lib.exists() {
                cmd.env("DYLD_INSERT_LIBRARIES", &lib);
            }
        }

        let fallback = runtime.fallback_library_path();
        cmd.env(FALLBACK_LIBRARY_PATH_ENV, fallback);
        let existing = std::env::var("DYLD_FALLBACK_LIBRARY_PATH").ok();
        cmd.env(
            "DYLD_FALLBACK_LIBRARY_PATH",
            union_search_path(fallback, existing.as_deref()),
        );
    }
}

#[cfg(not(any(windows, target_os = "macos")))]
struct PosixEnv;

#[cfg(not(any(windows, target_os = "macos")))]
impl PlatformEnv for PosixEnv {
    fn publish_local_peer(&self, _port: u16) {}

    fn apply_preload_shim(&self, _runtime: &HostRuntime, _cmd: &mut Command) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_peer_name_embeds_the_port() {
        assert_eq!(local_peer_name(8787), r"\\.\pipe\kiln-8787");
    }

    #[test]
    fn union_search_path_prepends_to_existing_value() {
        let fallback = std::path::Path::new("/opt/kiln/fallback-libs");
        assert_eq!(
            union_search_path(fallback, Some("/usr/local/lib")),
            "/opt/kiln/fallback-libs:/usr/local/lib"
        );
    }

    #[test]
    fn union_search_path_stands_alone_without_existing_value() {
        let fallback = std::path::Path::new("/opt/kiln/fallback-libs");
        assert_eq!(union_search_path(fallback, None), "/opt/kiln/fallback-libs");
        assert_eq!(
            union_search_path(fallback, Some("")),
            "/opt/kiln/fallback-libs"
        );
    }
}
