use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use kiln_session::LauncherToken;

use crate::config::HostConfig;
use crate::port_alloc;

pub const ABEND_LOG_FILE: &str = "kiln-abend.log";
pub const INITIAL_DOCUMENT_ENV: &str = "KILN_INITIAL_DOCUMENT";

const FIRST_LAUNCH_MARKER: &str = ".first-launch-done";

/// Process-wide lifecycle singletons, held in one context object and passed
/// explicitly instead of living as ambient globals.
///
/// Single-writer rules: the port is advanced only by the launch context
/// builder, the token is written once at construction, and the fallback
/// library path is computed once lazily.
#[derive(Debug)]
pub struct HostRuntime {
    pub config: HostConfig,
    token: LauncherToken,
    port: u16,
    fallback_library_path: OnceLock<PathBuf>,
}

impl HostRuntime {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            token: LauncherToken::generate(),
            port: 0,
            fallback_library_path: OnceLock::new(),
        }
    }

    pub fn token(&self) -> &LauncherToken {
        &self.token
    }

    pub fn current_port(&self) -> u16 {
        self.port
    }

    pub fn advance_port(&mut self) -> anyhow::Result<u16> {
        let port = port_alloc::allocate_loopback_port(self.port)?;
        self.port = port;
        Ok(port)
    }

    pub fn abend_log_path(&self) -> PathBuf {
        self.config.log_dir.join(ABEND_LOG_FILE)
    }

    /// Private directory for the loader's fallback library search, computed
    /// once for the whole host lifetime. Repeated calls return the identical
    /// path.
    pub fn fallback_library_path(&self) -> &Path {
        self.fallback_library_path.get_or_init(|| {
            let dir = self.config.data_root.join("fallback-libs");
            if let Err(err) = std::fs::create_dir_all(&dir) {
                tracing::warn!(path = %dir.display(), %err, "failed to create fallback library dir");
            }
            dir
        })
    }

    /// Unpins the initial-document association so it cannot leak into the
    /// next session.
    pub fn clear_initial_document(&self) {
        // SAFETY: called only from the single supervisor task.
        unsafe { std::env::remove_var(INITIAL_DOCUMENT_ENV) };
    }
}

/// Returns `true` exactly once per installation, then leaves a marker so
/// every later run reports `false`.
pub fn note_first_launch(data_root: &Path) -> bool {
    let marker = data_root.join(FIRST_LAUNCH_MARKER);
    if marker.exists() {
        return false;
    }
    if let Err(err) = std::fs::create_dir_all(data_root)
        .and_then(|_| std::fs::write(&marker, b"done\n"))
    {
        tracing::warn!(path = %marker.display(), %err, "failed to write first-launch marker");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &Path) -> HostConfig {
        HostConfig {
            version: "0.0.0-test".to_string(),
            engine_executable: PathBuf::from("kiln-engine"),
            config_file: None,
            diagnostics: false,
            data_root: dir.to_path_buf(),
            log_dir: dir.join("logs"),
            sleep_on_startup_secs: 0,
            exit_on_startup_code: 0,
            output_buffer_max_bytes: 64 * 1024,
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kiln-runtime-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn fallback_library_path_is_idempotent() {
        let dir = temp_dir("fallback");
        let runtime = HostRuntime::new(test_config(&dir));
        let first = runtime.fallback_library_path().to_path_buf();
        let second = runtime.fallback_library_path().to_path_buf();
        assert_eq!(first, second);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn token_is_stable_for_the_runtime_lifetime() {
        let dir = temp_dir("token");
        let runtime = HostRuntime::new(test_config(&dir));
        assert_eq!(runtime.token(), runtime.token());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn first_launch_is_reported_once() {
        let dir = temp_dir("first-launch");
        let root = dir.join("root");
        assert!(note_first_launch(&root));
        assert!(!note_first_launch(&root));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn clear_initial_document_round_trips() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var(INITIAL_DOCUMENT_ENV, "/tmp/notebook.kiln") };
        let dir = temp_dir("initial-doc");
        let runtime = HostRuntime::new(test_config(&dir));
        runtime.clear_initial_document();
        assert!(std::env::var(INITIAL_DOCUMENT_ENV).is_err());
        runtime.clear_initial_document();
        assert!(std::env::var(INITIAL_DOCUMENT_ENV).is_err());
        let _ = std::fs::remove_dir_all(dir);
    }
}
