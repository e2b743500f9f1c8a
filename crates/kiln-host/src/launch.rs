use crate::platform::PlatformEnv;
use crate::runtime::HostRuntime;

pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Sentinel passed instead of a config path so the child skips its own
/// default-file discovery. A stale system-wide config left by a previous
/// install must never leak into a desktop session.
const NO_CONFIG_SENTINEL: &str = "none";

/// Launch parameters for one engine instance. Built fresh on every attempt;
/// immutable once built.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub host: String,
    pub port: u16,
    pub url: String,
    pub args: Vec<String>,
}

/// Builds the argument list and connection URL for one launch attempt.
///
/// `reuse_port == false` advances the process-wide port first; `true` keeps
/// the current value untouched. `first_launch` is supplied by the caller so
/// the builder stays reusable for relaunches.
pub fn build(
    runtime: &mut HostRuntime,
    platform: &dyn PlatformEnv,
    reuse_port: bool,
    first_launch: bool,
) -> anyhow::Result<LaunchContext> {
    if !reuse_port {
        runtime.advance_port()?;
    }
    let port = runtime.current_port();

    let mut args = Vec::new();
    args.push("--config-file".to_string());
    match &runtime.config.config_file {
        Some(path) => args.push(path.display().to_string()),
        None => args.push(NO_CONFIG_SENTINEL.to_string()),
    }
    args.push("--program-mode".to_string());
    args.push("desktop".to_string());
    args.push("--www-port".to_string());
    args.push(port.to_string());
    args.push("--launcher-token".to_string());
    args.push(runtime.token().0.clone());
    if first_launch {
        args.push("--show-help-home".to_string());
        args.push("1".to_string());
    }
    if runtime.config.diagnostics {
        args.push("--verify-installation".to_string());
        args.push("1".to_string());
    }

    platform.publish_local_peer(port);

    Ok(LaunchContext {
        host: LOOPBACK_HOST.to_string(),
        port,
        url: format!("http://{LOOPBACK_HOST}:{port}"),
        args,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::HostConfig;
    use crate::platform::host_platform;

    fn test_runtime(config_file: Option<PathBuf>, diagnostics: bool) -> HostRuntime {
        let dir = std::env::temp_dir().join(format!("kiln-launch-{}", std::process::id()));
        HostRuntime::new(HostConfig {
            version: "0.0.0-test".to_string(),
            engine_executable: PathBuf::from("kiln-engine"),
            config_file,
            diagnostics,
            data_root: dir.clone(),
            log_dir: dir.join("logs"),
            sleep_on_startup_secs: 0,
            exit_on_startup_code: 0,
            output_buffer_max_bytes: 64 * 1024,
        })
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2)
            .any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn default_args_carry_the_config_sentinel() {
        let mut runtime = test_runtime(None, false);
        let platform = host_platform();
        let ctx = build(&mut runtime, platform.as_ref(), false, false).unwrap();

        assert!(has_pair(&ctx.args, "--config-file", "none"));
        assert!(has_pair(&ctx.args, "--program-mode", "desktop"));
        assert!(has_pair(&ctx.args, "--www-port", &ctx.port.to_string()));
        assert!(has_pair(&ctx.args, "--launcher-token", &runtime.token().0));
        assert!(!ctx.args.iter().any(|a| a == "--verify-installation"));
        assert!(!ctx.args.iter().any(|a| a == "--show-help-home"));
    }

    #[test]
    fn configured_file_replaces_the_sentinel() {
        let mut runtime = test_runtime(Some(PathBuf::from("/etc/kiln/kiln.conf")), false);
        let platform = host_platform();
        let ctx = build(&mut runtime, platform.as_ref(), false, false).unwrap();
        assert!(has_pair(&ctx.args, "--config-file", "/etc/kiln/kiln.conf"));
    }

    #[test]
    fn diagnostics_mode_requests_installation_verification() {
        let mut runtime = test_runtime(None, true);
        let platform = host_platform();
        let ctx = build(&mut runtime, platform.as_ref(), false, false).unwrap();
        assert!(has_pair(&ctx.args, "--verify-installation", "1"));
    }

    #[test]
    fn first_launch_requests_the_help_home() {
        let mut runtime = test_runtime(None, false);
        let platform = host_platform();
        let ctx = build(&mut runtime, platform.as_ref(), false, true).unwrap();
        assert!(has_pair(&ctx.args, "--show-help-home", "1"));
    }

    #[test]
    fn reusing_the_port_keeps_it_stable() {
        let mut runtime = test_runtime(None, false);
        let platform = host_platform();
        let first = build(&mut runtime, platform.as_ref(), false, true).unwrap();
        let second = build(&mut runtime, platform.as_ref(), true, false).unwrap();
        assert_eq!(first.port, second.port);
        assert_eq!(second.url, format!("http://127.0.0.1:{}", first.port));
    }

    #[test]
    fn declining_port_reuse_advances_the_allocator() {
        let mut runtime = test_runtime(None, false);
        let platform = host_platform();
        let first = build(&mut runtime, platform.as_ref(), false, true).unwrap();
        let second = build(&mut runtime, platform.as_ref(), false, false).unwrap();
        assert_ne!(first.port, second.port);
    }
}
