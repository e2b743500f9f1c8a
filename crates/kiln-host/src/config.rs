use std::path::PathBuf;

const DEFAULT_OUTPUT_BUFFER_MAX_BYTES: usize = 256 * 1024;

pub(crate) fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}

pub(crate) fn env_i32(name: &str) -> Option<i32> {
    std::env::var(name).ok().and_then(|v| v.parse::<i32>().ok())
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

pub(crate) fn clamp_output_buffer_bytes(v: u64) -> usize {
    v.clamp(4 * 1024, 16 * 1024 * 1024) as usize
}

pub fn output_buffer_max_bytes() -> usize {
    env_u64("KILN_OUTPUT_BUFFER_MAX_BYTES")
        .map(clamp_output_buffer_bytes)
        .unwrap_or(DEFAULT_OUTPUT_BUFFER_MAX_BYTES)
}

pub fn data_root() -> PathBuf {
    let raw = std::env::var("KILN_DATA_ROOT").unwrap_or_else(|_| "./data".to_string());
    let p = PathBuf::from(raw);
    if p.is_absolute() {
        p
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(p)
    }
}

/// Host-side configuration, resolved once at startup and handed to every
/// component explicitly.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub version: String,
    pub engine_executable: PathBuf,
    pub config_file: Option<PathBuf>,
    pub diagnostics: bool,
    pub data_root: PathBuf,
    pub log_dir: PathBuf,
    /// Artificial child startup delay in seconds, for diagnostic harnesses.
    pub sleep_on_startup_secs: u64,
    /// Forced early-exit code for the child, for diagnostic harnesses.
    pub exit_on_startup_code: i32,
    pub output_buffer_max_bytes: usize,
}

impl HostConfig {
    pub fn from_env() -> Self {
        let data_root = data_root();
        let log_dir = std::env::var("KILN_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_root.join("logs"));

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            engine_executable: std::env::var("KILN_ENGINE_EXECUTABLE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("kiln-engine")),
            config_file: std::env::var("KILN_CONFIG_FILE").ok().map(PathBuf::from),
            diagnostics: env_flag("KILN_DIAGNOSTICS"),
            data_root,
            log_dir,
            sleep_on_startup_secs: env_u64("KILN_SESSION_SLEEP_ON_STARTUP").unwrap_or(0),
            exit_on_startup_code: env_i32("KILN_SESSION_EXIT_ON_STARTUP").unwrap_or(0),
            output_buffer_max_bytes: output_buffer_max_bytes(),
        }
    }
}
