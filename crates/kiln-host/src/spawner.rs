use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use kiln_session::SessionId;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::events::{ExitSummary, HostEvent, OutputStream};
use crate::launch::LaunchContext;
use crate::output::OutputBuffer;
use crate::platform::PlatformEnv;
use crate::runtime::HostRuntime;

const SLEEP_ON_STARTUP_ENV: &str = "KILN_SESSION_SLEEP_ON_STARTUP";
const EXIT_ON_STARTUP_ENV: &str = "KILN_SESSION_EXIT_ON_STARTUP";

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("engine process could not be started: {0}")]
    Start(#[source] std::io::Error),
}

/// One running (or just-terminated) engine process. Exclusively owned by the
/// supervisor and replaced, never mutated in place, on every relaunch.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    pub pid: Option<u32>,
    pub stdout: OutputBuffer,
    pub stderr: OutputBuffer,
    pub exit: Option<ExitSummary>,
}

/// Removes any abnormal-termination log left by a previous run. Runs before
/// every spawn attempt so recovery never reads a log from an unrelated
/// session.
pub fn remove_stale_abend_log(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "failed to remove stale abend log");
        }
    }
}

#[cfg(unix)]
unsafe fn set_parent_death_signal() -> std::io::Result<()> {
    // If the host dies (crash/kill), ensure the engine is terminated too.
    // NOTE: `unsafe fn` bodies are not implicitly unsafe in Rust 2024.
    #[cfg(target_os = "linux")]
    {
        let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) };
        if rc == -1 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(unix)]
fn exit_summary(status: std::process::ExitStatus) -> ExitSummary {
    use std::os::unix::process::ExitStatusExt;
    ExitSummary {
        code: status.code(),
        signal: status.signal(),
    }
}

#[cfg(not(unix))]
fn exit_summary(status: std::process::ExitStatus) -> ExitSummary {
    ExitSummary {
        code: status.code(),
        signal: None,
    }
}

#[derive(Debug, Clone, Serialize)]
struct RunManifest {
    session_id: String,
    started_at_unix_ms: u64,
    host_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
    exec: String,
    args: Vec<String>,
    url: String,
    env: BTreeMap<String, String>,
}

fn collect_safe_env() -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for key in ["KILN_DATA_ROOT", "KILN_ENGINE_HOME", "LD_LIBRARY_PATH", "PATH"] {
        if let Ok(v) = std::env::var(key) {
            let val = if key == "PATH" && v.len() > 512 {
                format!("{}…(truncated)", &v[..512])
            } else {
                v
            };
            out.insert(key.to_string(), val);
        }
    }
    out
}

async fn write_manifest(dir: &Path, manifest: &RunManifest) -> anyhow::Result<()> {
    use anyhow::Context;

    tokio::fs::create_dir_all(dir).await.context("create session dir")?;
    let path = dir.join("run.json");
    let tmp = dir.join("run.json.tmp");
    let data = serde_json::to_vec_pretty(manifest).context("serialize run.json")?;
    let mut f = tokio::fs::File::create(&tmp)
        .await
        .context("create run.json.tmp")?;
    f.write_all(&data).await.context("write run.json.tmp")?;
    f.flush().await.ok();
    tokio::fs::rename(&tmp, &path)
        .await
        .context("persist run.json")?;
    Ok(())
}

fn pump_stream(
    mut reader: impl AsyncReadExt + Unpin + Send + 'static,
    session: SessionId,
    stream: OutputStream,
    events: mpsc::UnboundedSender<HostEvent>,
) {
    tokio::spawn(async move {
        let mut buf = [0u8; 8 * 1024];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if events
                        .send(HostEvent::SessionData {
                            session: session.clone(),
                            stream,
                            chunk,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }
    });
}

/// Starts one engine process and hands its lifetime events to the supervisor
/// queue. Fails synchronously when the OS cannot create the process.
pub async fn spawn(
    runtime: &HostRuntime,
    platform: &dyn PlatformEnv,
    ctx: &LaunchContext,
    events: mpsc::UnboundedSender<HostEvent>,
) -> Result<SessionHandle, SpawnError> {
    remove_stale_abend_log(&runtime.abend_log_path());

    let config = &runtime.config;
    let mut cmd = Command::new(&config.engine_executable);
    cmd.args(&ctx.args);

    if config.sleep_on_startup_secs > 0 {
        cmd.env(SLEEP_ON_STARTUP_ENV, config.sleep_on_startup_secs.to_string());
    }
    if config.exit_on_startup_code != 0 {
        cmd.env(EXIT_ON_STARTUP_ENV, config.exit_on_startup_code.to_string());
    }

    platform.apply_preload_shim(runtime, &mut cmd);

    // Diagnostics mode shares the host's own stdio instead of capturing.
    cmd.stdin(Stdio::null());
    if config.diagnostics {
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    } else {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    }

    #[cfg(unix)]
    {
        unsafe {
            cmd.pre_exec(|| {
                // Start a new session so the whole engine process tree can be
                // signalled together.
                set_parent_death_signal()?;
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let mut child = cmd.spawn().map_err(SpawnError::Start)?;
    let id = SessionId::new();
    let pid = child.id();

    tracing::debug!(
        session = %id.0,
        pid,
        exec = %config.engine_executable.display(),
        url = %ctx.url,
        "engine process spawned"
    );

    let started_at_unix_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let manifest = RunManifest {
        session_id: id.0.clone(),
        started_at_unix_ms,
        host_version: config.version.clone(),
        pid,
        exec: config.engine_executable.display().to_string(),
        args: ctx.args.clone(),
        url: ctx.url.clone(),
        env: collect_safe_env(),
    };
    let session_dir = config.data_root.join("sessions").join(&id.0);
    if let Err(err) = write_manifest(&session_dir, &manifest).await {
        tracing::warn!(session = %id.0, %err, "failed to record launch manifest");
    }

    if let Some(out) = child.stdout.take() {
        pump_stream(out, id.clone(), OutputStream::Stdout, events.clone());
    }
    if let Some(err) = child.stderr.take() {
        pump_stream(err, id.clone(), OutputStream::Stderr, events.clone());
    }

    let wait_id = id.clone();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                let _ = events.send(HostEvent::SessionExited {
                    session: wait_id,
                    status: exit_summary(status),
                });
            }
            Err(err) => {
                let _ = events.send(HostEvent::SessionFailed {
                    session: wait_id,
                    error: err.to_string(),
                });
            }
        }
    });

    Ok(SessionHandle {
        id,
        pid,
        stdout: OutputBuffer::new(config.output_buffer_max_bytes),
        stderr: OutputBuffer::new(config.output_buffer_max_bytes),
        exit: None,
    })
}
