use std::path::{Path, PathBuf};
use std::time::SystemTime;

use kiln_session::FailureReport;

use crate::runtime::HostRuntime;
use crate::spawner::SessionHandle;

pub const NO_ERROR_PLACEHOLDER: &str = "[No error available]";
pub const NO_LOGS_PLACEHOLDER: &str = "[No logs available]";
pub const NO_OUTPUT_PLACEHOLDER: &str = "[No output emitted]";
pub const NO_STDERR_PLACEHOLDER: &str = "[No errors emitted]";

/// Engine log files carry this marker in their name.
pub const ENGINE_LOG_MARKER: &str = "kiln-engine";

/// Generic failure code reported when the child's exit was never observed.
const UNOBSERVED_EXIT_CODE: &str = "-1";

const LOG_EXCERPT_LINES: usize = 3;

/// Abend text containing this marker is a known symptom of an engine runtime
/// that does not match the build the host shipped with. Matched as a plain
/// substring, not parsed.
const VERSION_MISMATCH_MARKER: &str = "invalid argument passed to internal function";

const VERSION_MISMATCH_HINT: &str = "\n\nThe engine reported an internal argument error. This \
usually means the installed engine runtime does not match the version this desktop build was \
packaged against; reinstalling the application normally resolves it.";

/// Reads the abnormal-termination log if present, then deletes it whether or
/// not the read succeeded. One-shot consumption.
async fn consume_abend_log(path: &Path) -> Option<String> {
    let text = tokio::fs::read_to_string(path).await.ok();
    if let Err(err) = tokio::fs::remove_file(path).await
        && err.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), %err, "failed to delete abend log");
    }
    text
}

fn pick_latest_engine_log(mut candidates: Vec<(PathBuf, SystemTime)>) -> Option<PathBuf> {
    candidates.retain(|(path, _)| {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains(ENGINE_LOG_MARKER))
    });
    candidates.sort_by(|a, b| b.1.cmp(&a.1));
    candidates.into_iter().next().map(|(path, _)| path)
}

/// Last lines of a log file, kept as a compact excerpt.
fn last_lines(text: &str, max_lines: usize) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

async fn latest_engine_log(log_dir: &Path) -> Option<(PathBuf, String)> {
    let mut entries = tokio::fs::read_dir(log_dir).await.ok()?;
    let mut candidates = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push((entry.path(), modified));
    }

    let path = pick_latest_engine_log(candidates)?;
    let text = tokio::fs::read_to_string(&path).await.ok()?;
    Some((path, last_lines(&text, LOG_EXCERPT_LINES)))
}

/// Assembles the composite failure report shown when the engine dies before
/// the workbench ever initialized. Never fails; every sub-step degrades to a
/// placeholder instead.
pub async fn assemble_failure_report(
    runtime: &HostRuntime,
    handle: Option<&SessionHandle>,
) -> FailureReport {
    let mut launch_failed = consume_abend_log(&runtime.abend_log_path())
        .await
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| NO_ERROR_PLACEHOLDER.to_string());
    if launch_failed.contains(VERSION_MISMATCH_MARKER) {
        launch_failed.push_str(VERSION_MISMATCH_HINT);
    }

    let exit_code = handle
        .and_then(|h| h.exit.as_ref())
        .and_then(|e| e.code)
        .map(|c| c.to_string())
        .unwrap_or_else(|| UNOBSERVED_EXIT_CODE.to_string());

    let process_output = handle
        .filter(|h| !h.stdout.is_empty())
        .map(|h| h.stdout.snapshot())
        .unwrap_or_else(|| NO_OUTPUT_PLACEHOLDER.to_string());
    let process_error = handle
        .filter(|h| !h.stderr.is_empty())
        .map(|h| h.stderr.snapshot())
        .unwrap_or_else(|| NO_STDERR_PLACEHOLDER.to_string());

    let (log_file, log_content) = match latest_engine_log(&runtime.config.log_dir).await {
        Some((path, excerpt)) => (path.display().to_string(), excerpt),
        None => (
            NO_LOGS_PLACEHOLDER.to_string(),
            NO_LOGS_PLACEHOLDER.to_string(),
        ),
    };

    FailureReport {
        version: runtime.config.version.clone(),
        launch_failed,
        exit_code,
        process_output,
        process_error,
        log_file,
        log_content,
    }
}
