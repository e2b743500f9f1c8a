use kiln_session::{FailureReport, PendingQuit};
use tokio::sync::mpsc;

use crate::events::{ExitSummary, HostEvent};

/// The on-screen surface. Owned by the embedding application; the lifecycle
/// manager only drives it through this interface.
pub trait WindowShell: Send {
    fn load_url(&mut self, url: &str);

    /// Why the shell expects the engine to exit. Reading resets the value
    /// for the next cycle.
    fn take_pending_quit(&mut self) -> PendingQuit;

    fn workbench_initialized(&self) -> bool;

    /// Best-effort crash notification; the UI may not be loaded yet, so the
    /// caller ignores failures.
    fn notify_crash(&mut self, status: &ExitSummary) -> anyhow::Result<()>;

    fn close_satellite_windows(&mut self);

    fn show_failure_page(&mut self, body: &str);

    fn show_error_dialog(&mut self, message: &str);

    fn terminate(&mut self);
}

/// Gate that must approve the first engine launch.
pub trait ActivationGate: Send {
    /// Delivers exactly one `ActivationGranted` or `ActivationFailed` into
    /// the host queue.
    fn request_launch_approval(&mut self, events: &mpsc::UnboundedSender<HostEvent>);
}

/// Turns the failure-report field mapping into a displayable page.
pub trait ReportRenderer: Send {
    fn render(&self, report: &FailureReport) -> anyhow::Result<String>;
}

/// Shell used when the host runs without a windowing surface: every UI
/// action becomes a log line, and the engine's exit is always treated as
/// unexpected.
#[derive(Debug, Default)]
pub struct HeadlessShell {
    pending: PendingQuit,
    workbench_initialized: bool,
}

impl WindowShell for HeadlessShell {
    fn load_url(&mut self, url: &str) {
        tracing::info!(url, "session endpoint ready");
    }

    fn take_pending_quit(&mut self) -> PendingQuit {
        std::mem::take(&mut self.pending)
    }

    fn workbench_initialized(&self) -> bool {
        self.workbench_initialized
    }

    fn notify_crash(&mut self, status: &ExitSummary) -> anyhow::Result<()> {
        tracing::warn!(code = ?status.code, signal = ?status.signal, "engine session crashed");
        Ok(())
    }

    fn close_satellite_windows(&mut self) {}

    fn show_failure_page(&mut self, body: &str) {
        tracing::error!("engine session failed:\n{body}");
    }

    fn show_error_dialog(&mut self, message: &str) {
        tracing::error!(%message, "session error");
    }

    fn terminate(&mut self) {
        tracing::info!("window terminated");
    }
}

/// Activation gate with no licensing backend: approval is granted
/// immediately. The licensing protocol itself lives outside this crate.
#[derive(Debug)]
pub struct OpenActivationGate {
    first_launch: bool,
}

impl OpenActivationGate {
    pub fn new(first_launch: bool) -> Self {
        Self { first_launch }
    }
}

impl ActivationGate for OpenActivationGate {
    fn request_launch_approval(&mut self, events: &mpsc::UnboundedSender<HostEvent>) {
        let _ = events.send(HostEvent::ActivationGranted {
            first_launch: self.first_launch,
        });
    }
}

/// Plain-text failure page renderer.
#[derive(Debug, Default)]
pub struct TextReportRenderer;

impl ReportRenderer for TextReportRenderer {
    fn render(&self, report: &FailureReport) -> anyhow::Result<String> {
        Ok(format!(
            "The engine session ended unexpectedly.\n\n\
             Version: {}\n\
             Exit code: {}\n\n\
             Error:\n{}\n\n\
             Output:\n{}\n\n\
             Errors:\n{}\n\n\
             Log file: {}\n\
             Recent log entries:\n{}\n",
            report.version,
            report.exit_code,
            report.launch_failed,
            report.process_output,
            report.process_error,
            report.log_file,
            report.log_content,
        ))
    }
}
