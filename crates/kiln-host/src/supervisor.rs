use kiln_session::{PendingQuit, SessionId, SessionState};
use tokio::sync::mpsc;

use crate::diagnostics;
use crate::events::{ExitSummary, HostEvent, OutputStream};
use crate::launch;
use crate::platform::PlatformEnv;
use crate::readiness::ReadinessProbe;
use crate::runtime::HostRuntime;
use crate::shell::{ReportRenderer, WindowShell};
use crate::spawner::{self, SessionHandle};

/// What the supervisor does with an exit event, decided from the pending
/// quit reason captured by the shell at the moment of exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitDisposition {
    /// Unexpected exit. The failure page is presented only when the
    /// workbench never finished initializing; a crash after successful use
    /// gets a live notification only.
    Crash { present_page: bool },
    Terminate,
    Relaunch { reload: bool },
}

fn disposition(pending: PendingQuit, workbench_initialized: bool) -> ExitDisposition {
    match pending {
        PendingQuit::None => ExitDisposition::Crash {
            present_page: !workbench_initialized,
        },
        PendingQuit::QuitAndExit => ExitDisposition::Terminate,
        PendingQuit::Quit => ExitDisposition::Relaunch { reload: false },
        PendingQuit::RestartAndReload => ExitDisposition::Relaunch { reload: true },
    }
}

/// Owns the single current session handle and every piece of lifecycle
/// state. All process and shell events funnel through one queue, so nothing
/// here is ever touched concurrently.
pub struct Supervisor {
    runtime: HostRuntime,
    platform: Box<dyn PlatformEnv>,
    shell: Box<dyn WindowShell>,
    renderer: Box<dyn ReportRenderer>,
    readiness: Box<dyn ReadinessProbe>,
    events_tx: mpsc::UnboundedSender<HostEvent>,
    state: SessionState,
    current: Option<SessionHandle>,
}

impl Supervisor {
    pub fn new(
        runtime: HostRuntime,
        platform: Box<dyn PlatformEnv>,
        shell: Box<dyn WindowShell>,
        renderer: Box<dyn ReportRenderer>,
        readiness: Box<dyn ReadinessProbe>,
        events_tx: mpsc::UnboundedSender<HostEvent>,
    ) -> Self {
        Self {
            runtime,
            platform,
            shell,
            renderer,
            readiness,
            events_tx,
            state: SessionState::NoSession,
            current: None,
        }
    }

    /// Consumes host events until the lifecycle reaches a terminal state:
    /// activation denied, window terminated, or a crash fully reported.
    pub async fn run(&mut self, rx: &mut mpsc::UnboundedReceiver<HostEvent>) -> anyhow::Result<()> {
        while let Some(event) = rx.recv().await {
            match event {
                HostEvent::ActivationGranted { first_launch } => {
                    if self.state != SessionState::NoSession {
                        continue;
                    }
                    if let Err(err) = self.launch(first_launch, false).await {
                        tracing::error!(%err, "first launch failed");
                        self.shell
                            .show_error_dialog(&format!("The session could not be started: {err}"));
                        return Ok(());
                    }
                }
                HostEvent::ActivationFailed(message) => {
                    tracing::error!(%message, "launch not approved");
                    self.shell.show_error_dialog(&message);
                    return Ok(());
                }
                HostEvent::SessionData {
                    session,
                    stream,
                    chunk,
                } => {
                    let Some(current) = self.current.as_mut() else {
                        continue;
                    };
                    if current.id != session {
                        continue;
                    }
                    match stream {
                        OutputStream::Stdout => current.stdout.append(chunk),
                        OutputStream::Stderr => current.stderr.append(chunk),
                    }
                }
                HostEvent::SessionFailed { session, error } => {
                    if !self.is_current(&session) {
                        continue;
                    }
                    tracing::error!(session = %session.0, %error, "engine process failed");
                    if self.handle_exit(ExitSummary::default()).await {
                        return Ok(());
                    }
                }
                HostEvent::SessionExited { session, status } => {
                    if !self.is_current(&session) {
                        continue;
                    }
                    if self.handle_exit(status).await {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    fn is_current(&self, session: &SessionId) -> bool {
        self.current.as_ref().is_some_and(|c| &c.id == session)
    }

    async fn launch(&mut self, first_launch: bool, reuse_port: bool) -> anyhow::Result<()> {
        self.state = SessionState::Launching;
        let ctx = launch::build(
            &mut self.runtime,
            self.platform.as_ref(),
            reuse_port,
            first_launch,
        )?;
        let handle = spawner::spawn(
            &self.runtime,
            self.platform.as_ref(),
            &ctx,
            self.events_tx.clone(),
        )
        .await?;
        tracing::info!(session = %handle.id.0, url = %ctx.url, "session process attached");

        self.current = Some(handle);
        self.readiness.await_ready(&ctx);
        self.shell.load_url(&ctx.url);
        self.state = SessionState::Running;
        Ok(())
    }

    /// Returns `true` when the lifecycle reached a terminal state.
    async fn handle_exit(&mut self, status: ExitSummary) -> bool {
        self.state = SessionState::Exited;
        if let Some(current) = self.current.as_mut() {
            current.exit = Some(status);
        }

        let pending = self.shell.take_pending_quit();
        tracing::info!(
            code = ?status.code,
            signal = ?status.signal,
            pending = ?pending,
            "engine session exited"
        );

        match disposition(pending, self.shell.workbench_initialized()) {
            ExitDisposition::Crash { present_page } => {
                self.shell.close_satellite_windows();
                if let Err(err) = self.shell.notify_crash(&status) {
                    // The UI may not be loaded yet.
                    tracing::debug!(%err, "crash notification not delivered");
                }
                if present_page {
                    let report = diagnostics::assemble_failure_report(
                        &self.runtime,
                        self.current.as_ref(),
                    )
                    .await;
                    let body = match self.renderer.render(&report) {
                        Ok(body) => body,
                        Err(err) => {
                            tracing::warn!(%err, "failure page rendering failed");
                            format!(
                                "The engine session ended unexpectedly (exit code {}).",
                                report.exit_code
                            )
                        }
                    };
                    self.shell.show_failure_page(&body);
                }
                true
            }
            ExitDisposition::Terminate => {
                self.shell.terminate();
                true
            }
            ExitDisposition::Relaunch { reload } => {
                if reload {
                    self.shell.close_satellite_windows();
                }
                self.runtime.clear_initial_document();
                // Old buffers never migrate into the replacement session.
                self.current = None;
                match self.launch(false, !reload).await {
                    Ok(()) => false,
                    Err(err) => {
                        tracing::error!(%err, "relaunch failed");
                        self.shell.terminate();
                        true
                    }
                }
            }
        }
    }
}
