use tokio::sync::mpsc;
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod config;
mod diagnostics;
mod events;
mod launch;
mod output;
mod platform;
mod port_alloc;
mod readiness;
mod runtime;
mod shell;
mod spawner;
mod supervisor;

use crate::shell::{ActivationGate, HeadlessShell, OpenActivationGate, TextReportRenderer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::HostConfig::from_env();
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "kiln-host.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr.and(file_writer))
        .init();

    tracing::info!(
        version = %config.version,
        engine = %config.engine_executable.display(),
        diagnostics = config.diagnostics,
        "kiln-host starting"
    );

    let first_launch = runtime::note_first_launch(&config.data_root);
    let runtime = runtime::HostRuntime::new(config);

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut gate = OpenActivationGate::new(first_launch);
    gate.request_launch_approval(&events_tx);

    let mut supervisor = supervisor::Supervisor::new(
        runtime,
        platform::host_platform(),
        Box::new(HeadlessShell::default()),
        Box::new(TextReportRenderer),
        Box::new(readiness::NoReadinessProbe),
        events_tx,
    );

    tokio::select! {
        res = supervisor.run(&mut events_rx) => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted; shutting down");
            Ok(())
        }
    }
}
