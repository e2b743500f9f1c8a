use kiln_session::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// How a child ended: an exit code, a terminating signal, or neither when
/// the OS never reported one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitSummary {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// Everything the supervisor reacts to, delivered on one queue so lifecycle
/// state is only ever touched from a single task.
#[derive(Debug)]
pub enum HostEvent {
    ActivationGranted { first_launch: bool },
    ActivationFailed(String),
    SessionData {
        session: SessionId,
        stream: OutputStream,
        chunk: String,
    },
    /// Fires at most once per session handle.
    SessionExited {
        session: SessionId,
        status: ExitSummary,
    },
    /// OS-level failure after spawn: the process could not be waited on.
    SessionFailed {
        session: SessionId,
        error: String,
    },
}
