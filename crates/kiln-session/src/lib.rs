/// Identifier for one launched engine session.
///
/// NOTE: A fresh id is minted for every spawn attempt; events from a replaced
/// session carry the old id and are discarded by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared secret passed to every engine child on its command line so the
/// child can authenticate callbacks to the host.
///
/// Generated once per host run; all children of one run share the same token.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LauncherToken(pub String);

const LAUNCHER_TOKEN_LEN: usize = 8;

impl LauncherToken {
    pub fn generate() -> Self {
        let full = uuid::Uuid::new_v4().simple().to_string();
        Self(full[..LAUNCHER_TOKEN_LEN].to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SessionState {
    NoSession,
    Launching,
    Running,
    Exited,
}

/// Why the window shell expects the engine process to exit.
///
/// Read once per exit event; the shell resets it for the next cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PendingQuit {
    #[default]
    None,
    Quit,
    QuitAndExit,
    RestartAndReload,
}

/// Field mapping for the failure page shown when the engine dies before the
/// workbench ever initialized. Rendering is the shell's job; assembly ends
/// here.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailureReport {
    pub version: String,
    pub launch_failed: String,
    pub exit_code: String,
    pub process_output: String,
    pub process_error: String,
    pub log_file: String,
    pub log_content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_non_empty() {
        let id = SessionId::new();
        assert!(!id.0.is_empty());
    }

    #[test]
    fn launcher_token_is_shortened() {
        let token = LauncherToken::generate();
        assert_eq!(token.0.len(), LAUNCHER_TOKEN_LEN);
        assert!(token.0.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn launcher_tokens_are_unique_per_generate() {
        assert_ne!(LauncherToken::generate(), LauncherToken::generate());
    }

    #[test]
    fn pending_quit_defaults_to_none() {
        assert_eq!(PendingQuit::default(), PendingQuit::None);
    }
}
