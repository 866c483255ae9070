//! Run sessions and cooperative cancellation.
//!
//! Exactly one session is current per [`SessionRegistry`]. Beginning a new session cancels
//! the previous one's token, and the superseded run notices at its next check
//! (tier boundary or dimension start).

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// Token identifying one pipeline invocation
#[derive(Debug, Clone)]
pub struct RunSession {
    id: String,
    token: CancellationToken,
}

impl RunSession {
    /// Session not tracked by any registry; valid until [`RunSession::cancel`] is called.
    pub fn detached(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Still the current session?
    pub fn is_valid(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Tracks which session is current
#[derive(Debug, Default)]
pub struct SessionRegistry {
    current: Mutex<Option<RunSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session with a fresh id, superseding the current one
    pub fn begin(&self) -> RunSession {
        self.begin_with_id(format!("bootstrap-{}", Uuid::new_v4()))
    }

    pub fn begin_with_id(&self, id: impl Into<String>) -> RunSession {
        let session = RunSession::detached(id);
        let previous = self.current.lock().replace(session.clone());

        if let Some(previous) = previous {
            info!("Session {} superseded by {}", previous.id(), session.id());
            previous.cancel();
        }

        session
    }

    pub fn is_session_valid(&self, session_id: &str) -> bool {
        self.current
            .lock()
            .as_ref()
            .map_or(false, |s| s.id() == session_id && s.is_valid())
    }

    pub fn current_id(&self) -> Option<String> {
        self.current.lock().as_ref().map(|s| s.id().to_string())
    }
}
