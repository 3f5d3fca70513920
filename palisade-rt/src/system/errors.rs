//! Runtime error types.

// Layer 1: Standard library
use std::time::Duration;

// Layer 2: Third-party
use thiserror::Error;

// Layer 3: Internal
// (none)

/// Rejection reasons on the send path.
///
/// Every variant is produced without blocking: admission either succeeds
/// immediately or fails immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The entity's mailbox is at capacity.
    #[error("mailbox full (capacity: {capacity})")]
    MailboxFull { capacity: usize },

    /// The entity is stopping or stopped and rejects new messages.
    #[error("entity is stopping")]
    ActorStopping,

    /// The hard resident cap forbids creating another entity.
    #[error("resident entity limit reached ({current}/{limit})")]
    SystemOverloaded { current: usize, limit: usize },

    /// The system is shutting down.
    #[error("system shutdown in progress")]
    ShuttingDown,
}

impl SendError {
    /// Transient rejections clear up by themselves; callers may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SendError::MailboxFull { .. } | SendError::ActorStopping
        )
    }
}

/// Failures of an ask (request with reply).
#[derive(Debug, Error)]
pub enum AskError {
    /// The message never entered the mailbox.
    #[error("request rejected: {0}")]
    Rejected(#[from] SendError),

    /// Loading the entity's persisted state failed.
    #[error("entity state load failed")]
    LoadFailed,

    /// The handler returned an error or panicked; detail is in the log.
    #[error("handler failed")]
    HandlerFailed,

    /// The entity stopped before handling the message.
    #[error("entity stopped before replying")]
    Stopped,

    /// No reply arrived within the deadline. The handler may still run;
    /// its reply will be discarded.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The reply sink was dropped without an answer (force shutdown).
    #[error("reply channel dropped")]
    Canceled,
}

impl AskError {
    /// Whether backing off and retrying is reasonable.
    pub fn is_transient(&self) -> bool {
        match self {
            AskError::Rejected(send) => send.is_transient(),
            AskError::Stopped | AskError::Timeout(_) => true,
            _ => false,
        }
    }
}

/// System-level operational errors.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Shutdown was requested more than once.
    #[error("system is not running")]
    NotRunning,

    /// Configuration validation error.
    #[error("configuration error: {0}")]
    Config(String),
}
