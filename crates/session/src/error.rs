use std::io;
use std::path::PathBuf;

use sessionkit_core::HostError;
use thiserror::Error;

/// Error type for session capture, restore and persistence.
/// 工作階段擷取、還原與持久化時可能出現的錯誤。
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session \"{name}\" not found at {}", path.display())]
    NotFound { name: String, path: PathBuf },
    #[error("session file IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid session payload in {}: {source}", path.display())]
    InvalidPayload {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed session: {0}")]
    Structural(String),
    #[error("no session name given and no session is attached")]
    MissingName,
    #[error("invalid session name: {0:?}")]
    InvalidName(String),
    #[error("unknown hook point: {0}")]
    UnknownHook(String),
    #[error("{0}")]
    Misuse(String),
    #[error(transparent)]
    Host(#[from] HostError),
}

impl SessionError {
    /// `true` for the not-found class, which callers may choose to silence.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound { .. })
    }
}
