use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every crate in the workspace.
///
/// Callers branch on the variant; the message carries the human-readable
/// reason.
#[derive(Debug, Error)]
pub enum Error {
    /// A rejected operation: empty message, disallowed extension, invalid
    /// status value, missing terms acceptance, malformed audio payload.
    #[error("{0}")]
    Validation(String),

    /// No ticket matches the given protocol, or no blob matches the handle.
    #[error("not found")]
    NotFound,

    /// Failed allow-list or PIN check. The session stays unauthenticated.
    #[error("access denied")]
    AuthDenied,

    /// Outbound notification delivery failed. Logged and dropped by the
    /// dispatcher, never propagated to the write path.
    #[error("notification transport: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(reason: impl Into<String>) -> Self {
        Error::Validation(reason.into())
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Error::Internal(err.to_string())
    }
}
