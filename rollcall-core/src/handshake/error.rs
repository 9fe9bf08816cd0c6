//! Handshake error types.

/// Errors produced while issuing or redeeming a handshake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum HandshakeError {
    /// The subject already holds a live handshake.
    #[error("a handshake is already pending for this subject")]
    Conflict,

    /// A handshake exists but the presented token does not match it.
    #[error("invalid token")]
    InvalidToken,

    /// No live handshake exists for the subject.
    #[error("no pending handshake")]
    NotFound,
}
