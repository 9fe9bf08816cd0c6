//! Single-use verification handshakes.
//!
//! A handshake binds a subject to a guild for a short window. The plaintext
//! token is handed to the subject exactly once; only its SHA-256 digest is
//! ever stored. Redeeming a handshake consumes it.

mod error;
mod record;
mod token;

pub use error::HandshakeError;
pub use record::{HandshakeRecord, DEFAULT_HANDSHAKE_TTL_MINUTES};
pub use token::HandshakeToken;
