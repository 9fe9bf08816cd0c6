//! Handshake token generation and hashing.

use std::fmt;

use base64::prelude::*;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes in a token.
const TOKEN_BYTES: usize = 32;

/// A plaintext handshake token.
///
/// Generated from 32 bytes of OS entropy and encoded as URL-safe base64 so it
/// can travel in query strings and OAuth `state` parameters unchanged.
#[derive(Clone, PartialEq, Eq)]
pub struct HandshakeToken(String);

impl HandshakeToken {
    #[must_use]
    pub fn generate() -> Self {
        let mut random = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut random);
        Self(BASE64_URL_SAFE_NO_PAD.encode(random))
    }

    /// Wrap a token presented by a client.
    pub fn from_string(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Hex-encoded SHA-256 of the token. This is the only form persisted.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Debug for HandshakeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HandshakeToken(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_unique() {
        let a = HandshakeToken::generate();
        let b = HandshakeToken::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn generated_token_is_url_safe() {
        let token = HandshakeToken::generate();
        // 32 bytes without padding
        assert_eq!(token.as_str().len(), 43);
        assert!(token
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn digest_is_stable_hex() {
        let token = HandshakeToken::from_string("abc");
        assert_eq!(
            token.digest(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn debug_hides_token() {
        let token = HandshakeToken::from_string("plaintext-token");
        assert!(!format!("{:?}", token).contains("plaintext-token"));
    }
}
