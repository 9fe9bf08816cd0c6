//! Persisted handshake records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::ids::GuildId;

use super::HandshakeToken;

/// Default handshake lifetime.
pub const DEFAULT_HANDSHAKE_TTL_MINUTES: i64 = 15;

/// What the handshake store keeps per subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRecord {
    token_hash: String,
    guild_id: GuildId,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl HandshakeRecord {
    /// Create a record for a freshly generated token.
    pub fn new(
        token: &HandshakeToken,
        guild_id: GuildId,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            token_hash: token.digest(),
            guild_id,
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    pub fn guild_id(&self) -> &GuildId {
        &self.guild_id
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Compare a presented token against the stored digest in constant time.
    pub fn token_matches(&self, presented: &HandshakeToken) -> bool {
        let presented = presented.digest();
        presented.as_bytes().ct_eq(self.token_hash.as_bytes()).into()
    }
}
