//! Pending verification handshakes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollcall_core::{GuildId, HandshakeError, HandshakeRecord, HandshakeToken, SubjectId};

use super::document::{JsonDocument, StoreError};

/// Errors from a [`HandshakeStore`].
#[derive(Debug, thiserror::Error)]
pub enum HandshakeStoreError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Persistent mapping of subject to its single outstanding handshake.
#[async_trait]
pub trait HandshakeStore: Send + Sync {
    /// Issue a fresh token. Fails with [`HandshakeError::Conflict`] while the
    /// subject holds an unexpired one.
    async fn issue(
        &self,
        subject_id: &SubjectId,
        guild_id: &GuildId,
    ) -> Result<HandshakeToken, HandshakeStoreError>;

    /// Validate a token without consuming it. Returns the bound guild.
    async fn check(
        &self,
        subject_id: &SubjectId,
        token: &HandshakeToken,
    ) -> Result<GuildId, HandshakeStoreError>;

    /// Validate and consume a token. At most one concurrent caller succeeds.
    async fn redeem(
        &self,
        subject_id: &SubjectId,
        token: &HandshakeToken,
    ) -> Result<GuildId, HandshakeStoreError>;

    /// Drop the subject's handshake. Returns whether one existed.
    async fn invalidate(&self, subject_id: &SubjectId) -> Result<bool, HandshakeStoreError>;

    /// Drop every expired handshake. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, HandshakeStoreError>;
}

/// [`HandshakeStore`] backed by `handshakes.json`.
///
/// Only token digests are written to disk.
pub struct FileHandshakeStore {
    doc: JsonDocument<BTreeMap<SubjectId, HandshakeRecord>>,
    ttl: chrono::Duration,
}

impl FileHandshakeStore {
    pub fn new(path: impl Into<PathBuf>, ttl: chrono::Duration) -> Self {
        Self {
            doc: JsonDocument::new(path),
            ttl,
        }
    }
}

/// Expired and missing records look the same to callers.
fn validate(
    records: &BTreeMap<SubjectId, HandshakeRecord>,
    subject_id: &SubjectId,
    token: &HandshakeToken,
    now: DateTime<Utc>,
) -> Result<GuildId, HandshakeError> {
    let record = records.get(subject_id).ok_or(HandshakeError::NotFound)?;
    if record.is_expired_at(now) {
        return Err(HandshakeError::NotFound);
    }
    if !record.token_matches(token) {
        return Err(HandshakeError::InvalidToken);
    }
    Ok(record.guild_id().clone())
}

#[async_trait]
impl HandshakeStore for FileHandshakeStore {
    async fn issue(
        &self,
        subject_id: &SubjectId,
        guild_id: &GuildId,
    ) -> Result<HandshakeToken, HandshakeStoreError> {
        let ttl = self.ttl;
        let token = self
            .doc
            .update(|records| {
                let now = Utc::now();
                if let Some(existing) = records.get(subject_id) {
                    if !existing.is_expired_at(now) {
                        return Err(HandshakeStoreError::from(HandshakeError::Conflict));
                    }
                }

                let token = HandshakeToken::generate();
                let record = HandshakeRecord::new(&token, guild_id.clone(), now, ttl);
                records.insert(subject_id.clone(), record);
                Ok(token)
            })
            .await?;

        tracing::info!(subject_id = %subject_id, guild_id = %guild_id, "Handshake issued");
        Ok(token)
    }

    async fn check(
        &self,
        subject_id: &SubjectId,
        token: &HandshakeToken,
    ) -> Result<GuildId, HandshakeStoreError> {
        let records = self.doc.read().await?;
        Ok(validate(&records, subject_id, token, Utc::now())?)
    }

    async fn redeem(
        &self,
        subject_id: &SubjectId,
        token: &HandshakeToken,
    ) -> Result<GuildId, HandshakeStoreError> {
        let guild_id = self
            .doc
            .update(|records| {
                let guild_id = validate(records, subject_id, token, Utc::now())?;
                records.remove(subject_id);
                Ok::<_, HandshakeStoreError>(guild_id)
            })
            .await?;

        tracing::info!(subject_id = %subject_id, guild_id = %guild_id, "Handshake redeemed");
        Ok(guild_id)
    }

    async fn invalidate(&self, subject_id: &SubjectId) -> Result<bool, HandshakeStoreError> {
        let removed = self
            .doc
            .update(|records| Ok::<_, HandshakeStoreError>(records.remove(subject_id).is_some()))
            .await?;

        if removed {
            tracing::info!(subject_id = %subject_id, "Handshake invalidated");
        }
        Ok(removed)
    }

    async fn purge_expired(&self) -> Result<usize, HandshakeStoreError> {
        let purged = self
            .doc
            .update(|records| {
                let now = Utc::now();
                let before = records.len();
                records.retain(|_, record| !record.is_expired_at(now));
                Ok::<_, HandshakeStoreError>(before - records.len())
            })
            .await?;

        if purged > 0 {
            tracing::info!(count = purged, "Purged expired handshakes");
        }
        Ok(purged)
    }
}
