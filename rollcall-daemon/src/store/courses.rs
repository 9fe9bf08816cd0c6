//! Guild to course bindings.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use rollcall_core::{Course, GuildId};

use super::document::{JsonDocument, StoreError};

/// Persistent mapping of guild to registered course.
///
/// There is no update path: a guild is bound once and the first writer wins.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, guild_id: &GuildId) -> Result<Option<Course>, StoreError>;

    async fn exists(&self, guild_id: &GuildId) -> Result<bool, StoreError> {
        Ok(self.get(guild_id).await?.is_some())
    }

    /// Store a new course. Fails with [`StoreError::Conflict`] when the guild
    /// is already bound.
    async fn append(&self, course: Course) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<Course>, StoreError>;

    /// Like [`ConfigStore::get`] but a missing guild is an error.
    async fn require(&self, guild_id: &GuildId) -> Result<Course, StoreError> {
        self.get(guild_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("guild {}", guild_id)))
    }
}

/// [`ConfigStore`] backed by `courses.json`.
pub struct FileConfigStore {
    doc: JsonDocument<BTreeMap<GuildId, Course>>,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            doc: JsonDocument::new(path),
        }
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn get(&self, guild_id: &GuildId) -> Result<Option<Course>, StoreError> {
        let mut courses = self.doc.read().await?;
        Ok(courses.remove(guild_id))
    }

    async fn append(&self, course: Course) -> Result<(), StoreError> {
        let guild_id = course.guild_id.clone();
        let roster_size = course.roster.len();

        self.doc
            .update(move |courses| {
                if courses.contains_key(&course.guild_id) {
                    return Err(StoreError::Conflict(format!("guild {}", course.guild_id)));
                }
                courses.insert(course.guild_id.clone(), course);
                Ok(())
            })
            .await?;

        tracing::info!(
            guild_id = %guild_id,
            roster_size,
            path = %self.doc.path().display(),
            "Course stored"
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Course>, StoreError> {
        Ok(self.doc.read().await?.into_values().collect())
    }
}
