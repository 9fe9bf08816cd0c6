//! Role grant collaborator.
//!
//! The chat platform side of verification: read a member's roles, grant the
//! authorized role, and set the member's display name.

mod discord;

use async_trait::async_trait;
use rollcall_core::{GuildId, RoleId, SubjectId};

pub use discord::DiscordRoleSink;

/// Errors from the chat platform.
#[derive(Debug, thiserror::Error)]
pub enum RoleSinkError {
    #[error("chat platform request timed out")]
    Timeout,

    #[error("chat platform request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("chat platform returned status {status}")]
    Status { status: u16 },

    #[error("malformed chat platform response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RoleSinkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e)
        }
    }
}

/// What the chat platform says about a member's standing in a guild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberAccess {
    pub role_ids: Vec<RoleId>,
    /// Guild owner, or holds a role carrying the administrator permission.
    pub is_administrator: bool,
}

#[async_trait]
pub trait RoleGrantSink: Send + Sync {
    /// Roles currently held by the member.
    async fn member_roles(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
    ) -> Result<Vec<RoleId>, RoleSinkError>;

    /// The member's roles and administrator standing, as the platform reports them.
    async fn member_access(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
    ) -> Result<MemberAccess, RoleSinkError>;

    async fn grant_role(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
        role_id: &RoleId,
    ) -> Result<(), RoleSinkError>;

    async fn set_display_name(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
        display_name: &str,
    ) -> Result<(), RoleSinkError>;
}
