//! Discord REST implementation of [`RoleGrantSink`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder};
use rollcall_core::{Credential, GuildId, RoleId, SubjectId};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{MemberAccess, RoleGrantSink, RoleSinkError};

/// Nicknames longer than this are rejected by Discord.
const MAX_NICK_CHARS: usize = 32;

/// `ADMINISTRATOR` bit of a Discord permission set.
const ADMINISTRATOR: u64 = 1 << 3;

#[derive(Debug, Deserialize)]
struct GuildMember {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GuildRole {
    id: String,
    /// Decimal string.
    #[serde(default)]
    permissions: String,
}

#[derive(Debug, Deserialize)]
struct Guild {
    id: String,
    owner_id: String,
    #[serde(default)]
    roles: Vec<GuildRole>,
}

impl Guild {
    /// Owner, or any held role (including `@everyone`, whose id is the
    /// guild id) grants `ADMINISTRATOR`.
    fn is_administrator(&self, subject_id: &SubjectId, member_roles: &[String]) -> bool {
        if self.owner_id == subject_id.as_str() {
            return true;
        }
        self.roles
            .iter()
            .filter(|role| role.id == self.id || member_roles.contains(&role.id))
            .filter_map(|role| role.permissions.parse::<u64>().ok())
            .any(|bits| bits & ADMINISTRATOR != 0)
    }
}

#[derive(Debug, Serialize)]
struct NickUpdate<'a> {
    nick: &'a str,
}

/// Talks to the Discord HTTP API as a bot.
#[derive(Clone)]
pub struct DiscordRoleSink {
    client: Client,
    api_base: Url,
}

impl DiscordRoleSink {
    pub fn new(
        api_base: Url,
        bot_token: &Credential,
        timeout: Duration,
    ) -> Result<Self, RoleSinkError> {
        let mut auth = HeaderValue::from_str(&format!("Bot {}", bot_token.expose()))
            .map_err(|e| RoleSinkError::Decode(format!("invalid bot token: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .user_agent(concat!("DiscordBot (rollcall, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()
            .map_err(RoleSinkError::Transport)?;

        Ok(Self { client, api_base })
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, RoleSinkError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| RoleSinkError::Decode(format!("invalid API base {}", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(self.client.request(method, url))
    }

    async fn member(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
    ) -> Result<GuildMember, RoleSinkError> {
        let request = self.request(
            Method::GET,
            &["guilds", guild_id.as_str(), "members", subject_id.as_str()],
        )?;
        Ok(Self::send(request).await?.json().await?)
    }

    async fn send(builder: RequestBuilder) -> Result<reqwest::Response, RoleSinkError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RoleSinkError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

/// Truncate on a char boundary.
fn clamp_nick(name: &str) -> &str {
    match name.char_indices().nth(MAX_NICK_CHARS) {
        Some((idx, _)) => &name[..idx],
        None => name,
    }
}

#[async_trait]
impl RoleGrantSink for DiscordRoleSink {
    async fn member_roles(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
    ) -> Result<Vec<RoleId>, RoleSinkError> {
        let member = self.member(guild_id, subject_id).await?;
        Ok(member.roles.into_iter().map(RoleId::new).collect())
    }

    async fn member_access(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
    ) -> Result<MemberAccess, RoleSinkError> {
        let member = self.member(guild_id, subject_id).await?;
        let request = self.request(Method::GET, &["guilds", guild_id.as_str()])?;
        let guild: Guild = Self::send(request).await?.json().await?;

        Ok(MemberAccess {
            is_administrator: guild.is_administrator(subject_id, &member.roles),
            role_ids: member.roles.into_iter().map(RoleId::new).collect(),
        })
    }

    async fn grant_role(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
        role_id: &RoleId,
    ) -> Result<(), RoleSinkError> {
        let request = self.request(
            Method::PUT,
            &[
                "guilds",
                guild_id.as_str(),
                "members",
                subject_id.as_str(),
                "roles",
                role_id.as_str(),
            ],
        )?;
        Self::send(request).await?;
        Ok(())
    }

    async fn set_display_name(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
        display_name: &str,
    ) -> Result<(), RoleSinkError> {
        let request = self
            .request(
                Method::PATCH,
                &["guilds", guild_id.as_str(), "members", subject_id.as_str()],
            )?
            .json(&NickUpdate {
                nick: clamp_nick(display_name),
            });
        Self::send(request).await?;
        Ok(())
    }
}
