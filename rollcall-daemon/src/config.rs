//! Daemon configuration.
//!
//! Everything is read from the environment (a `.env` file is loaded first by
//! the binary). [`ServeConfig`] needs the full set; the operator subcommands
//! only need [`StoreConfig`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use rollcall_core::{Credential, RoleId, DEFAULT_HANDSHAKE_TTL_MINUTES};
use url::Url;

/// Default timeout for outbound LMS and chat platform calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default ceiling on pages followed in one enrollment listing.
pub const DEFAULT_MAX_PAGES: usize = 1000;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DISCORD_API: &str = "https://discord.com/api/v10/";

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Where the JSON documents live and how long handshakes stay valid.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub handshake_ttl: chrono::Duration,
}

impl StoreConfig {
    pub fn courses_path(&self) -> PathBuf {
        self.data_dir.join("courses.json")
    }

    pub fn handshakes_path(&self) -> PathBuf {
        self.data_dir.join("handshakes.json")
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    /// `ROLLCALL_DATA_DIR` (default: platform data dir + `rollcall`) and
    /// `HANDSHAKE_TTL` (default `15m`).
    pub fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = match get("ROLLCALL_DATA_DIR") {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("rollcall"),
        };

        let handshake_ttl = match get("HANDSHAKE_TTL") {
            Some(raw) => {
                let ttl = parse_duration(&raw).map_err(|reason| ConfigError::Invalid {
                    key: "HANDSHAKE_TTL",
                    reason,
                })?;
                chrono::Duration::from_std(ttl).map_err(|e| ConfigError::Invalid {
                    key: "HANDSHAKE_TTL",
                    reason: e.to_string(),
                })?
            }
            None => chrono::Duration::minutes(DEFAULT_HANDSHAKE_TTL_MINUTES),
        };

        Ok(Self {
            data_dir,
            handshake_ttl,
        })
    }
}

/// LMS endpoint and OAuth application credentials.
#[derive(Debug, Clone)]
pub struct LmsConfig {
    pub base_url: Url,
    pub client_id: String,
    pub client_secret: Credential,
    pub timeout: Duration,
    pub max_pages: usize,
}

/// Chat platform bot credentials for the role grant collaborator.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub api_base: Url,
    pub bot_token: Credential,
    pub timeout: Duration,
}

/// Controls applied when a guild registers a course.
#[derive(Debug, Clone, Default)]
pub struct RegistrationConfig {
    /// Institution-specific prefix prepended to submitted course ids.
    pub course_id_prefix: Option<String>,
    /// Roles whose holders may register a course without being administrators.
    pub admin_role_ids: Vec<RoleId>,
}

/// Token bucket for the public endpoints.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub per_second: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 5,
            burst: 20,
        }
    }
}

/// Everything `serve` needs.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    /// Externally reachable base URL of this service, used for redirect URIs.
    pub public_url: Url,
    /// Pre-shared secret expected in the `X-Custom-Auth` header.
    pub shared_secret: Credential,
    pub store: StoreConfig,
    pub lms: LmsConfig,
    pub discord: DiscordConfig,
    pub registration: RegistrationConfig,
    pub rate_limit: RateLimitConfig,
}

impl ServeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    /// Required:
    /// - `CANVAS_INSTALL_URL`
    /// - `CANVAS_CLIENT_ID`
    /// - `CANVAS_CLIENT_SECRET`
    /// - `AUTH_SERVER_URL`
    /// - `SHARED_SECRET`
    /// - `DISCORD_TOKEN`
    ///
    /// Optional: `PORT`, `BIND_ADDR`, `HTTP_TIMEOUT`, `LMS_MAX_PAGES`,
    /// `DISCORD_API_URL`, `CANVAS_COURSE_ID_PREFIX`, `ADMIN_ROLE_IDS`,
    /// `RATE_LIMIT_PER_SECOND`, `RATE_LIMIT_BURST`, plus the [`StoreConfig`]
    /// variables.
    pub fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let store = StoreConfig::from_lookup(get)?;

        let timeout = match get("HTTP_TIMEOUT") {
            Some(raw) => parse_duration(&raw).map_err(|reason| ConfigError::Invalid {
                key: "HTTP_TIMEOUT",
                reason,
            })?,
            None => DEFAULT_HTTP_TIMEOUT,
        };

        let port: u16 = parse_optional(get, "PORT")?.unwrap_or(DEFAULT_PORT);
        let bind = match get("BIND_ADDR") {
            Some(addr) => addr.parse().map_err(|e: std::net::AddrParseError| {
                ConfigError::Invalid {
                    key: "BIND_ADDR",
                    reason: e.to_string(),
                }
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], port)),
        };

        let lms = LmsConfig {
            base_url: parse_url("CANVAS_INSTALL_URL", &required(get, "CANVAS_INSTALL_URL")?)?,
            client_id: required(get, "CANVAS_CLIENT_ID")?,
            client_secret: Credential::new(required(get, "CANVAS_CLIENT_SECRET")?),
            timeout,
            max_pages: parse_optional(get, "LMS_MAX_PAGES")?.unwrap_or(DEFAULT_MAX_PAGES),
        };

        let discord = DiscordConfig {
            api_base: parse_url(
                "DISCORD_API_URL",
                get("DISCORD_API_URL").as_deref().unwrap_or(DEFAULT_DISCORD_API),
            )?,
            bot_token: Credential::new(required(get, "DISCORD_TOKEN")?),
            timeout,
        };

        let registration = RegistrationConfig {
            course_id_prefix: get("CANVAS_COURSE_ID_PREFIX").filter(|p| !p.trim().is_empty()),
            admin_role_ids: get("ADMIN_ROLE_IDS")
                .map(|ids| {
                    ids.split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(RoleId::from)
                        .collect()
                })
                .unwrap_or_default(),
        };

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            per_second: parse_optional(get, "RATE_LIMIT_PER_SECOND")?
                .unwrap_or(defaults.per_second),
            burst: parse_optional(get, "RATE_LIMIT_BURST")?.unwrap_or(defaults.burst),
        };

        Ok(Self {
            bind,
            public_url: parse_url("AUTH_SERVER_URL", &required(get, "AUTH_SERVER_URL")?)?,
            shared_secret: Credential::new(required(get, "SHARED_SECRET")?),
            store,
            lms,
            discord,
            registration,
            rate_limit,
        })
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn required(
    get: &dyn Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    get(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_optional<T>(
    get: &dyn Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::Invalid {
            key,
            reason: "not a base URL".to_string(),
        });
    }
    // Relative joins against a base drop its last segment unless it ends in '/'.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Parse a duration string like "10s", "15m" or "1h". A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let (num_str, unit) = if let Some(n) = s.strip_suffix("ms") {
        (n, 0)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600)
    } else {
        (s, 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {}", s))?;

    let duration = if unit == 0 {
        Duration::from_millis(num)
    } else {
        Duration::from_secs(num.saturating_mul(unit))
    };

    if duration.is_zero() {
        return Err(format!("duration must be positive: {}", s));
    }
    Ok(duration)
}
