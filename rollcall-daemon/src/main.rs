//! Rollcall Daemon - LMS enrollment verification service
//!
//! Serves the verification and registration endpoints, and offers a few
//! operator commands against the local stores.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{GuildId, SubjectId};
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use rollcall_daemon::config::{ServeConfig, StoreConfig};
use rollcall_daemon::http::{router, AppState};
use rollcall_daemon::lms::CanvasClient;
use rollcall_daemon::roles::DiscordRoleSink;
use rollcall_daemon::services::{
    OAuthSettings, RegistrationService, RequestRateLimiter, VerificationEngine,
};
use rollcall_daemon::store::{
    ConfigStore, FileConfigStore, FileHandshakeStore, HandshakeStore,
};

// ============================================================================
// CLI Definition
// ============================================================================

/// Rollcall Daemon - LMS enrollment verification service
#[derive(Parser)]
#[command(name = "rollcall-daemon", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default if no command given)
    Serve,

    /// Handshake token management
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Registered course inspection
    Courses {
        #[command(subcommand)]
        action: CoursesAction,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Issue a verification token for a member
    Issue {
        /// Chat platform user id
        #[arg(long)]
        subject: String,

        /// Guild the member is verifying for
        #[arg(long)]
        guild: String,
    },

    /// Drop a member's pending token
    Revoke {
        #[arg(long)]
        subject: String,
    },

    /// Remove expired tokens
    Purge,
}

#[derive(Subcommand)]
enum CoursesAction {
    /// List registered courses (credentials are never shown)
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Token { action }) => cmd_token(action).await,
        Some(Commands::Courses { action }) => cmd_courses(action).await,
        Some(Commands::Serve) | None => cmd_serve().await,
    }
}

fn open_stores(config: &StoreConfig) -> Result<(Arc<FileConfigStore>, Arc<FileHandshakeStore>)> {
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("Failed to create data directory {}", config.data_dir.display())
    })?;

    let courses = Arc::new(FileConfigStore::new(config.courses_path()));
    let handshakes = Arc::new(FileHandshakeStore::new(
        config.handshakes_path(),
        config.handshake_ttl,
    ));
    Ok((courses, handshakes))
}

/// Handle token subcommands.
async fn cmd_token(action: TokenAction) -> Result<()> {
    let config = StoreConfig::from_env().context("Invalid store configuration")?;
    let (courses, handshakes) = open_stores(&config)?;

    match action {
        TokenAction::Issue { subject, guild } => {
            let subject = SubjectId::new(subject);
            let guild = GuildId::new(guild);

            if !courses.exists(&guild).await? {
                anyhow::bail!("No course is registered for guild {}", guild);
            }

            let token = handshakes
                .issue(&subject, &guild)
                .await
                .context("Failed to issue token")?;

            println!("Token for {} in guild {}:", subject, guild);
            println!("  {}", token.as_str());
            println!(
                "Valid for {} minutes. It is shown only once.",
                config.handshake_ttl.num_minutes()
            );
        }
        TokenAction::Revoke { subject } => {
            let subject = SubjectId::new(subject);
            if handshakes.invalidate(&subject).await? {
                println!("Revoked pending token for {}", subject);
            } else {
                println!("No pending token for {}", subject);
            }
        }
        TokenAction::Purge => {
            let purged = handshakes.purge_expired().await?;
            println!("Removed {} expired token(s)", purged);
        }
    }

    Ok(())
}

/// Handle course subcommands.
async fn cmd_courses(action: CoursesAction) -> Result<()> {
    let config = StoreConfig::from_env().context("Invalid store configuration")?;
    let (courses, _) = open_stores(&config)?;

    match action {
        CoursesAction::List => {
            let all = courses.list().await.context("Failed to read courses")?;
            if all.is_empty() {
                println!("No courses registered");
                return Ok(());
            }

            println!(
                "{:<22} {:<16} {:<22} {:>8}  REGISTERED",
                "GUILD", "COURSE", "ROLE", "STUDENTS"
            );
            for course in all {
                println!(
                    "{:<22} {:<16} {:<22} {:>8}  {}",
                    course.guild_id,
                    course.lms_course_id,
                    course.authorized_role_id,
                    course.roster.len(),
                    course.registered_at.format("%Y-%m-%d %H:%M:%S UTC"),
                );
            }
        }
    }

    Ok(())
}

/// Start the HTTP server.
async fn cmd_serve() -> Result<()> {
    let config = ServeConfig::from_env().context("Invalid configuration")?;
    let (courses, handshakes) = open_stores(&config.store)?;
    tracing::info!(path = %config.store.data_dir.display(), "Opened stores");

    match handshakes.purge_expired().await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "Purged expired handshakes at startup"),
        Err(e) => tracing::warn!(error = %e, "Could not purge expired handshakes"),
    }

    let lms = Arc::new(
        CanvasClient::new(config.lms.base_url.clone(), config.lms.timeout)
            .context("Failed to build LMS client")?
            .with_max_pages(config.lms.max_pages),
    );
    let roles = Arc::new(
        DiscordRoleSink::new(
            config.discord.api_base.clone(),
            &config.discord.bot_token,
            config.discord.timeout,
        )
        .context("Failed to build Discord client")?,
    );

    let engine = VerificationEngine::new(
        courses.clone(),
        handshakes,
        lms.clone(),
        roles.clone(),
        OAuthSettings {
            client_id: config.lms.client_id.clone(),
            client_secret: config.lms.client_secret.clone(),
            public_url: config.public_url.clone(),
        },
    );
    let registration = RegistrationService::new(
        courses,
        lms,
        roles,
        config.registration.clone(),
    );

    let state = Arc::new(AppState {
        engine,
        registration,
        shared_secret: config.shared_secret.clone(),
        public_url: config.public_url.clone(),
    });
    let limiter = RequestRateLimiter::new(config.rate_limit.per_second, config.rate_limit.burst);
    let app = router(state, limiter);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(
        addr = %config.bind,
        public_url = %config.public_url,
        lms = %config.lms.base_url,
        "Rollcall listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
