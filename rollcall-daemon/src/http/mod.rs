//! axum adapter over the services.
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /generate-user-token` | issue a handshake (shared secret) |
//! | `GET /verify` | form that starts the LMS login |
//! | `POST /verify` | check the handshake, redirect to the LMS |
//! | `GET /canvas-callback` | LMS OAuth callback, runs verification |
//! | `POST /courses` | register a course (shared secret) |
//! | `GET /healthz` | liveness |

mod error;
mod handlers;
pub mod page;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use rollcall_core::Credential;
use url::Url;

use crate::services::{rate_limit, RegistrationService, RequestRateLimiter, VerificationEngine};

pub use error::{ApiError, ApiResponse};

/// Header carrying the pre-shared secret.
pub const SHARED_SECRET_HEADER: &str = "x-custom-auth";

/// Shared handler state.
pub struct AppState {
    pub engine: VerificationEngine,
    pub registration: RegistrationService,
    pub shared_secret: Credential,
    /// Externally reachable base URL, ending in `/`.
    pub public_url: Url,
}

/// Build the application router.
///
/// Everything except `/healthz` sits behind the rate limiter.
pub fn router(state: Arc<AppState>, limiter: RequestRateLimiter) -> Router {
    Router::new()
        .route("/generate-user-token", post(handlers::generate_user_token))
        .route(
            "/verify",
            get(handlers::verify_page).post(handlers::verify_submit),
        )
        .route("/canvas-callback", get(handlers::canvas_callback))
        .route("/courses", post(handlers::register_course))
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
