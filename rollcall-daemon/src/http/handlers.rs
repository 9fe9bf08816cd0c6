//! Request handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use rollcall_core::{GuildId, HandshakeToken, SubjectId};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use super::error::{ApiError, ApiResponse};
use super::{page, AppState, SHARED_SECRET_HEADER};
use crate::services::{RegistrationRequest, VerificationOutcome, VerificationRequest};

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    #[serde(rename = "user-discord-id")]
    user_discord_id: Option<String>,
    #[serde(rename = "guild-discord-id")]
    guild_discord_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenIssued {
    token: String,
    verify_url: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "user-discord-id")]
    user_discord_id: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    guild_id: Option<String>,
    discord_user_id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisteredCourse {
    guild_id: String,
    course_id: String,
    roster_size: usize,
    registered_at: String,
}

/// Compare the `X-Custom-Auth` header against the shared secret in constant time.
fn require_shared_secret(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let provided = headers
        .get(SHARED_SECRET_HEADER)
        .map(|value| value.as_bytes())
        .unwrap_or_default();
    let expected = state.shared_secret.expose().as_bytes();

    if provided.is_empty() || !bool::from(provided.ct_eq(expected)) {
        tracing::warn!("Rejected request with missing or invalid shared secret");
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{} is required", field)))
}

fn failure_page(err: ApiError) -> Response {
    page::failure(err.status_code(), &err.to_string()).into_response()
}

pub async fn generate_user_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ApiResponse<TokenIssued>>, ApiError> {
    require_shared_secret(&state, &headers)?;

    let subject_id = SubjectId::new(required(query.user_discord_id, "user-discord-id")?);
    let guild_id = GuildId::new(required(query.guild_discord_id, "guild-discord-id")?);

    let token = state.engine.begin(&subject_id, &guild_id).await?;

    let mut verify_url = state
        .public_url
        .join("verify")
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to build verify url");
            ApiError::Internal
        })?;
    verify_url
        .query_pairs_mut()
        .append_pair("user-discord-id", subject_id.as_str())
        .append_pair("token", token.as_str());

    Ok(Json(ApiResponse::ok(
        "Token generated",
        TokenIssued {
            token: token.into_string(),
            verify_url: verify_url.into(),
        },
    )))
}

pub async fn verify_page(Query(params): Query<VerifyParams>) -> Response {
    match (
        required(params.user_discord_id, "user-discord-id"),
        required(params.token, "token"),
    ) {
        (Ok(subject_id), Ok(token)) => page::verify_form(&subject_id, &token).into_response(),
        (Err(e), _) | (_, Err(e)) => failure_page(e),
    }
}

pub async fn verify_submit(
    State(state): State<Arc<AppState>>,
    Form(params): Form<VerifyParams>,
) -> Response {
    let result = async {
        let subject_id = SubjectId::new(required(params.user_discord_id, "user-discord-id")?);
        let token = HandshakeToken::from_string(required(params.token, "token")?);
        let url = state.engine.authorize_redirect(&subject_id, &token).await?;
        Ok::<_, ApiError>(url)
    }
    .await;

    match result {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(e) => failure_page(e),
    }
}

pub async fn canvas_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error.as_deref() {
        tracing::info!(error = %error, "LMS login was not completed");
        return page::failure(
            StatusCode::BAD_REQUEST,
            "The LMS login was cancelled or denied. Request a new verification link to try again.",
        )
        .into_response();
    }

    let result = async {
        let subject_id = SubjectId::new(required(query.discord_user_id, "discord_user_id")?);
        let guild_id = GuildId::new(required(query.guild_id, "guild_id")?);
        let token = HandshakeToken::from_string(required(query.state, "state")?);
        let code = required(query.code, "code")?;

        let outcome = state
            .engine
            .verify(VerificationRequest {
                subject_id,
                guild_id,
                token,
                code,
            })
            .await?;
        Ok::<_, ApiError>(outcome)
    }
    .await;

    match result {
        Ok(VerificationOutcome::AlreadyVerified { .. }) => {
            page::success("You are already verified for this course.").into_response()
        }
        Ok(VerificationOutcome::Verified {
            display_name,
            role_granted,
            ..
        }) => {
            let message = match (role_granted, display_name) {
                (true, Some(name)) => format!("You are verified as {}.", name),
                (true, None) => "You are verified.".to_string(),
                (false, _) => {
                    "Your enrollment is confirmed, but the role could not be assigned yet. \
                     Ask a server moderator for help."
                        .to_string()
                }
            };
            page::success(&message).into_response()
        }
        Err(e) => failure_page(e),
    }
}

pub async fn register_course(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegistrationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RegisteredCourse>>), ApiError> {
    require_shared_secret(&state, &headers)?;

    let receipt = state.registration.register(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "Course registered",
            RegisteredCourse {
                guild_id: receipt.guild_id.to_string(),
                course_id: receipt.lms_course_id.to_string(),
                roster_size: receipt.roster_size,
                registered_at: receipt.registered_at.to_rfc3339(),
            },
        )),
    ))
}

pub async fn healthz() -> &'static str {
    "ok"
}
