//! Enrollment verification.
//!
//! A member walks `Initiated -> CredentialObtained -> EnrollmentConfirmed ->
//! RoleGranted`, or stops at the first failed gate with a [`Rejection`].
//! The handshake is only consumed once enrollment is confirmed, so an LMS
//! outage or a wrong account leaves the member's link usable.

use std::fmt;
use std::sync::Arc;

use rollcall_core::{
    Course, Credential, GuildId, HandshakeError, HandshakeToken, MembershipProof, RoleId,
    SubjectId,
};
use tokio_stream::StreamExt;
use url::Url;

use crate::lms::{CodeExchange, LmsApi, LmsError};
use crate::roles::RoleGrantSink;
use crate::store::{ConfigStore, HandshakeStore, HandshakeStoreError, StoreError};

/// LMS OAuth application settings.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: Credential,
    /// Externally reachable base URL of this service.
    pub public_url: Url,
}

impl OAuthSettings {
    /// Callback URL carrying the guild and subject.
    ///
    /// Used verbatim for both the authorize request and the code exchange,
    /// since the LMS requires the two to match.
    pub fn redirect_uri(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
    ) -> Result<Url, Rejection> {
        let mut url = self
            .public_url
            .join("canvas-callback")
            .map_err(|e| Rejection::Internal(format!("bad public url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("guild_id", guild_id.as_str())
            .append_pair("discord_user_id", subject_id.as_str());
        Ok(url)
    }
}

/// Verification progress, recorded in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initiated,
    CredentialObtained,
    EnrollmentConfirmed,
    RoleGranted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initiated => "initiated",
            Self::CredentialObtained => "credential_obtained",
            Self::EnrollmentConfirmed => "enrollment_confirmed",
            Self::RoleGranted => "role_granted",
        })
    }
}

/// Why a verification attempt was turned away.
#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("no pending verification for this member")]
    HandshakeNotFound,

    #[error("verification link is invalid")]
    InvalidToken,

    #[error("a verification link was already issued for this member")]
    HandshakePending,

    #[error("verification link belongs to a different server")]
    GuildMismatch,

    #[error("no course is registered for this server")]
    NoCourseRegistered,

    #[error("not enrolled in the registered course")]
    NotEnrolled,

    /// LMS failure. Nothing was consumed, the member may retry.
    #[error("LMS unavailable: {0}")]
    Transient(#[source] LmsError),

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<HandshakeStoreError> for Rejection {
    fn from(e: HandshakeStoreError) -> Self {
        match e {
            HandshakeStoreError::Store(e) => Self::Store(e),
            HandshakeStoreError::Handshake(HandshakeError::Conflict) => Self::HandshakePending,
            HandshakeStoreError::Handshake(HandshakeError::InvalidToken) => Self::InvalidToken,
            HandshakeStoreError::Handshake(_) => Self::HandshakeNotFound,
        }
    }
}

/// A callback from the LMS authorize step.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub subject_id: SubjectId,
    pub guild_id: GuildId,
    /// The handshake token, returned by the LMS as OAuth `state`.
    pub token: HandshakeToken,
    /// Authorization code from the LMS.
    pub code: String,
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified {
        role_id: RoleId,
        display_name: Option<String>,
        /// False when the role grant call failed after the decision.
        role_granted: bool,
        /// False when no name was known or the nickname call failed.
        nickname_applied: bool,
    },
    /// The member already held the role; nothing was granted.
    AlreadyVerified { role_id: RoleId },
}

/// Decides and enacts enrollment verification.
#[derive(Clone)]
pub struct VerificationEngine {
    courses: Arc<dyn ConfigStore>,
    handshakes: Arc<dyn HandshakeStore>,
    lms: Arc<dyn LmsApi>,
    roles: Arc<dyn RoleGrantSink>,
    oauth: OAuthSettings,
}

impl VerificationEngine {
    pub fn new(
        courses: Arc<dyn ConfigStore>,
        handshakes: Arc<dyn HandshakeStore>,
        lms: Arc<dyn LmsApi>,
        roles: Arc<dyn RoleGrantSink>,
        oauth: OAuthSettings,
    ) -> Self {
        Self {
            courses,
            handshakes,
            lms,
            roles,
            oauth,
        }
    }

    /// Start verification: the guild must have a course, then a handshake
    /// token is issued for the member.
    pub async fn begin(
        &self,
        subject_id: &SubjectId,
        guild_id: &GuildId,
    ) -> Result<HandshakeToken, Rejection> {
        require_present("subject id", subject_id.is_blank())?;
        require_present("guild id", guild_id.is_blank())?;

        if !self.courses.exists(guild_id).await? {
            tracing::info!(guild_id = %guild_id, "Verification requested for unregistered guild");
            return Err(Rejection::NoCourseRegistered);
        }

        let token = self.handshakes.issue(subject_id, guild_id).await?;
        tracing::info!(
            subject_id = %subject_id,
            guild_id = %guild_id,
            stage = %Stage::Initiated,
            "Verification started"
        );
        Ok(token)
    }

    /// Check a member's token and build the LMS login URL for them.
    ///
    /// The token is passed as OAuth `state` so the callback is bound to it.
    pub async fn authorize_redirect(
        &self,
        subject_id: &SubjectId,
        token: &HandshakeToken,
    ) -> Result<Url, Rejection> {
        require_present("subject id", subject_id.is_blank())?;
        require_present("token", token.as_str().trim().is_empty())?;

        let guild_id = self.handshakes.check(subject_id, token).await?;
        let redirect_uri = self.oauth.redirect_uri(&guild_id, subject_id)?;

        self.lms
            .authorize_url(&self.oauth.client_id, redirect_uri.as_str(), token.as_str())
            .map_err(|e| Rejection::Internal(e.to_string()))
    }

    /// Run the callback half of the flow.
    pub async fn verify(
        &self,
        request: VerificationRequest,
    ) -> Result<VerificationOutcome, Rejection> {
        let VerificationRequest {
            subject_id,
            guild_id,
            token,
            code,
        } = request;

        require_present("subject id", subject_id.is_blank())?;
        require_present("guild id", guild_id.is_blank())?;
        require_present("token", token.as_str().trim().is_empty())?;
        require_present("authorization code", code.trim().is_empty())?;

        // Initiated
        let bound_guild = self.handshakes.check(&subject_id, &token).await?;
        if bound_guild != guild_id {
            tracing::warn!(
                subject_id = %subject_id,
                guild_id = %guild_id,
                bound_guild = %bound_guild,
                "Callback guild does not match handshake"
            );
            return Err(Rejection::GuildMismatch);
        }

        let course = self
            .courses
            .get(&guild_id)
            .await?
            .ok_or(Rejection::NoCourseRegistered)?;

        // CredentialObtained
        let redirect_uri = self.oauth.redirect_uri(&guild_id, &subject_id)?;
        let access_token = self
            .lms
            .exchange_code(&CodeExchange {
                code: &code,
                client_id: &self.oauth.client_id,
                client_secret: &self.oauth.client_secret,
                redirect_uri: redirect_uri.as_str(),
            })
            .await
            .map_err(|e| transient(&subject_id, Stage::Initiated, e))?;
        tracing::debug!(
            subject_id = %subject_id,
            stage = %Stage::CredentialObtained,
            "Code exchanged"
        );

        // EnrollmentConfirmed
        let proof = self.confirm_enrollment(&subject_id, &course, &access_token).await?;
        tracing::info!(
            subject_id = %subject_id,
            guild_id = %guild_id,
            external_id = %proof.external_id(),
            matched_by = proof.kind(),
            stage = %Stage::EnrollmentConfirmed,
            "Enrollment confirmed"
        );

        // Consuming here makes a replayed callback lose the race.
        self.handshakes.redeem(&subject_id, &token).await?;

        // Looked up only for a member who just proved enrollment.
        let role_id = course.authorized_role_id.clone();
        if self.holds_role(&guild_id, &subject_id, &role_id).await {
            tracing::info!(subject_id = %subject_id, role_id = %role_id, "Member already verified");
            return Ok(VerificationOutcome::AlreadyVerified { role_id });
        }

        Ok(self.grant(&guild_id, &subject_id, role_id, &proof).await)
    }

    /// Walk the member's enrollments until one matches the course.
    async fn confirm_enrollment(
        &self,
        subject_id: &SubjectId,
        course: &Course,
        access_token: &Credential,
    ) -> Result<MembershipProof, Rejection> {
        let mut enrollments = self.lms.fetch_own_enrollments(access_token);
        let mut seen = 0usize;

        while let Some(item) = enrollments.next().await {
            let enrollment =
                item.map_err(|e| transient(subject_id, Stage::CredentialObtained, e))?;
            seen += 1;
            if let Some(proof) = course.admits(&enrollment) {
                return Ok(proof);
            }
        }

        tracing::info!(
            subject_id = %subject_id,
            guild_id = %course.guild_id,
            enrollments = seen,
            "Member not enrolled in registered course"
        );
        Err(Rejection::NotEnrolled)
    }

    /// Unknown counts as not held, so a failed lookup still grants.
    async fn holds_role(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
        role_id: &RoleId,
    ) -> bool {
        match self.roles.member_roles(guild_id, subject_id).await {
            Ok(roles) => roles.contains(role_id),
            Err(e) => {
                tracing::warn!(
                    subject_id = %subject_id,
                    guild_id = %guild_id,
                    error = %e,
                    "Could not read member roles"
                );
                false
            }
        }
    }

    /// Best-effort side effects. Failures are reported, never raised.
    async fn grant(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
        role_id: RoleId,
        proof: &MembershipProof,
    ) -> VerificationOutcome {
        let role_granted = match self.roles.grant_role(guild_id, subject_id, &role_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    subject_id = %subject_id,
                    guild_id = %guild_id,
                    role_id = %role_id,
                    error = %e,
                    "Failed to grant role"
                );
                false
            }
        };

        let display_name = proof.display_name().map(str::to_string);
        let nickname_applied = match &display_name {
            Some(name) => match self.roles.set_display_name(guild_id, subject_id, name).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        subject_id = %subject_id,
                        guild_id = %guild_id,
                        error = %e,
                        "Failed to set display name"
                    );
                    false
                }
            },
            None => false,
        };

        tracing::info!(
            subject_id = %subject_id,
            guild_id = %guild_id,
            role_granted,
            nickname_applied,
            stage = %Stage::RoleGranted,
            "Verification complete"
        );

        VerificationOutcome::Verified {
            role_id,
            display_name,
            role_granted,
            nickname_applied,
        }
    }
}

fn require_present(field: &str, blank: bool) -> Result<(), Rejection> {
    if blank {
        Err(Rejection::Validation(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

fn transient(subject_id: &SubjectId, stage: Stage, e: LmsError) -> Rejection {
    tracing::warn!(subject_id = %subject_id, stage = %stage, error = %e, "LMS call failed");
    Rejection::Transient(e)
}
