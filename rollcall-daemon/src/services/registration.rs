//! Course registration.
//!
//! Binding a guild to a course pulls the full roster first. If the LMS
//! refuses the credential or course id, nothing is stored. The requester's
//! standing is read from the chat platform, never from the request body.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rollcall_core::{
    Course, Credential, GuildId, LmsCourseId, RoleId, Roster, Student, SubjectId,
};
use serde::Deserialize;
use tokio_stream::StreamExt;

use crate::config::RegistrationConfig;
use crate::lms::{LmsApi, LmsError};
use crate::roles::{MemberAccess, RoleGrantSink, RoleSinkError};
use crate::store::{ConfigStore, StoreError};

/// The member asking to register a course.
///
/// Only the id is taken from the caller. Any other fields in the body are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Requester {
    pub subject_id: SubjectId,
}

/// Who may register a course for a guild.
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    admin_role_ids: Vec<RoleId>,
}

impl AdminPolicy {
    pub fn new(admin_role_ids: Vec<RoleId>) -> Self {
        Self { admin_role_ids }
    }

    /// Administrators always pass; otherwise the requester needs one of the
    /// configured admin roles.
    pub fn permits(&self, access: &MemberAccess) -> bool {
        access.is_administrator
            || access
                .role_ids
                .iter()
                .any(|role| self.admin_role_ids.contains(role))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub guild_id: GuildId,
    pub credential: Credential,
    pub course_id: LmsCourseId,
    pub role_id: RoleId,
    pub requester: Requester,
}

/// What was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationReceipt {
    pub guild_id: GuildId,
    pub lms_course_id: LmsCourseId,
    pub roster_size: usize,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("requester is not allowed to register a course")]
    Unauthorized,

    #[error("a course is already registered for this server")]
    Conflict,

    #[error("LMS rejected the roster request: {0}")]
    Upstream(#[source] LmsError),

    /// The requester's standing could not be read.
    #[error("chat platform lookup failed: {0}")]
    Platform(#[source] RoleSinkError),

    #[error("storage failure: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for RegistrationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => Self::Conflict,
            other => Self::Store(other),
        }
    }
}

/// Onboards a guild/course binding.
#[derive(Clone)]
pub struct RegistrationService {
    courses: Arc<dyn ConfigStore>,
    lms: Arc<dyn LmsApi>,
    roles: Arc<dyn RoleGrantSink>,
    policy: AdminPolicy,
    course_id_prefix: Option<String>,
}

impl RegistrationService {
    pub fn new(
        courses: Arc<dyn ConfigStore>,
        lms: Arc<dyn LmsApi>,
        roles: Arc<dyn RoleGrantSink>,
        config: RegistrationConfig,
    ) -> Self {
        Self {
            courses,
            lms,
            roles,
            policy: AdminPolicy::new(config.admin_role_ids),
            course_id_prefix: config.course_id_prefix,
        }
    }

    pub async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<RegistrationReceipt, RegistrationError> {
        let RegistrationRequest {
            guild_id,
            credential,
            course_id,
            role_id,
            requester,
        } = request;

        validate("guild id", guild_id.is_blank())?;
        validate("credential", credential.is_blank())?;
        validate("course id", course_id.is_blank())?;
        validate("role id", role_id.is_blank())?;

        self.authorize(&guild_id, &requester).await?;

        if self.courses.exists(&guild_id).await? {
            return Err(RegistrationError::Conflict);
        }

        let lms_course_id = self.qualify(course_id);
        let roster = self.pull_roster(&credential, &lms_course_id).await?;
        if roster.is_empty() {
            tracing::warn!(
                guild_id = %guild_id,
                course_id = %lms_course_id,
                "Registering course with an empty roster"
            );
        }

        let course = Course {
            guild_id: guild_id.clone(),
            lms_course_id: lms_course_id.clone(),
            credential,
            authorized_role_id: role_id,
            roster,
            registered_at: Utc::now(),
        };
        let receipt = RegistrationReceipt {
            guild_id,
            lms_course_id,
            roster_size: course.roster.len(),
            registered_at: course.registered_at,
        };

        self.courses.append(course).await?;

        tracing::info!(
            guild_id = %receipt.guild_id,
            course_id = %receipt.lms_course_id,
            roster_size = receipt.roster_size,
            requester = %requester.subject_id,
            "Course registered"
        );
        Ok(receipt)
    }

    async fn authorize(
        &self,
        guild_id: &GuildId,
        requester: &Requester,
    ) -> Result<(), RegistrationError> {
        validate("requester id", requester.subject_id.is_blank())?;

        let access = match self.roles.member_access(guild_id, &requester.subject_id).await {
            Ok(access) => access,
            Err(RoleSinkError::Status { status: 404 }) => MemberAccess::default(),
            Err(e) => {
                tracing::warn!(
                    guild_id = %guild_id,
                    requester = %requester.subject_id,
                    error = %e,
                    "Could not read requester standing"
                );
                return Err(RegistrationError::Platform(e));
            }
        };

        if !self.policy.permits(&access) {
            tracing::warn!(
                guild_id = %guild_id,
                requester = %requester.subject_id,
                "Unauthorized course registration attempt"
            );
            return Err(RegistrationError::Unauthorized);
        }
        Ok(())
    }

    fn qualify(&self, course_id: LmsCourseId) -> LmsCourseId {
        let raw = course_id.as_str().trim();
        match &self.course_id_prefix {
            Some(prefix) if !raw.starts_with(prefix.as_str()) => {
                LmsCourseId::new(format!("{}{}", prefix, raw))
            }
            _ => LmsCourseId::new(raw),
        }
    }

    async fn pull_roster(
        &self,
        credential: &Credential,
        course_id: &LmsCourseId,
    ) -> Result<Roster, RegistrationError> {
        let mut enrollments = self.lms.fetch_enrollments(credential, course_id);
        let mut roster = Roster::new();

        while let Some(item) = enrollments.next().await {
            let enrollment = item.map_err(|e| {
                tracing::warn!(course_id = %course_id, error = %e, "Roster pull failed");
                RegistrationError::Upstream(e)
            })?;
            roster.insert(Student::from_enrollment(&enrollment));
        }

        Ok(roster)
    }
}

fn validate(field: &str, blank: bool) -> Result<(), RegistrationError> {
    if blank {
        Err(RegistrationError::Validation(format!("{} is required", field)))
    } else {
        Ok(())
    }
}
