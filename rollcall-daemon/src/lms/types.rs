//! Canvas wire types.

use rollcall_core::{Enrollment, LmsCourseId};
use serde::Deserialize;

/// Body of a successful `/login/oauth2/token` response.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Canvas sends ids as numbers, some proxies and fixtures as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireId {
    Number(u64),
    Text(String),
}

impl WireId {
    fn into_course_id(self) -> LmsCourseId {
        match self {
            Self::Number(n) => LmsCourseId::new(n.to_string()),
            Self::Text(s) => LmsCourseId::new(s),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserRecord {
    #[serde(default)]
    pub login_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// One element of an enrollments listing.
#[derive(Debug, Deserialize)]
pub(crate) struct EnrollmentRecord {
    #[serde(default)]
    pub course_id: Option<WireId>,
    #[serde(default)]
    pub user: Option<UserRecord>,
}

impl EnrollmentRecord {
    /// Convert to a domain enrollment.
    ///
    /// A course listing (`scope` set) needs a login id for every record, since
    /// the roster is keyed by it. A member's own listing only needs a course
    /// id; a missing login id becomes an empty external id, which can still
    /// match by course but never by roster.
    pub fn into_enrollment(self, scope: Option<&LmsCourseId>) -> Option<Enrollment> {
        let (login_id, name) = match self.user {
            Some(user) => (
                user.login_id.filter(|id| !id.trim().is_empty()),
                user.name.unwrap_or_default(),
            ),
            None => (None, String::new()),
        };

        let external_id = match (login_id, scope) {
            (Some(id), _) => id,
            (None, None) => String::new(),
            (None, Some(_)) => return None,
        };
        let course_id = match (self.course_id, scope) {
            (Some(id), _) => id.into_course_id(),
            (None, Some(scope)) => scope.clone(),
            (None, None) => return None,
        };

        Some(Enrollment {
            course_id,
            external_id,
            name,
        })
    }
}
