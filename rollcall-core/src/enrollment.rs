//! Transient enrollment records reported by the LMS.

use crate::ids::LmsCourseId;
use crate::name::normalize_display_name;

/// One enrollment as reported by the LMS.
///
/// Never persisted. Used to build a roster at registration time and to
/// confirm membership at verification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub course_id: LmsCourseId,
    /// LMS login identifier of the enrolled user.
    pub external_id: String,
    /// Full name as reported by the LMS.
    pub name: String,
}

impl Enrollment {
    /// Normalized display name, if the LMS reported a non-empty name.
    pub fn display_name(&self) -> Option<String> {
        normalize_display_name(&self.name)
    }
}

/// Why an enrollment was accepted as proof of membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipProof {
    /// The external id is in the roster captured at registration.
    Roster {
        external_id: String,
        display_name: Option<String>,
    },
    /// The LMS reported an enrollment in the bound course id.
    CourseBinding {
        external_id: String,
        display_name: Option<String>,
    },
}

impl MembershipProof {
    pub fn external_id(&self) -> &str {
        match self {
            Self::Roster { external_id, .. } | Self::CourseBinding { external_id, .. } => {
                external_id
            }
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        match self {
            Self::Roster { display_name, .. } | Self::CourseBinding { display_name, .. } => {
                display_name.as_deref()
            }
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Roster { .. } => "roster",
            Self::CourseBinding { .. } => "course_binding",
        }
    }
}
