//! Registered courses and roster snapshots.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enrollment::{Enrollment, MembershipProof};
use crate::ids::{GuildId, LmsCourseId, RoleId};

/// A bearer secret for the LMS API.
///
/// Used both for the course credential supplied at registration and for the
/// short-lived access token obtained from an OAuth code exchange. The value
/// never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Expose the raw secret for building an `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// A student in a roster snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// LMS login identifier.
    pub external_id: String,
    /// Normalized `"<first> <last>"` name.
    pub display_name: String,
}

impl Student {
    /// Build a roster entry from an LMS enrollment.
    ///
    /// Falls back to the external id when the LMS reports no usable name.
    pub fn from_enrollment(enrollment: &Enrollment) -> Self {
        Self {
            external_id: enrollment.external_id.clone(),
            display_name: enrollment
                .display_name()
                .unwrap_or_else(|| enrollment.external_id.clone()),
        }
    }
}

/// Students of a course keyed by external id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster(BTreeMap<String, Student>);

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a student, replacing any entry with the same external id.
    pub fn insert(&mut self, student: Student) {
        self.0.insert(student.external_id.clone(), student);
    }

    pub fn contains(&self, external_id: &str) -> bool {
        self.0.contains_key(external_id)
    }

    pub fn get(&self, external_id: &str) -> Option<&Student> {
        self.0.get(external_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Student> {
        self.0.values()
    }
}

impl FromIterator<Student> for Roster {
    fn from_iter<I: IntoIterator<Item = Student>>(iter: I) -> Self {
        let mut roster = Roster::new();
        for student in iter {
            roster.insert(student);
        }
        roster
    }
}

/// An LMS course bound to a guild.
///
/// Created once at registration and never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub guild_id: GuildId,
    pub lms_course_id: LmsCourseId,
    /// Secret used to query the LMS on the course's behalf.
    pub credential: Credential,
    /// Role granted to verified members.
    pub authorized_role_id: RoleId,
    pub roster: Roster,
    pub registered_at: DateTime<Utc>,
}

impl Course {
    /// Decide whether an enrollment proves membership in this course.
    ///
    /// A roster hit wins over a course binding hit so the cached display name
    /// can be used.
    #[must_use]
    pub fn admits(&self, enrollment: &Enrollment) -> Option<MembershipProof> {
        let student = match enrollment.external_id.trim() {
            "" => None,
            id => self.roster.get(id),
        };
        if let Some(student) = student {
            return Some(MembershipProof::Roster {
                external_id: student.external_id.clone(),
                display_name: Some(student.display_name.clone()),
            });
        }

        if enrollment.course_id == self.lms_course_id {
            return Some(MembershipProof::CourseBinding {
                external_id: enrollment.external_id.clone(),
                display_name: enrollment.display_name(),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrollment(course: &str, login: &str, name: &str) -> Enrollment {
        Enrollment {
            course_id: LmsCourseId::new(course),
            external_id: login.to_string(),
            name: name.to_string(),
        }
    }

    fn course_with_roster(students: &[(&str, &str)]) -> Course {
        Course {
            guild_id: GuildId::new("G"),
            lms_course_id: LmsCourseId::new("1001"),
            credential: Credential::new("secret"),
            authorized_role_id: RoleId::new("R"),
            roster: students
                .iter()
                .map(|(id, name)| Student {
                    external_id: id.to_string(),
                    display_name: name.to_string(),
                })
                .collect(),
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn roster_member_is_admitted() {
        let course = course_with_roster(&[("abc123", "Alex Chen")]);
        let proof = course
            .admits(&enrollment("9999", "abc123", "Alex B Chen"))
            .expect("roster member should be admitted");

        assert_eq!(
            proof,
            MembershipProof::Roster {
                external_id: "abc123".to_string(),
                display_name: Some("Alex Chen".to_string()),
            }
        );
    }

    #[test]
    fn unknown_student_in_other_course_is_rejected() {
        let course = course_with_roster(&[("abc123", "Alex Chen")]);
        assert!(course
            .admits(&enrollment("9999", "xyz999", "Zed Young"))
            .is_none());
    }

    #[test]
    fn late_enrollee_is_admitted_by_course_binding() {
        let course = course_with_roster(&[("abc123", "Alex Chen")]);
        let proof = course
            .admits(&enrollment("1001", "new456", "Nia Q Wu"))
            .expect("bound course enrollment should be admitted");

        assert_eq!(proof.external_id(), "new456");
        assert_eq!(proof.display_name(), Some("Nia Wu"));
    }

    #[test]
    fn enrollment_without_login_matches_only_by_course() {
        let course = course_with_roster(&[("abc123", "Alex Chen")]);

        let proof = course
            .admits(&enrollment("1001", "", "Nia Q Wu"))
            .expect("bound course enrollment should be admitted");
        assert_eq!(proof.kind(), "course_binding");
        assert_eq!(proof.display_name(), Some("Nia Wu"));

        assert!(course.admits(&enrollment("9999", "", "Nia Q Wu")).is_none());
    }

    #[test]
    fn roster_deduplicates_by_external_id() {
        let roster: Roster = vec![
            Student::from_enrollment(&enrollment("1", "a1", "First Name")),
            Student::from_enrollment(&enrollment("1", "a1", "Second Name")),
        ]
        .into_iter()
        .collect();

        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get("a1").unwrap().display_name, "Second Name");
    }

    #[test]
    fn student_without_name_uses_external_id() {
        let student = Student::from_enrollment(&enrollment("1", "solo1", "   "));
        assert_eq!(student.display_name, "solo1");
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("super-secret-value");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("super-secret-value"));
    }

    #[test]
    fn roster_serializes_as_map() {
        let course = course_with_roster(&[("abc123", "Alex Chen")]);
        let json = serde_json::to_value(&course.roster).unwrap();
        assert_eq!(json["abc123"]["display_name"], "Alex Chen");
    }
}
