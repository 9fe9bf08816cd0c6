//! Identifier newtypes.
//!
//! Chat-platform ids (guilds, members, roles) and LMS course ids are all
//! carried as opaque strings. Wrapping them keeps a guild id from being passed
//! where a role id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the id is empty or only whitespace.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// A chat community (tenant). At most one course is bound to a guild.
    GuildId
);
string_id!(
    /// A guild member going through verification.
    SubjectId
);
string_id!(
    /// A guild role granted to verified members.
    RoleId
);
string_id!(
    /// The LMS identifier of a course section.
    LmsCourseId
);
