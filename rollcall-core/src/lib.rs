//! # Rollcall Core
//!
//! Pure domain types for binding a chat guild to one LMS course and proving
//! that a guild member is enrolled in it.
//!
//! This crate is intentionally **IO-free**:
//! - No filesystem operations
//! - No network calls
//! - No logging
//!
//! Persistence, the LMS client and the role-grant collaborator live in
//! `rollcall-daemon`.
//!
//! ## Modules
//!
//! - [`ids`] - Identifier newtypes (guild, subject, role, LMS course)
//! - [`course`] - Registered courses and their roster snapshot
//! - [`enrollment`] - Transient LMS enrollment records and membership matching
//! - [`name`] - Display name normalization
//! - [`handshake`] - Single-use handshake tokens and their persisted records

pub mod course;
pub mod enrollment;
pub mod handshake;
pub mod ids;
pub mod name;

pub use course::{Course, Credential, Roster, Student};
pub use enrollment::{Enrollment, MembershipProof};
pub use handshake::{
    HandshakeError, HandshakeRecord, HandshakeToken, DEFAULT_HANDSHAKE_TTL_MINUTES,
};
pub use ids::{GuildId, LmsCourseId, RoleId, SubjectId};
pub use name::normalize_display_name;
