//! # Rollcall Daemon
//!
//! Binds chat guilds to LMS courses and grants a role to members who prove
//! enrollment through the LMS OAuth flow.
//!
//! Decision logic lives in [`services`]; [`store`], [`lms`] and [`roles`] are
//! the collaborators it is built from, injected as trait objects so tests can
//! substitute fakes. [`http`] is a thin axum adapter over the services.

pub mod config;
pub mod http;
pub mod lms;
pub mod roles;
pub mod services;
pub mod store;
