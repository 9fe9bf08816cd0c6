//! Durable state.
//!
//! Each store is a single JSON document rewritten wholesale on every
//! mutation. The traits keep the file format out of the services so an
//! embedded database could stand in without touching them.

mod courses;
mod document;
mod handshakes;

pub use courses::{ConfigStore, FileConfigStore};
pub use document::{JsonDocument, StoreError};
pub use handshakes::{FileHandshakeStore, HandshakeStore, HandshakeStoreError};
