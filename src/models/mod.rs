//! Core data models for the photo store.
//!
//! These entities describe who owns what and where its bytes live.
//! They map cleanly to database tables via `sqlx::FromRow` and serialize
//! naturally as JSON via `serde`.

pub mod migration;
pub mod photo;
pub mod user;
