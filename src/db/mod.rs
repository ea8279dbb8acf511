//! Database module: entity models and SQL repositories.
//!
//! - `model`: typed domain entities returned by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! Storage is the sole source of truth for "already exists": the engine
//! re-derives existence by querying rather than trusting in-memory state
//! across invocations.

pub mod model;
pub mod repo;

pub use model::{FetchLogRow, FetchStatus, FollowingUser, Project};
pub use repo::*;
