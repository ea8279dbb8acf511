//! Multi-project X (Twitter) timeline and follower sync engine.
//!
//! The engine pulls the home timeline for every configured project, normalizes
//! the platform's unstable response shapes into stable records, persists them
//! without duplication, and keeps each project's following list in sync via
//! cursor-based pagination. All remote traffic is strictly sequential and
//! paced to stay under the platform's rate limits.

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod scheduler;
pub mod xclient;

pub use error::{Error, Result};
