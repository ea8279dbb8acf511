//! Persisted entities. Keep these structs focused on the data returned by
//! queries; business logic lives in higher layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tenant: one X account credential plus everything scoped to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub auth_token: String,
    /// The account's own platform identity, resolved lazily on first
    /// follower sync.
    pub rest_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A followed (or to-be-followed) account, keyed by (project_id, screen_name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowingUser {
    pub id: i64,
    pub project_id: i64,
    pub screen_name: String,
    pub rest_id: Option<String>,
    pub name: Option<String>,
    pub profile_image_url: Option<String>,
    pub followers_count: Option<i64>,
    pub friends_count: Option<i64>,
    pub location: Option<String>,
    pub is_following: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FetchStatus {
    Success,
    Failed,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Success => "success",
            FetchStatus::Failed => "failed",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "success" => Some(FetchStatus::Success),
            "failed" => Some(FetchStatus::Failed),
            _ => None,
        }
    }
}

/// One row of the append-only fetch audit trail.
#[derive(Debug, Clone)]
pub struct FetchLogRow {
    pub project_id: i64,
    pub status: FetchStatus,
    pub tweets_count: i64,
    pub error_message: Option<String>,
}
