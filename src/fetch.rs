//! The ingestion engine: per-project timeline fetch with deduplicated
//! persistence, single-page follower sync, rate-limited bulk follow, and the
//! all-projects sweep orchestrator.
//!
//! Everything here is strictly sequential. The only suspension points are the
//! remote calls and the explicit pacing delays; pacing is a parameter so
//! tests never wait. Per-unit failures (one project, one follow action) are
//! recorded in the aggregate result instead of aborting the run.

use std::time::Duration;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::db::{self, FetchLogRow, FetchStatus, FollowingUser, Pool};
use crate::error::{Error, Result};
use crate::extract::get_path;
use crate::normalize::{
    extract_following_page, normalize_profile, normalize_tweet, NormalizedProfile,
    NormalizedTweet,
};
use crate::xclient::{XApi, XConnector};

/// Timeline pull size per fetch.
const TIMELINE_COUNT: u32 = 500;
/// Follower-list page size.
const FOLLOWING_PAGE_SIZE: u32 = 200;

static SCREEN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/([A-Za-z0-9_]+)$").expect("screen name regex"));

/// Result of one follower-sync page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub added: i64,
    pub updated: i64,
    pub skipped: i64,
    /// Opaque continuation cursor; absent means the terminal page.
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Success,
    Failed(String),
}

/// One entry of a bulk-follow report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowResult {
    pub screen_name: String,
    pub outcome: ItemOutcome,
}

/// Aggregate result of a bulk-follow run.
#[derive(Debug, Clone, Default)]
pub struct FollowReport {
    pub total: i64,
    pub success: i64,
    pub failed: i64,
    pub results: Vec<FollowResult>,
}

/// Per-project slot of a sweep summary.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub project_id: i64,
    pub project_name: String,
    pub count: i64,
    pub error: Option<String>,
}

/// Aggregate result of one all-projects sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    pub projects: Vec<SweepOutcome>,
}

impl SweepSummary {
    pub fn succeeded(&self) -> usize {
        self.projects.iter().filter(|p| p.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.projects.len() - self.succeeded()
    }
}

/// Dedup-and-persist: store the subset of `tweets` not already known for this
/// project, in storage-friendly chunks. Existence is re-derived from storage
/// on every call; a duplicate produced by a concurrent sweep is skipped at
/// insert time. Returns the count actually inserted.
pub async fn persist_new_tweets(
    pool: &Pool,
    project_id: i64,
    tweets: &[NormalizedTweet],
) -> Result<i64> {
    if tweets.is_empty() {
        return Ok(0);
    }
    let candidates: Vec<String> = tweets
        .iter()
        .filter_map(|t| tweet_id_from_url(&t.tweet_url))
        .collect();
    let existing = db::existing_tweet_ids(pool, project_id, &candidates).await?;
    let fresh: Vec<NormalizedTweet> = tweets
        .iter()
        .filter(|t| {
            tweet_id_from_url(&t.tweet_url).is_some_and(|id| !existing.contains(&id))
        })
        .cloned()
        .collect();
    db::insert_tweets(pool, project_id, &fresh).await
}

/// The platform-assigned tweet id is the trailing path segment of the
/// canonical permalink.
fn tweet_id_from_url(url: &str) -> Option<String> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|tail| !tail.is_empty())
        .map(str::to_string)
}

/// Fetch the latest timeline for one project, persist the new tweets, and
/// append one audit row reflecting the outcome. Failures after project
/// resolution are logged as a failed row and surfaced to the caller.
pub async fn fetch_tweets_for_project(
    pool: &Pool,
    connector: &dyn XConnector,
    project_id: i64,
) -> Result<i64> {
    let project = db::get_project(pool, project_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("project {project_id}")))?;

    match fetch_and_persist(pool, connector, &project.auth_token, project_id).await {
        Ok(count) => {
            db::insert_fetch_log(
                pool,
                &FetchLogRow {
                    project_id,
                    status: FetchStatus::Success,
                    tweets_count: count,
                    error_message: None,
                },
            )
            .await?;
            Ok(count)
        }
        Err(err) => {
            db::insert_fetch_log(
                pool,
                &FetchLogRow {
                    project_id,
                    status: FetchStatus::Failed,
                    tweets_count: 0,
                    error_message: Some(err.to_string()),
                },
            )
            .await?;
            Err(err)
        }
    }
}

async fn fetch_and_persist(
    pool: &Pool,
    connector: &dyn XConnector,
    auth_token: &str,
    project_id: i64,
) -> Result<i64> {
    let api = connector.connect(auth_token).await?;
    let raw_entries = api.home_latest_timeline(TIMELINE_COUNT).await?;
    let now = Utc::now();
    let tweets: Vec<NormalizedTweet> = raw_entries
        .iter()
        .filter_map(|raw| normalize_tweet(raw, now))
        .collect();
    info!(
        project_id,
        raw = raw_entries.len(),
        normalized = tweets.len(),
        "timeline fetched"
    );
    persist_new_tweets(pool, project_id, &tweets).await
}

/// Sync one page of the project's following list from the platform, merging
/// each entry as add/update/skip. Driving further pages is the caller's job:
/// the returned cursor lets it checkpoint between pages, and an absent cursor
/// means the listing is exhausted.
pub async fn sync_following_for_project(
    pool: &Pool,
    connector: &dyn XConnector,
    project_id: i64,
    cursor: Option<&str>,
) -> Result<SyncOutcome> {
    let project = db::get_project(pool, project_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("project {project_id}")))?;
    let api = connector.connect(&project.auth_token).await?;

    // The listing protocol is keyed by identity, not credential: resolve the
    // account's own rest id once and persist it.
    let rest_id = match project.rest_id {
        Some(rest_id) => rest_id,
        None => {
            let rest_id = api.session().rest_id.ok_or_else(|| {
                Error::Authentication("could not resolve account rest id from session".into())
            })?;
            db::set_project_rest_id(pool, project_id, &rest_id).await?;
            info!(project_id, rest_id = %rest_id, "resolved account identity");
            rest_id
        }
    };

    let resp = api
        .following_page(&rest_id, FOLLOWING_PAGE_SIZE, cursor)
        .await?;
    let page = extract_following_page(&resp);

    let mut outcome = SyncOutcome {
        next_cursor: page.next_cursor,
        ..Default::default()
    };
    for raw in &page.entries {
        let Some(profile) = normalize_profile(raw) else {
            warn!(project_id, "skipping follower entry without screen name");
            outcome.skipped += 1;
            continue;
        };
        match db::get_following(pool, project_id, &profile.screen_name).await? {
            Some(existing) => {
                db::update_following_snapshot(pool, existing.id, &profile).await?;
                outcome.updated += 1;
            }
            None => {
                db::insert_following(pool, project_id, &profile).await?;
                outcome.added += 1;
            }
        }
    }
    info!(
        project_id,
        added = outcome.added,
        updated = outcome.updated,
        skipped = outcome.skipped,
        has_next = outcome.next_cursor.is_some(),
        "following page merged"
    );
    Ok(outcome)
}

/// Follow every pending user of the project, one remote call at a time with a
/// fixed delay between actions. A single failed action is recorded and does
/// not abort the remainder.
pub async fn follow_all_pending(
    pool: &Pool,
    connector: &dyn XConnector,
    project_id: i64,
    pace: Duration,
) -> Result<FollowReport> {
    let project = db::get_project(pool, project_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("project {project_id}")))?;
    let api = connector.connect(&project.auth_token).await?;

    let pending = db::list_pending_follows(pool, project_id).await?;
    let mut report = FollowReport {
        total: pending.len() as i64,
        ..Default::default()
    };

    for (i, user) in pending.iter().enumerate() {
        if i > 0 {
            sleep(pace).await;
        }
        match follow_one(pool, api.as_ref(), user).await {
            Ok(()) => {
                report.success += 1;
                report.results.push(FollowResult {
                    screen_name: user.screen_name.clone(),
                    outcome: ItemOutcome::Success,
                });
            }
            Err(err) => {
                warn!(project_id, screen_name = %user.screen_name, %err, "follow failed");
                report.failed += 1;
                report.results.push(FollowResult {
                    screen_name: user.screen_name.clone(),
                    outcome: ItemOutcome::Failed(err.to_string()),
                });
            }
        }
    }
    info!(
        project_id,
        total = report.total,
        success = report.success,
        failed = report.failed,
        "bulk follow finished"
    );
    Ok(report)
}

async fn follow_one(pool: &Pool, api: &dyn XApi, user: &FollowingUser) -> Result<()> {
    let rest_id = user
        .rest_id
        .as_deref()
        .ok_or_else(|| Error::Validation(format!("{} has no rest id", user.screen_name)))?;
    api.create_friendship(rest_id).await?;
    db::set_following_state(pool, user.id, true).await?;
    Ok(())
}

/// Sweep every project once, in order, isolating per-project failures and
/// pacing between projects. Both the on-demand trigger and the daily schedule
/// run exactly this function.
pub async fn sweep_all_projects(
    pool: &Pool,
    connector: &dyn XConnector,
    pace: Duration,
) -> Result<SweepSummary> {
    let projects = db::list_projects(pool).await?;
    let mut summary = SweepSummary::default();

    for (i, project) in projects.iter().enumerate() {
        if i > 0 {
            sleep(pace).await;
        }
        info!(project_id = project.id, name = %project.name, "fetching project");
        match fetch_tweets_for_project(pool, connector, project.id).await {
            Ok(count) => {
                info!(project_id = project.id, count, "project fetch succeeded");
                summary.projects.push(SweepOutcome {
                    project_id: project.id,
                    project_name: project.name.clone(),
                    count,
                    error: None,
                });
            }
            Err(err) => {
                error!(project_id = project.id, %err, "project fetch failed");
                summary.projects.push(SweepOutcome {
                    project_id: project.id,
                    project_name: project.name.clone(),
                    count: 0,
                    error: Some(err.to_string()),
                });
            }
        }
    }
    Ok(summary)
}

/// Manually add an account to the project's following list from its profile
/// URL. The user starts unfollowed and becomes a bulk-follow candidate.
pub async fn add_following_by_url(
    pool: &Pool,
    connector: &dyn XConnector,
    project_id: i64,
    profile_url: &str,
) -> Result<FollowingUser> {
    let screen_name = extract_screen_name(profile_url)
        .ok_or_else(|| Error::Validation(format!("invalid profile URL: {profile_url}")))?;
    if db::get_following(pool, project_id, &screen_name).await?.is_some() {
        return Err(Error::Validation(format!("{screen_name} already added")));
    }
    let project = db::get_project(pool, project_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("project {project_id}")))?;

    let api = connector.connect(&project.auth_token).await?;
    let resp = api.user_by_screen_name(&screen_name).await?;
    let user_node = get_path(&resp, "data.user.result").unwrap_or(&resp);
    let mut profile: NormalizedProfile = normalize_profile(user_node).ok_or_else(|| {
        Error::RemoteProtocol(format!("user lookup for {screen_name} returned no profile"))
    })?;
    profile.is_following = false;

    db::insert_following(pool, project_id, &profile).await?;
    db::get_following(pool, project_id, &profile.screen_name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("{} vanished after insert", profile.screen_name)))
}

/// Pull the screen name out of a profile URL like `https://x.com/alice`.
fn extract_screen_name(profile_url: &str) -> Option<String> {
    let url = Url::parse(profile_url).ok()?;
    SCREEN_NAME_RE
        .captures(url.path())
        .map(|caps| caps[1].to_string())
}
