use std::collections::HashSet;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use super::model::{FetchLogRow, FollowingUser, Project};
use crate::error::Result;
use crate::normalize::{NormalizedProfile, NormalizedTweet};

pub type Pool = SqlitePool;

/// Storage batch limit for tweet inserts.
const INSERT_CHUNK: usize = 100;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(sqlx::Error::from)?;
    Ok(())
}

fn project_from_row(row: &SqliteRow) -> Project {
    Project {
        id: row.get("id"),
        name: row.get("name"),
        auth_token: row.get("auth_token"),
        rest_id: row.get("rest_id"),
        created_at: row.get("created_at"),
    }
}

fn following_from_row(row: &SqliteRow) -> FollowingUser {
    FollowingUser {
        id: row.get("id"),
        project_id: row.get("project_id"),
        screen_name: row.get("screen_name"),
        rest_id: row.get("rest_id"),
        name: row.get("name"),
        profile_image_url: row.get("profile_image_url"),
        followers_count: row.get("followers_count"),
        friends_count: row.get("friends_count"),
        location: row.get("location"),
        is_following: row.get::<i64, _>("is_following") != 0,
        created_at: row.get("created_at"),
    }
}

#[instrument(skip_all)]
pub async fn create_project(pool: &Pool, name: &str, auth_token: &str) -> Result<i64> {
    let rec = sqlx::query("INSERT INTO projects (name, auth_token) VALUES (?, ?) RETURNING id")
        .bind(name)
        .bind(auth_token)
        .fetch_one(pool)
        .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn list_projects(pool: &Pool) -> Result<Vec<Project>> {
    let rows = sqlx::query(
        "SELECT id, name, auth_token, rest_id, created_at FROM projects ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(project_from_row).collect())
}

#[instrument(skip_all)]
pub async fn get_project(pool: &Pool, project_id: i64) -> Result<Option<Project>> {
    let row = sqlx::query(
        "SELECT id, name, auth_token, rest_id, created_at FROM projects WHERE id = ?",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(project_from_row))
}

#[instrument(skip_all)]
pub async fn set_project_rest_id(pool: &Pool, project_id: i64, rest_id: &str) -> Result<()> {
    sqlx::query("UPDATE projects SET rest_id = ? WHERE id = ?")
        .bind(rest_id)
        .bind(project_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Which of `candidates` are already stored for this project. One query per
/// chunk to stay under SQLite's bind-parameter limit.
#[instrument(skip_all)]
pub async fn existing_tweet_ids(
    pool: &Pool,
    project_id: i64,
    candidates: &[String],
) -> Result<HashSet<String>> {
    let mut existing = HashSet::new();
    for chunk in candidates.chunks(INSERT_CHUNK) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT tweet_id FROM tweets WHERE project_id = ? AND tweet_id IN ({placeholders})"
        );
        let mut query = sqlx::query_scalar::<_, String>(&sql).bind(project_id);
        for id in chunk {
            query = query.bind(id);
        }
        existing.extend(query.fetch_all(pool).await?);
    }
    Ok(existing)
}

/// Insert tweets in chunks, skipping duplicate natural keys. Returns the
/// number of rows actually inserted, which under a concurrent sweep may be
/// lower than the input length.
#[instrument(skip_all)]
pub async fn insert_tweets(
    pool: &Pool,
    project_id: i64,
    tweets: &[NormalizedTweet],
) -> Result<i64> {
    let mut inserted = 0;
    for chunk in tweets.chunks(INSERT_CHUNK) {
        let mut tx = pool.begin().await?;
        for tweet in chunk {
            let images = (!tweet.images.is_empty())
                .then(|| serde_json::to_string(&tweet.images).unwrap_or_default());
            let videos = (!tweet.videos.is_empty())
                .then(|| serde_json::to_string(&tweet.videos).unwrap_or_default());
            let res = sqlx::query(
                "INSERT OR IGNORE INTO tweets (project_id, tweet_id, tweet_url, screen_name, \
                 full_text, images, videos, like_count, retweet_count, reply_count, quote_count, \
                 author_name, author_profile_image_url, author_followers_count, \
                 author_friends_count, author_location, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(project_id)
            .bind(&tweet.tweet_id)
            .bind(&tweet.tweet_url)
            .bind(&tweet.screen_name)
            .bind((!tweet.full_text.is_empty()).then_some(tweet.full_text.as_str()))
            .bind(images)
            .bind(videos)
            .bind(tweet.like_count)
            .bind(tweet.retweet_count)
            .bind(tweet.reply_count)
            .bind(tweet.quote_count)
            .bind(&tweet.author.name)
            .bind(&tweet.author.profile_image_url)
            .bind(tweet.author.followers_count)
            .bind(tweet.author.friends_count)
            .bind(&tweet.author.location)
            .bind(tweet.created_at)
            .execute(&mut *tx)
            .await?;
            inserted += res.rows_affected() as i64;
        }
        tx.commit().await?;
    }
    Ok(inserted)
}

#[instrument(skip_all)]
pub async fn count_tweets(pool: &Pool, project_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM tweets WHERE project_id = ?")
        .bind(project_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument(skip_all)]
pub async fn get_following(
    pool: &Pool,
    project_id: i64,
    screen_name: &str,
) -> Result<Option<FollowingUser>> {
    let row = sqlx::query(
        "SELECT id, project_id, screen_name, rest_id, name, profile_image_url, \
         followers_count, friends_count, location, is_following, created_at \
         FROM following_users WHERE project_id = ? AND screen_name = ?",
    )
    .bind(project_id)
    .bind(screen_name)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(following_from_row))
}

#[instrument(skip_all)]
pub async fn insert_following(
    pool: &Pool,
    project_id: i64,
    profile: &NormalizedProfile,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO following_users (project_id, screen_name, rest_id, name, \
         profile_image_url, followers_count, friends_count, location, is_following) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(project_id)
    .bind(&profile.screen_name)
    .bind(&profile.rest_id)
    .bind(&profile.name)
    .bind(&profile.profile_image_url)
    .bind(profile.followers_count)
    .bind(profile.friends_count)
    .bind(&profile.location)
    .bind(profile.is_following as i64)
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

/// Refresh the metadata snapshot of an already-known followed user. Does not
/// touch `is_following`.
#[instrument(skip_all)]
pub async fn update_following_snapshot(
    pool: &Pool,
    id: i64,
    profile: &NormalizedProfile,
) -> Result<()> {
    sqlx::query(
        "UPDATE following_users SET name = ?, profile_image_url = ?, followers_count = ?, \
         friends_count = ?, location = ? WHERE id = ?",
    )
    .bind(&profile.name)
    .bind(&profile.profile_image_url)
    .bind(profile.followers_count)
    .bind(profile.friends_count)
    .bind(&profile.location)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn set_following_state(pool: &Pool, id: i64, is_following: bool) -> Result<()> {
    sqlx::query("UPDATE following_users SET is_following = ? WHERE id = ?")
        .bind(is_following as i64)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Users eligible for bulk-follow: not yet followed and with a known rest id.
#[instrument(skip_all)]
pub async fn list_pending_follows(pool: &Pool, project_id: i64) -> Result<Vec<FollowingUser>> {
    let rows = sqlx::query(
        "SELECT id, project_id, screen_name, rest_id, name, profile_image_url, \
         followers_count, friends_count, location, is_following, created_at \
         FROM following_users \
         WHERE project_id = ? AND is_following = 0 AND rest_id IS NOT NULL ORDER BY id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(following_from_row).collect())
}

#[instrument(skip_all)]
pub async fn insert_fetch_log(pool: &Pool, log: &FetchLogRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO fetch_logs (project_id, status, tweets_count, error_message) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(log.project_id)
    .bind(log.status.as_str())
    .bind(log.tweets_count)
    .bind(&log.error_message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Audit rows for one project, newest first: (status, tweets_count, error).
#[instrument(skip_all)]
pub async fn list_fetch_logs(
    pool: &Pool,
    project_id: i64,
) -> Result<Vec<(String, i64, Option<String>)>> {
    let rows = sqlx::query(
        "SELECT status, tweets_count, error_message FROM fetch_logs \
         WHERE project_id = ? ORDER BY id DESC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("status"), row.get("tweets_count"), row.get("error_message")))
        .collect())
}
