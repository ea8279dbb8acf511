use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use x_fetchbot::xclient::HttpConnector;
use x_fetchbot::{config, db, fetch};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Sync a project's following list from X, page by page"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Project to sync
    #[arg(long)]
    project: i64,

    /// Resume from a previously checkpointed cursor
    #[arg(long)]
    cursor: Option<String>,

    /// Stop after one page instead of following cursors to the end
    #[arg(long)]
    single_page: bool,

    /// Add one account by profile URL instead of syncing
    #[arg(long)]
    add_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/fetchbot.db", cfg.app.data_dir));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    if let Some(url) = &args.add_url {
        let user =
            fetch::add_following_by_url(&pool, &HttpConnector, args.project, url).await?;
        info!(
            project_id = args.project,
            screen_name = %user.screen_name,
            rest_id = ?user.rest_id,
            "user added"
        );
        return Ok(());
    }

    let mut cursor = args.cursor.clone();
    let mut pages = 0u32;
    let (mut added, mut updated, mut skipped) = (0i64, 0i64, 0i64);
    loop {
        let outcome = fetch::sync_following_for_project(
            &pool,
            &HttpConnector,
            args.project,
            cursor.as_deref(),
        )
        .await?;
        pages += 1;
        added += outcome.added;
        updated += outcome.updated;
        skipped += outcome.skipped;
        info!(
            page = pages,
            added = outcome.added,
            updated = outcome.updated,
            skipped = outcome.skipped,
            cursor = ?outcome.next_cursor,
            "page merged"
        );

        cursor = outcome.next_cursor;
        if cursor.is_none() || args.single_page {
            break;
        }
        // Checkpointed cursor makes a resume cheap if this run is killed.
        tokio::time::sleep(cfg.pace()).await;
    }

    info!(pages, added, updated, skipped, "following sync finished");
    Ok(())
}
