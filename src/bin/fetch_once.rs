use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use x_fetchbot::xclient::HttpConnector;
use x_fetchbot::{config, db, fetch};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run one timeline sweep immediately and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Fetch only this project instead of sweeping all of them
    #[arg(long)]
    project: Option<i64>,
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

    if let Some(project_id) = args.project {
        match fetch::fetch_tweets_for_project(&pool, &HttpConnector, project_id).await {
            Ok(count) => info!(project_id, count, "fetch succeeded"),
            Err(err) => error!(project_id, %err, "fetch failed"),
        }
        return Ok(());
    }

    let summary = fetch::sweep_all_projects(&pool, &HttpConnector, cfg.pace()).await?;
    for outcome in &summary.projects {
        match &outcome.error {
            None => info!(
                project_id = outcome.project_id,
                name = %outcome.project_name,
                count = outcome.count,
                "project fetched"
            ),
            Some(err) => error!(
                project_id = outcome.project_id,
                name = %outcome.project_name,
                error = %err,
                "project failed"
            ),
        }
    }
    info!(
        projects = summary.projects.len(),
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        "sweep completed"
    );
    Ok(())
}
