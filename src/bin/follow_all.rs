use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use x_fetchbot::fetch::{self, ItemOutcome};
use x_fetchbot::xclient::HttpConnector;
use x_fetchbot::{config, db};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Follow every pending user of a project, paced to avoid rate limits"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Project whose pending users should be followed
    #[arg(long)]
    project: i64,
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

    let report =
        fetch::follow_all_pending(&pool, &HttpConnector, args.project, cfg.pace()).await?;
    for result in &report.results {
        match &result.outcome {
            ItemOutcome::Success => info!(screen_name = %result.screen_name, "followed"),
            ItemOutcome::Failed(err) => {
                warn!(screen_name = %result.screen_name, error = %err, "follow failed")
            }
        }
    }
    info!(
        total = report.total,
        success = report.success,
        failed = report.failed,
        "bulk follow completed"
    );
    Ok(())
}
