use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use x_fetchbot::xclient::HttpConnector;
use x_fetchbot::{config, db, scheduler};

#[derive(Debug, Parser)]
#[command(author, version, about = "Daily X timeline sweep daemon")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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

    info!(
        hour = cfg.schedule.hour,
        minute = cfg.schedule.minute,
        "scheduler initialized"
    );
    scheduler::run_daily(&pool, &HttpConnector, &cfg).await?;
    Ok(())
}
