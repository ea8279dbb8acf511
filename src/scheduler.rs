//! Daily sweep trigger.
//!
//! The recurring trigger and the on-demand `fetch-once` path run the exact
//! same [`crate::fetch::sweep_all_projects`]; there is no mutual exclusion
//! between them, which the dedup layer tolerates by re-querying existence and
//! skipping duplicate inserts.

use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::time::sleep;
use tracing::{error, info};

use crate::config::Config;
use crate::db::Pool;
use crate::fetch;
use crate::xclient::XConnector;

/// Next wall-clock instant at `hour:minute` strictly after `now`.
pub fn next_run_after(now: NaiveDateTime, hour: u32, minute: u32) -> NaiveDateTime {
    let at = now
        .date()
        .and_hms_opt(hour, minute, 0)
        .expect("validated schedule time");
    if at > now {
        at
    } else {
        at + chrono::Duration::days(1)
    }
}

/// Run the all-projects sweep once per day at the configured wall-clock time.
/// Never returns under normal operation.
pub async fn run_daily(pool: &Pool, connector: &dyn XConnector, cfg: &Config) -> crate::Result<()> {
    loop {
        let now = Local::now().naive_local();
        let next = next_run_after(now, cfg.schedule.hour, cfg.schedule.minute);
        let wait = (next - now)
            .to_std()
            .unwrap_or(Duration::from_secs(60));
        info!(next_run = %next, "scheduler sleeping until next sweep");
        sleep(wait).await;

        info!("scheduled sweep started");
        match fetch::sweep_all_projects(pool, connector, cfg.pace()).await {
            Ok(summary) => info!(
                projects = summary.projects.len(),
                succeeded = summary.succeeded(),
                failed = summary.failed(),
                "scheduled sweep completed"
            ),
            Err(err) => error!(%err, "scheduled sweep aborted"),
        }
    }
}
