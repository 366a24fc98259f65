//! Periodic retention sweeper.

use std::time::Duration;

use chrono::Utc;
use sea_orm::DatabaseConnection;
use tokio::task::JoinHandle;
use tracing::{error, info};

use hookline_relay_db::store;

/// Spawn the background sweeper, ticking every `interval_minutes`.
pub fn spawn_sweeper(db: DatabaseConnection, interval_minutes: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(interval_minutes.max(1) * 60);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep(&db).await;
        }
    })
}

/// One sweep: delete each auto-delete endpoint's requests older than its
/// retention window. Best-effort; a failing endpoint does not stop the
/// sweep.
pub async fn sweep(db: &DatabaseConnection) {
    let policies = match store::auto_delete_policies(db).await {
        Ok(policies) => policies,
        Err(err) => {
            error!(error = %err, "failed to fetch retention policies");
            return;
        }
    };

    for policy in policies {
        let cutoff = Utc::now() - chrono::Duration::days(policy.retention_days as i64);
        match store::delete_requests_before(db, policy.endpoint_id, cutoff).await {
            Ok(0) => {}
            Ok(deleted) => {
                info!(endpoint_id = %policy.endpoint_id, deleted, "cleaned up expired requests");
            }
            Err(err) => {
                error!(endpoint_id = %policy.endpoint_id, error = %err, "request cleanup failed");
            }
        }
    }
}
