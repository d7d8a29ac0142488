use chalet_booking::ServiceLedger;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Expires unapplied services past their deadline, once per `every`.
pub async fn start_expiry_worker(ledger: Arc<ServiceLedger>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(every_secs = every.as_secs(), "service expiry worker started");

    loop {
        ticker.tick().await;
        match ledger.expire_stale(Utc::now()).await {
            Ok(0) => {}
            Ok(expired) => info!(expired, "expired stale services"),
            Err(e) => error!(error = %e, "service expiry sweep failed"),
        }
    }
}
