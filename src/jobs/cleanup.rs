//! Background job: clear expired link tokens.
//!
//! Consumption already rejects stale tokens; this keeps the unique token index
//! small and moves abandoned accounts back to `Unlinked`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time;

use crate::store::Store;

/// Spawn the background cleanup task. Call this once at startup.
pub fn spawn(
    store: Arc<dyn Store>,
    ttl: chrono::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(3600)); // every hour
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            if let Err(e) = expire_link_tokens(store.as_ref(), ttl).await {
                tracing::error!("cleanup job failed: {:#}", e);
            }
        }
    })
}

pub async fn expire_link_tokens(store: &dyn Store, ttl: chrono::Duration) -> anyhow::Result<u64> {
    let cutoff = Utc::now()
        .checked_sub_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let cleared = store.clear_expired_tokens(cutoff).await?;
    if cleared > 0 {
        tracing::info!(rows = cleared, "cleared expired link tokens");
    }
    Ok(cleared)
}
