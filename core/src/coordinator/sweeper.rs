//! Retention sweeper: evicts terminal tasks once their retention window has
//! passed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;

use crate::task::TaskId;

use super::Inner;

pub(crate) async fn run(inner: Arc<Inner>) {
    let mut shutdown = inner.shutdown.subscribe();
    let mut ticker = tokio::time::interval(inner.config.sweep_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                sweep(&inner, Utc::now()).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!("retention sweeper stopped");
}

pub(crate) async fn sweep(inner: &Inner, now: DateTime<Utc>) -> Vec<TaskId> {
    let evicted = inner
        .store
        .evict_expired(now, inner.config.retention_window())
        .await;
    if !evicted.is_empty() {
        tracing::debug!(
            target: "conductor.flow",
            stage = "tasks.evicted",
            count = evicted.len(),
        );
        inner.events.tasks_evicted(evicted.clone());
    }
    evicted
}
