//! Periodic ticks: the scheduled dispatch run and the daily store sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use flatwatch_core::storage::{DeliveredStore, ListingCacheStore};

use crate::dispatcher::Dispatcher;

/// Days a delivered record survives before the daily sweep purges it.
const DELIVERED_RETENTION_DAYS: i64 = 30;

/// Coalescing guard around the tick body: if a tick is still running when
/// the next one is due, the new one is skipped, never queued. Queueing
/// would allow an unbounded backlog after a long outage.
#[derive(Default)]
pub struct CoalesceGate {
    inner: Mutex<()>,
}

impl CoalesceGate {
    /// Fresh gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the gate without waiting; `None` means a run is in flight.
    pub fn try_enter(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        self.inner.try_lock().ok()
    }
}

/// Spawn the scheduled dispatch loop. The first tick fires immediately
/// (the caller starts it after bot readiness), subsequent ticks every
/// `interval`; overlapping ticks coalesce.
pub fn spawn_dispatch_loop(
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
) -> JoinHandle<()> {
    let gate = Arc::new(CoalesceGate::new());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            // The first interval tick completes immediately.
            ticker.tick().await;
            let gate = Arc::clone(&gate);
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                match gate.try_enter() {
                    Some(_guard) => {
                        tracing::info!("scheduled tick starting");
                        dispatcher.run_all().await;
                        tracing::info!("scheduled tick done");
                    }
                    None => {
                        tracing::warn!("previous tick still running, skipping this one");
                    }
                }
            });
        }
    })
}

/// Spawn the daily maintenance loop: cache sweep plus delivered-set
/// retention. Store failures are logged and retried next day.
pub fn spawn_daily_sweep(
    cache: Arc<dyn ListingCacheStore>,
    delivered: Arc<dyn DeliveredStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Skip the immediate first tick; the sweep has no reason to run
        // at startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match cache.daily_sweep().await {
                Ok(touched) => tracing::info!(touched, "daily cache sweep done"),
                Err(e) => tracing::warn!(error = %e, "daily cache sweep failed"),
            }
            match delivered.purge_older_than(DELIVERED_RETENTION_DAYS).await {
                Ok(purged) => tracing::info!(purged, "delivered-set retention done"),
                Err(e) => tracing::warn!(error = %e, "delivered-set retention failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gate_skips_while_held() {
        let gate = CoalesceGate::new();
        let guard = gate.try_enter();
        assert!(guard.is_some());
        assert!(gate.try_enter().is_none());
        drop(guard);
        assert!(gate.try_enter().is_some());
    }
}
