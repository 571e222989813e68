//! Delayed reconciliation of the fee list.
//!
//! After a local submission the list is refetched in full once a fixed delay
//! has passed. Scheduling again supersedes the pending refresh: a refresh
//! still waiting is cancelled, and one whose fetch is already in flight
//! throws its result away. Whatever applies last wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::FeesSource;
use crate::cache;
use crate::db::DbState;
use crate::engine::SharedEngine;
use crate::error::{FeesError, FeesResult};

#[derive(Debug)]
pub enum RefreshOutcome {
    /// The refetched list replaced local state.
    Applied(usize),
    /// A newer refresh took over before this one applied.
    Superseded,
    /// The fetch failed; the engine now holds an empty list.
    Failed(FeesError),
}

struct PendingRefresh {
    generation: u64,
    cancel: CancellationToken,
}

pub struct RefreshScheduler {
    source: Arc<dyn FeesSource>,
    engine: SharedEngine,
    cache: Option<Arc<DbState>>,
    delay: Duration,
    pending: Arc<Mutex<Option<PendingRefresh>>>,
    generation: AtomicU64,
}

async fn run_refresh(
    source: &dyn FeesSource,
    engine: &SharedEngine,
    cache_db: Option<&DbState>,
    cancel: Option<&CancellationToken>,
) -> RefreshOutcome {
    engine
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .begin_reconcile();

    let result = source.fetch_fees_analytics().await;

    if cancel.is_some_and(CancellationToken::is_cancelled) {
        debug!("Discarding superseded fee refresh result");
        return RefreshOutcome::Superseded;
    }

    if let (Ok(raw), Some(db)) = (&result, cache_db) {
        if let Err(e) = cache::store_transactions(db, raw) {
            warn!(error = %e, "Failed to update fee cache");
        }
    }

    let mut guard = engine.lock().unwrap_or_else(|e| e.into_inner());
    match guard.apply_refresh(result) {
        Ok(count) => RefreshOutcome::Applied(count),
        Err(e) => RefreshOutcome::Failed(e),
    }
}

impl RefreshScheduler {
    pub fn new(
        source: Arc<dyn FeesSource>,
        engine: SharedEngine,
        cache: Option<Arc<DbState>>,
        delay: Duration,
    ) -> Self {
        Self {
            source,
            engine,
            cache,
            delay,
            pending: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Cancel whatever refresh is pending. Returns whether one was.
    pub fn cancel_pending(&self) -> bool {
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match previous {
            Some(prev) => {
                prev.cancel.cancel();
                debug!(generation = prev.generation, "Cancelled pending fee refresh");
                true
            }
            None => false,
        }
    }

    /// Register a new refresh generation, cancelling whichever was pending.
    fn arm(&self) -> (u64, CancellationToken) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let previous = pending.replace(PendingRefresh {
            generation,
            cancel: token.clone(),
        });
        if let Some(prev) = previous {
            prev.cancel.cancel();
            debug!(
                superseded = prev.generation,
                generation = generation,
                "Superseding pending fee refresh"
            );
        }
        (generation, token)
    }

    /// Arm a refetch after the configured delay, superseding any pending one.
    pub fn schedule(&self) -> JoinHandle<RefreshOutcome> {
        let (generation, token) = self.arm();

        let source = self.source.clone();
        let engine = self.engine.clone();
        let cache_db = self.cache.clone();
        let pending = self.pending.clone();
        let delay = self.delay;

        info!(
            generation = generation,
            delay_ms = delay.as_millis() as u64,
            "Fee refresh scheduled"
        );

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    return RefreshOutcome::Superseded;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let outcome = run_refresh(
                source.as_ref(),
                &engine,
                cache_db.as_deref(),
                Some(&token),
            )
            .await;
            clear_if_current(&pending, generation);
            outcome
        })
    }

    /// Refetch immediately, superseding any scheduled refresh. A `schedule()`
    /// made while this fetch is in flight supersedes it in turn; the result is
    /// then discarded and the current list length is returned.
    pub async fn refresh_now(&self) -> FeesResult<usize> {
        let (generation, token) = self.arm();
        let outcome = run_refresh(
            self.source.as_ref(),
            &self.engine,
            self.cache.as_deref(),
            Some(&token),
        )
        .await;
        clear_if_current(&self.pending, generation);
        match outcome {
            RefreshOutcome::Applied(count) => Ok(count),
            RefreshOutcome::Failed(e) => Err(e),
            RefreshOutcome::Superseded => Ok(self
                .engine
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .transactions()
                .len()),
        }
    }
}

fn clear_if_current(pending: &Mutex<Option<PendingRefresh>>, generation: u64) {
    let mut guard = pending.lock().unwrap_or_else(|e| e.into_inner());
    if guard.as_ref().is_some_and(|p| p.generation == generation) {
        guard.take();
    }
}
