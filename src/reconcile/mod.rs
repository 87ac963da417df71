//! Dump reconciliation engine.
//!
//! A pass for one entity kind runs in two sweeps:
//!
//! 1. every snapshot key is fetched and upserted on its own short-lived pooled
//!    connection, so no single connection is held across the whole batch;
//! 2. after the upsert sweep completes, a separately acquired connection loads
//!    the stored key set, and `stored - snapshot` is revoked in one batch.
//!
//! Passes are not atomic. A pass that aborts halfway leaves every mutation it
//! already applied in place; the next successful pass converges storage again.

pub mod clock;
pub mod retry;
pub mod strategy;
pub mod throttle;

use crate::connection::{ConnectionPool, ManageConnection};
use crate::core::{EntityKind, ReconcileResult, Result, SnapshotRecord, SyncError};
use crate::snapshot::SnapshotSource;
use crate::storage::StoreConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use clock::SampleClock;
pub use retry::{FailurePolicy, RetryPolicy};
pub use strategy::{EntityStrategy, NationStrategy, RegionStrategy};
pub use throttle::{FixedDelay, Throttle, TokenBucket, Unthrottled};

/// Tunables for a pass.
#[derive(Clone)]
pub struct ReconcileOptions {
    pub throttle: Arc<dyn Throttle>,
    pub retry: RetryPolicy,
    pub on_record_failure: FailurePolicy,
}

impl ReconcileOptions {
    pub fn throttle(mut self, throttle: impl Throttle + 'static) -> Self {
        self.throttle = Arc::new(throttle);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn on_record_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_record_failure = policy;
        self
    }
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            throttle: Arc::new(FixedDelay::new(Duration::from_millis(1))),
            retry: RetryPolicy::none(),
            on_record_failure: FailurePolicy::Abort,
        }
    }
}

/// Reconciles snapshots against the store behind `pool`.
pub struct Reconciler<M: ManageConnection> {
    pool: Arc<ConnectionPool<M>>,
    options: ReconcileOptions,
    clock: SampleClock,
    cancel: CancellationToken,
}

impl<M> Reconciler<M>
where
    M: ManageConnection,
    M::Connection: StoreConnection,
{
    pub fn new(pool: Arc<ConnectionPool<M>>) -> Self {
        Self {
            pool,
            options: ReconcileOptions::default(),
            clock: SampleClock::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// Checked before every record; cancelling aborts the running pass.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<M>> {
        &self.pool
    }

    /// Run one pass for `kind` with the built-in strategy for that kind.
    pub async fn reconcile(
        &self,
        kind: EntityKind,
        snapshot: &dyn SnapshotSource,
    ) -> Result<ReconcileResult> {
        match kind {
            EntityKind::Nation => self.reconcile_with(&NationStrategy, snapshot).await,
            EntityKind::Region => self.reconcile_with(&RegionStrategy, snapshot).await,
        }
    }

    /// Run one pass with a caller-supplied strategy.
    pub async fn reconcile_with(
        &self,
        strategy: &dyn EntityStrategy,
        snapshot: &dyn SnapshotSource,
    ) -> Result<ReconcileResult> {
        let kind = strategy.kind();
        let snapshot_keys = snapshot.list_keys(kind).await?;
        info!(%kind, count = snapshot_keys.len(), "updating from daily dump");

        let mut result = ReconcileResult::default();
        for key in &snapshot_keys {
            if self.cancel.is_cancelled() {
                warn!(%kind, processed = result.processed, "pass cancelled");
                return Err(SyncError::Cancelled);
            }

            self.options.throttle.wait().await;
            let record = snapshot.get_record(kind, key).await?;
            result.processed += 1;

            match self.upsert_record(strategy, &record).await {
                Ok(true) => result.created += 1,
                Ok(false) => {}
                Err(err) => match self.options.on_record_failure {
                    FailurePolicy::Abort => {
                        error!(%kind, %key, error = %err, "record failed, aborting pass");
                        return Err(err);
                    }
                    FailurePolicy::Continue => {
                        warn!(%kind, %key, error = %err, "record failed, skipping");
                        result.failed_keys.push(key.clone());
                    }
                },
            }
        }
        info!(%kind, created = result.created, "added from daily dump");

        // Acquired only now, after every per-record connection went back.
        let mut conn = self.pool.get_connection().await?;
        let stored_keys = strategy.stored_keys(&mut *conn).await?;
        let mut dead_keys: Vec<String> = stored_keys.difference(&snapshot_keys).cloned().collect();
        dead_keys.sort_unstable();
        info!(%kind, count = dead_keys.len(), "revoking keys absent from dump");

        if !dead_keys.is_empty() {
            result.removed = strategy.remove(&mut *conn, &dead_keys).await?;
        }
        drop(conn);

        info!(%kind, %result, "pass complete");
        Ok(result)
    }

    /// One record on one freshly acquired connection, retried per policy.
    ///
    /// The sample step succeeds at most once; retries only repeat what is
    /// left of the record.
    async fn upsert_record(
        &self,
        strategy: &dyn EntityStrategy,
        record: &SnapshotRecord,
    ) -> Result<bool> {
        let sampled_at = self.clock.now();
        let mut sampled = false;
        let mut attempt = 1;
        loop {
            let outcome = async {
                let mut conn = self.pool.get_connection().await?;
                if !sampled {
                    strategy.record_sample(&mut *conn, record, sampled_at).await?;
                    sampled = true;
                }
                strategy.upsert(&mut *conn, record).await
            }
            .await;

            match outcome {
                Err(err) if err.is_retryable() => {
                    attempt += 1;
                    let Some(delay) = self.options.retry.delay_before(attempt) else {
                        return Err(err);
                    };
                    warn!(key = record.key(), attempt, error = %err, "retrying record");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
