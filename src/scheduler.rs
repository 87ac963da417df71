use crate::connection::ManageConnection;
use crate::core::{EntityKind, ReconcileResult, Result, SyncError};
use crate::reconcile::Reconciler;
use crate::snapshot::DumpSnapshot;
use crate::storage::{MemoryStore, StoreConnection};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Results of one full update (nations, then regions).
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub nations: ReconcileResult,
    pub regions: ReconcileResult,
}

/// The daily dump update: nations first, then regions, one pass at a time.
pub struct DumpUpdateTask<M: ManageConnection> {
    reconciler: Arc<Reconciler<M>>,
    nations_dump: PathBuf,
    regions_dump: PathBuf,
    /// Where to write store state after a successful update
    checkpoint: Option<(MemoryStore, PathBuf)>,
    running: Mutex<()>,
}

impl<M> DumpUpdateTask<M>
where
    M: ManageConnection,
    M::Connection: StoreConnection,
{
    pub fn new(
        reconciler: Arc<Reconciler<M>>,
        nations_dump: impl Into<PathBuf>,
        regions_dump: impl Into<PathBuf>,
    ) -> Self {
        Self {
            reconciler,
            nations_dump: nations_dump.into(),
            regions_dump: regions_dump.into(),
            checkpoint: None,
            running: Mutex::new(()),
        }
    }

    pub fn with_checkpoint(mut self, store: MemoryStore, path: impl Into<PathBuf>) -> Self {
        self.checkpoint = Some((store, path.into()));
        self
    }

    /// Run one update. A second call while one is in flight fails fast.
    pub async fn run_once(&self) -> Result<UpdateReport> {
        let _running = self
            .running
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;

        info!("Starting daily dumps update task");

        // Each dump is parsed right before its pass and dropped right after.
        let nations = DumpSnapshot::new().load_nations(&self.nations_dump).await?;
        let nation_result = self
            .reconciler
            .reconcile(EntityKind::Nation, &nations)
            .await?;
        drop(nations);

        let regions = DumpSnapshot::new().load_regions(&self.regions_dump).await?;
        let region_result = self
            .reconciler
            .reconcile(EntityKind::Region, &regions)
            .await?;
        drop(regions);

        if let Some((store, path)) = &self.checkpoint {
            store.save(path).await?;
            info!(path = %path.display(), "store state saved");
        }

        info!("Finished daily dumps update task");
        Ok(UpdateReport {
            nations: nation_result,
            regions: region_result,
        })
    }

    /// Run an update every `period` until `cancel` fires.
    ///
    /// The first update starts immediately. A failed update is logged and the
    /// loop waits for the next tick.
    pub async fn run_every(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("dump update scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.run_once().await {
                Ok(report) => info!(
                    nations = %report.nations,
                    regions = %report.regions,
                    "daily dump update succeeded"
                ),
                Err(SyncError::Cancelled) => {
                    info!("daily dump update cancelled");
                    return;
                }
                Err(err) => error!(error = %err, "daily dump update failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionPool, PoolConfig};
    use crate::reconcile::{ReconcileOptions, Unthrottled};
    use crate::storage::MemoryManager;
    use tempfile::TempDir;

    async fn task(store: &MemoryStore, dir: &TempDir) -> DumpUpdateTask<MemoryManager> {
        let pool = ConnectionPool::new(PoolConfig::new(), MemoryManager::new(store.clone()))
            .await
            .unwrap();
        let reconciler = Reconciler::new(Arc::new(pool))
            .with_options(ReconcileOptions::default().throttle(Unthrottled));
        DumpUpdateTask::new(
            Arc::new(reconciler),
            dir.path().join("nations.jsonl"),
            dir.path().join("regions.jsonl"),
        )
    }

    #[tokio::test]
    async fn test_run_once_updates_both_kinds() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("nations.jsonl"),
            r#"{"name":"Testlandia","fullname":"Testlandia","unstatus":"WA Member","influence":"Superpower","lastlogin":1,"flag":"","region":"testregionia"}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("regions.jsonl"),
            r#"{"name":"Testregionia","flag":"","delegate":"testlandia","numnations":1}"#,
        )
        .unwrap();

        let store = MemoryStore::new();
        let state = dir.path().join("state.msgpack");
        let task = task(&store, &dir).await.with_checkpoint(store.clone(), &state);

        let report = task.run_once().await.unwrap();
        assert_eq!(report.nations.created, 1);
        assert_eq!(report.regions.created, 1);
        assert!(state.exists());
    }

    #[tokio::test]
    async fn test_missing_dump_fails_pass() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let task = task(&store, &dir).await;

        let err = task.run_once().await.unwrap_err();
        assert!(matches!(err, SyncError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_rejects_reentry() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let task = task(&store, &dir).await;

        let _held = task.running.lock().await;
        let err = task.run_once().await.unwrap_err();
        assert!(matches!(err, SyncError::AlreadyRunning));
    }
}
