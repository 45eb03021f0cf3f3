use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::db::preferences;
use crate::error::{AppError, ResolvedError};
use crate::session::UserSession;
use crate::sync::SyncGroup;
use crate::sync::model_sync::{ModelSync, SyncReport};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncProgress {
    Syncing,
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncGroupResult {
    pub group: SyncGroup,
    pub progress: SyncProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SyncResult {
    Completed { name: String, report: SyncReport },
    Failed { name: String, error: ResolvedError },
}

impl SyncResult {
    pub fn name(&self) -> &str {
        match self {
            SyncResult::Completed { name, .. } | SyncResult::Failed { name, .. } => name,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SyncResult::Completed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupStatus {
    pub group: SyncGroup,
    pub progress: Option<SyncProgress>,
    pub last_succeeded_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingRecords {
    pub name: String,
    pub pending: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataSyncStatus {
    pub groups: Vec<GroupStatus>,
    pub pending: Vec<PendingRecords>,
}

/// Runs entity syncs by group and reports how they went.
pub struct DataSync {
    db: SqlitePool,
    syncs: Vec<Arc<dyn ModelSync>>,
    session: UserSession,
    permits: Arc<Semaphore>,
    progress: broadcast::Sender<SyncGroupResult>,
    errors: broadcast::Sender<ResolvedError>,
    last_progress: Mutex<HashMap<SyncGroup, SyncProgress>>,
}

impl DataSync {
    pub fn new(
        db: SqlitePool,
        syncs: Vec<Arc<dyn ModelSync>>,
        session: UserSession,
        max_parallel_syncs: usize,
    ) -> Self {
        let (progress, _) = broadcast::channel(EVENT_CAPACITY);
        let (errors, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            db,
            syncs,
            session,
            permits: Arc::new(Semaphore::new(max_parallel_syncs.max(1))),
            progress,
            errors,
            last_progress: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<SyncGroupResult> {
        self.progress.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<ResolvedError> {
        self.errors.subscribe()
    }

    fn emit(&self, group: SyncGroup, progress: SyncProgress) {
        match self.last_progress.lock() {
            Ok(mut last) => {
                last.insert(group, progress);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(group, progress);
            }
        }
        // nobody listening is fine
        let _ = self.progress.send(SyncGroupResult { group, progress });
    }

    fn syncs_to_run(&self, group: SyncGroup) -> Vec<Arc<dyn ModelSync>> {
        let approved = self.session.can_sync_data();
        self.syncs
            .iter()
            .filter(|sync| sync.sync_config().group == group)
            .filter(|sync| approved || !sync.requires_sync_approved_user())
            .cloned()
            .collect()
    }

    /// Run every sync in `group`, each as its own task.
    pub async fn sync_group(&self, group: SyncGroup) -> Vec<SyncResult> {
        self.emit(group, SyncProgress::Syncing);

        let syncs = self.syncs_to_run(group);
        info!("{} sync: running {} entity syncs", group, syncs.len());

        let mut tasks = JoinSet::new();
        for sync in syncs {
            let permits = self.permits.clone();
            tasks.spawn(async move {
                let name = sync.name().to_string();
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return SyncResult::Failed {
                            name,
                            error: ResolvedError::Unexpected(e.to_string()),
                        };
                    }
                };
                match sync.sync().await {
                    Ok(report) => SyncResult::Completed { name, report },
                    Err(e) => SyncResult::Failed {
                        name,
                        error: ResolvedError::resolve(&e),
                    },
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => results.push(SyncResult::Failed {
                    name: "unknown".to_string(),
                    error: ResolvedError::Unexpected(format!("sync task panicked: {}", e)),
                }),
            }
        }
        results.sort_by(|a, b| a.name().cmp(b.name()));

        let mut first_error = None;
        for result in &results {
            if let SyncResult::Failed { name, error } = result {
                if error.is_reportable() {
                    error!("{} sync failed for {}: {}", group, name, error);
                } else {
                    warn!("{} sync failed for {}: {}", group, name, error);
                }
                first_error.get_or_insert_with(|| error.clone());
            }
        }

        match first_error {
            Some(error) => {
                self.emit(group, SyncProgress::Failure);
                let _ = self.errors.send(error);
            }
            None => {
                self.emit(group, SyncProgress::Success);
                let key = preferences::last_sync_succeeded_key(group.as_str());
                if let Err(e) = preferences::set(&self.db, &key, &Utc::now().to_rfc3339()).await {
                    warn!("failed to record {} sync time: {}", group, e);
                }
            }
        }

        results
    }

    /// Sync every group at once. When everything went through and someone
    /// is logged in, soft-deleted rows the server has acknowledged are
    /// dropped.
    pub async fn sync_the_world(&self) -> Vec<SyncResult> {
        let (mut results, daily) = tokio::join!(
            self.sync_group(SyncGroup::Frequent),
            self.sync_group(SyncGroup::Daily)
        );
        results.extend(daily);

        if results.iter().all(SyncResult::is_completed) && self.session.is_logged_in() {
            if let Err(e) = self.purge().await {
                warn!("purge after sync failed: {}", e);
            }
        }

        results
    }

    async fn purge(&self) -> Result<(), AppError> {
        for sync in &self.syncs {
            let purged = sync.purge().await?;
            if purged > 0 {
                info!("{}: purged {} deleted records", sync.name(), purged);
            }
        }
        Ok(())
    }

    pub fn fire_and_forget_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.sync_the_world().await;
        })
    }

    pub fn fire_and_forget_sync_group(self: &Arc<Self>, group: SyncGroup) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.sync_group(group).await;
        })
    }

    pub async fn status(&self) -> Result<DataSyncStatus, AppError> {
        let last_progress = match self.last_progress.lock() {
            Ok(last) => last.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let mut groups = Vec::new();
        for group in SyncGroup::ALL {
            let key = preferences::last_sync_succeeded_key(group.as_str());
            groups.push(GroupStatus {
                group,
                progress: last_progress.get(&group).copied(),
                last_succeeded_at: preferences::get(&self.db, &key).await?,
            });
        }

        let mut pending = Vec::new();
        for sync in &self.syncs {
            pending.push(PendingRecords {
                name: sync.name().to_string(),
                pending: sync.pending_sync_record_count().await?,
            });
        }

        Ok(DataSyncStatus { groups, pending })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::db::connect_in_memory;
    use crate::session::{LoggedInUser, UserStatus};
    use crate::sync::{BatchSize, PullStats, PushStats, SyncConfig};

    struct StubSync {
        name: &'static str,
        group: SyncGroup,
        needs_approval: bool,
        fail_with: Option<fn() -> AppError>,
        runs: AtomicUsize,
        purges: AtomicUsize,
    }

    impl StubSync {
        fn new(name: &'static str, group: SyncGroup) -> Self {
            Self {
                name,
                group,
                needs_approval: true,
                fail_with: None,
                runs: AtomicUsize::new(0),
                purges: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelSync for StubSync {
        fn name(&self) -> &'static str {
            self.name
        }

        fn sync_config(&self) -> SyncConfig {
            SyncConfig::for_group(self.group, BatchSize::VerySmall)
        }

        fn requires_sync_approved_user(&self) -> bool {
            self.needs_approval
        }

        async fn push(&self) -> Result<PushStats, AppError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(fail) => Err(fail()),
                None => Ok(PushStats::default()),
            }
        }

        async fn pull(&self) -> Result<PullStats, AppError> {
            Ok(PullStats::default())
        }

        async fn pending_sync_record_count(&self) -> Result<i64, AppError> {
            Ok(0)
        }

        async fn purge(&self) -> Result<u64, AppError> {
            self.purges.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    fn approved_user() -> LoggedInUser {
        LoggedInUser {
            id: Uuid::new_v4(),
            facility_id: Uuid::new_v4(),
            access_token: "token".to_string(),
            status: UserStatus::ApprovedForSyncing,
        }
    }

    #[tokio::test]
    async fn test_failure_in_one_sync_does_not_stop_the_group() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let broken = Arc::new(StubSync {
            fail_with: Some(|| AppError::Network("timeout".to_string())),
            ..StubSync::new("appointments", SyncGroup::Frequent)
        });
        let healthy = Arc::new(StubSync::new("patients", SyncGroup::Frequent));
        let syncs: Vec<Arc<dyn ModelSync>> = vec![broken.clone(), healthy.clone()];
        let data_sync = DataSync::new(
            pool,
            syncs,
            UserSession::new(Some(approved_user())),
            2,
        );
        let mut progress = data_sync.subscribe_progress();
        let mut errors = data_sync.subscribe_errors();

        let results = data_sync.sync_group(SyncGroup::Frequent).await;

        assert_eq!(results.len(), 2);
        assert!(!results[0].is_completed());
        assert!(results[1].is_completed());
        assert_eq!(healthy.runs.load(Ordering::SeqCst), 1);

        assert_eq!(progress.recv().await.unwrap().progress, SyncProgress::Syncing);
        assert_eq!(progress.recv().await.unwrap().progress, SyncProgress::Failure);
        assert!(matches!(errors.recv().await.unwrap(), ResolvedError::NetworkRelated(_)));
    }

    #[tokio::test]
    async fn test_group_sync_only_runs_that_group() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let frequent = Arc::new(StubSync::new("patients", SyncGroup::Frequent));
        let daily = Arc::new(StubSync {
            needs_approval: false,
            ..StubSync::new("facilities", SyncGroup::Daily)
        });
        let syncs: Vec<Arc<dyn ModelSync>> = vec![frequent.clone(), daily.clone()];
        let data_sync = DataSync::new(
            pool.clone(),
            syncs,
            UserSession::new(Some(approved_user())),
            1,
        );

        let results = data_sync.sync_group(SyncGroup::Daily).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name(), "facilities");
        assert_eq!(frequent.runs.load(Ordering::SeqCst), 0);

        let status = data_sync.status().await.expect("status failed");
        let daily_status = status
            .groups
            .iter()
            .find(|g| g.group == SyncGroup::Daily)
            .expect("missing daily group");
        assert_eq!(daily_status.progress, Some(SyncProgress::Success));
        assert!(daily_status.last_succeeded_at.is_some());
    }

    #[tokio::test]
    async fn test_unapproved_user_only_runs_open_syncs() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let guarded = Arc::new(StubSync::new("patients", SyncGroup::Frequent));
        let open = Arc::new(StubSync {
            needs_approval: false,
            ..StubSync::new("facilities", SyncGroup::Daily)
        });
        let syncs: Vec<Arc<dyn ModelSync>> = vec![guarded.clone(), open.clone()];
        let data_sync = DataSync::new(
            pool,
            syncs,
            UserSession::default(),
            1,
        );

        let results = data_sync.sync_the_world().await;
        assert_eq!(results.len(), 1);
        assert_eq!(guarded.runs.load(Ordering::SeqCst), 0);
        assert_eq!(open.runs.load(Ordering::SeqCst), 1);
        // no user, no purge
        assert_eq!(open.purges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_world_sync_purges() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let patients = Arc::new(StubSync::new("patients", SyncGroup::Frequent));
        let syncs: Vec<Arc<dyn ModelSync>> = vec![patients.clone()];
        let data_sync = Arc::new(DataSync::new(
            pool,
            syncs,
            UserSession::new(Some(approved_user())),
            1,
        ));

        data_sync
            .fire_and_forget_sync()
            .await
            .expect("sync task failed");
        assert_eq!(patients.runs.load(Ordering::SeqCst), 1);
        assert_eq!(patients.purges.load(Ordering::SeqCst), 1);
    }
}
