use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use super::coordinator::{self, PullStats, PushStats};
use super::{BatchSize, SyncConfig, SyncDirection, SyncGroup};
use crate::db::SyncRepository;
use crate::error::AppError;
use crate::models::{
    Appointment, BloodPressureMeasurement, BloodSugarMeasurement, Facility, FollowUpSchedule,
    MedicalHistory, Patient, SyncableRecord,
};
use crate::remote::SyncApi;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub push: PushStats,
    pub pull: PullStats,
}

/// One entity's participation in a sync cycle.
#[async_trait]
pub trait ModelSync: Send + Sync {
    fn name(&self) -> &'static str;

    fn sync_config(&self) -> SyncConfig;

    fn requires_sync_approved_user(&self) -> bool;

    async fn push(&self) -> Result<PushStats, AppError>;

    async fn pull(&self) -> Result<PullStats, AppError>;

    /// Push and pull side by side. A failure in one does not cut the other
    /// short; the first error is returned once both are done.
    async fn sync(&self) -> Result<SyncReport, AppError> {
        let (push, pull) = tokio::join!(self.push(), self.pull());
        Ok(SyncReport {
            push: push?,
            pull: pull?,
        })
    }

    async fn pending_sync_record_count(&self) -> Result<i64, AppError>;

    async fn purge(&self) -> Result<u64, AppError>;
}

pub struct EntitySync<R> {
    repo: SyncRepository<R>,
    api: Arc<dyn SyncApi>,
    config: SyncConfig,
    direction: SyncDirection,
    requires_approved_user: bool,
    push_lock: Mutex<()>,
    pull_lock: Mutex<()>,
}

impl<R: SyncableRecord> EntitySync<R> {
    pub fn new(db: SqlitePool, api: Arc<dyn SyncApi>, config: SyncConfig) -> Self {
        Self {
            repo: SyncRepository::new(db),
            api,
            config,
            direction: SyncDirection::Both,
            requires_approved_user: true,
            push_lock: Mutex::new(()),
            pull_lock: Mutex::new(()),
        }
    }

    pub fn pull_only(mut self) -> Self {
        self.direction = SyncDirection::PullOnly;
        self
    }

    pub fn without_approved_user(mut self) -> Self {
        self.requires_approved_user = false;
        self
    }
}

#[async_trait]
impl<R: SyncableRecord> ModelSync for EntitySync<R> {
    fn name(&self) -> &'static str {
        R::TABLE
    }

    fn sync_config(&self) -> SyncConfig {
        self.config
    }

    fn requires_sync_approved_user(&self) -> bool {
        self.requires_approved_user
    }

    async fn push(&self) -> Result<PushStats, AppError> {
        if self.direction == SyncDirection::PullOnly {
            return Ok(PushStats::default());
        }
        let _guard = self.push_lock.lock().await;
        coordinator::push(
            &self.repo,
            self.api.as_ref(),
            self.config.push_batch_size.records(),
        )
        .await
    }

    async fn pull(&self) -> Result<PullStats, AppError> {
        let _guard = self.pull_lock.lock().await;
        coordinator::pull(
            &self.repo,
            self.api.as_ref(),
            self.config.pull_batch_size.records(),
        )
        .await
    }

    async fn pending_sync_record_count(&self) -> Result<i64, AppError> {
        Ok(self.repo.pending_sync_record_count().await?)
    }

    async fn purge(&self) -> Result<u64, AppError> {
        Ok(self.repo.purge_deleted().await?)
    }
}

/// Every entity the app keeps in sync, with its schedule.
pub fn model_syncs(
    db: SqlitePool,
    api: Arc<dyn SyncApi>,
    batch_size: BatchSize,
) -> Vec<Arc<dyn ModelSync>> {
    let frequent = SyncConfig::for_group(SyncGroup::Frequent, batch_size);
    let daily = SyncConfig::for_group(SyncGroup::Daily, batch_size);

    vec![
        Arc::new(EntitySync::<Facility>::new(db.clone(), api.clone(), daily)
            .pull_only()
            .without_approved_user()),
        Arc::new(EntitySync::<Patient>::new(db.clone(), api.clone(), frequent)),
        Arc::new(EntitySync::<BloodPressureMeasurement>::new(db.clone(), api.clone(), frequent)),
        Arc::new(EntitySync::<BloodSugarMeasurement>::new(db.clone(), api.clone(), frequent)),
        Arc::new(EntitySync::<MedicalHistory>::new(db.clone(), api.clone(), frequent)),
        Arc::new(EntitySync::<Appointment>::new(db.clone(), api.clone(), frequent)),
        Arc::new(EntitySync::<FollowUpSchedule>::new(db, api, frequent)),
    ]
}
