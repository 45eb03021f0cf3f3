use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::services::data_sync::{DataSync, SyncResult};
use crate::sync::SyncGroup;

/// Auto-sync スケジューラー
/// 同期グループごとに定期的に同期を実行
pub struct SyncScheduler {
    data_sync: Arc<DataSync>,
    group: SyncGroup,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl SyncScheduler {
    pub fn new(
        data_sync: Arc<DataSync>,
        group: SyncGroup,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            data_sync,
            group,
            interval,
            shutdown,
        }
    }

    /// 全グループ分のスケジューラーをそれぞれの間隔で作成
    pub fn for_all_groups(data_sync: Arc<DataSync>, shutdown: watch::Receiver<bool>) -> Vec<Self> {
        SyncGroup::ALL
            .into_iter()
            .map(|group| {
                Self::new(
                    data_sync.clone(),
                    group,
                    group.interval().duration(),
                    shutdown.clone(),
                )
            })
            .collect()
    }

    /// shutdown が通知されるまで同期を定期実行
    pub async fn start(mut self) {
        info!(
            "Starting {} sync scheduler (interval: {:?})",
            self.group, self.interval
        );

        loop {
            // 最初は指定時間待機
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            // 同期を実行
            let results = self.data_sync.sync_group(self.group).await;
            let failed = results.iter().filter(|r| !r.is_completed()).count();
            if failed == 0 {
                info!(
                    "{} sync completed ({} entities)",
                    self.group,
                    results.len()
                );
            } else {
                // エラーが発生してもループは継続
                let names: Vec<&str> = results
                    .iter()
                    .filter(|r| !r.is_completed())
                    .map(SyncResult::name)
                    .collect();
                warn!("{} sync failed for {:?}", self.group, names);
            }
        }

        info!("{} sync scheduler stopped", self.group);
    }
}
