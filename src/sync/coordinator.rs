//! The push and pull halves of a sync, written once for every
//! [`SyncableRecord`].

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{self, SyncRepository, preferences};
use crate::error::AppError;
use crate::models::SyncableRecord;
use crate::remote::{DataPullResponse, SyncApi};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PushStats {
    pub pushed: u64,
    pub invalid: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PullStats {
    pub pulled: u64,
    pub skipped: u64,
}

/// Send every unsynced record in batches of `batch_size`.
///
/// Each batch is read and claimed as `IN_FLIGHT` in one write transaction
/// before the request goes out. When the server answers, rejected ids become
/// `INVALID` and the rest `DONE`. A failed request leaves the batch
/// `IN_FLIGHT`; it is picked up again on the next push.
pub async fn push<R: SyncableRecord>(
    repo: &SyncRepository<R>,
    api: &dyn SyncApi,
    batch_size: u32,
) -> Result<PushStats, AppError> {
    let mut stats = PushStats::default();

    loop {
        let batch = repo.claim_pending_batch(batch_size).await?;
        if batch.is_empty() {
            break;
        }
        let ids: Vec<Uuid> = batch.iter().map(|record| record.id()).collect();

        let payloads = batch
            .iter()
            .map(|record| serde_json::to_value(record.to_payload()))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("{}: pushing {} records", R::TABLE, payloads.len());
        let response = api.push(R::ENDPOINT, R::RESOURCE, payloads).await?;

        for error in &response.errors {
            warn!(
                "{}: server rejected {}: schema={:?} fields={:?}",
                R::TABLE,
                error.id,
                error.schema,
                error.fields
            );
        }

        let (done, invalid) = repo.complete_push(&ids, &response.invalid_ids()).await?;
        stats.pushed += done;
        stats.invalid += invalid;

        // a short batch drained the queue; a batch that settled nothing was
        // entirely re-edited mid-flight and is left for the next cycle
        if batch.len() < batch_size as usize || done + invalid == 0 {
            break;
        }
    }

    if stats.pushed > 0 || stats.invalid > 0 {
        info!(
            "{}: pushed {} records ({} rejected)",
            R::TABLE,
            stats.pushed,
            stats.invalid
        );
    }
    Ok(stats)
}

/// Fetch server changes since the stored cursor and merge them.
///
/// The merge and the cursor move share one transaction, so the cursor never
/// runs ahead of what was written. Pulling continues while the server fills
/// whole batches and keeps advancing the token.
pub async fn pull<R: SyncableRecord>(
    repo: &SyncRepository<R>,
    api: &dyn SyncApi,
    batch_size: u32,
) -> Result<PullStats, AppError> {
    let mut stats = PullStats::default();
    let mut cursor = preferences::get(repo.pool(), R::CURSOR_KEY).await?;

    loop {
        let value = api.pull(R::ENDPOINT, cursor.as_deref(), batch_size).await?;
        let response = DataPullResponse::<R::Payload>::from_value(R::RESOURCE, value)?;
        let received = response.payloads.len();

        let mut tx = db::begin_immediate(repo.pool()).await?;
        let merge = SyncRepository::<R>::merge_with_local_data(&mut tx, response.payloads).await?;
        if let Some(token) = &response.process_token {
            preferences::set_in(&mut tx, R::CURSOR_KEY, token).await?;
        }
        tx.commit().await?;

        stats.pulled += merge.merged as u64;
        stats.skipped += merge.skipped as u64;
        debug!(
            "{}: merged {} of {} pulled records",
            R::TABLE,
            merge.merged,
            received
        );

        let advanced = response.process_token.is_some() && response.process_token != cursor;
        if received < batch_size as usize || !advanced {
            break;
        }
        cursor = response.process_token;
    }

    if stats.pulled > 0 || stats.skipped > 0 {
        info!(
            "{}: pulled {} records ({} kept local edits)",
            R::TABLE,
            stats.pulled,
            stats.skipped
        );
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{Value, json};

    use super::*;
    use crate::db::connect_in_memory;
    use crate::models::{FollowUpSchedule, SyncStatus};
    use crate::remote::{DataPushResponse, ValidationErrors};

    /// Records every push and serves a fixed list of pull pages.
    #[derive(Default)]
    struct ScriptedApi {
        reject: HashSet<Uuid>,
        fail_push: bool,
        pushed: Mutex<Vec<Value>>,
        pages: Mutex<Vec<Value>>,
        cursors_seen: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl SyncApi for ScriptedApi {
        async fn push(
            &self,
            _endpoint: &str,
            _resource: &str,
            payloads: Vec<Value>,
        ) -> Result<DataPushResponse, AppError> {
            if self.fail_push {
                return Err(AppError::Network("connection reset".to_string()));
            }
            let errors = payloads
                .iter()
                .filter_map(|p| p["id"].as_str().and_then(|id| id.parse::<Uuid>().ok()))
                .filter(|id| self.reject.contains(id))
                .map(|id| ValidationErrors {
                    id,
                    schema: vec!["next_visit is in the past".to_string()],
                    fields: Default::default(),
                })
                .collect();
            self.pushed.lock().unwrap().extend(payloads);
            Ok(DataPushResponse { errors })
        }

        async fn pull(&self, _endpoint: &str, cursor: Option<&str>, _limit: u32) -> Result<Value, AppError> {
            self.cursors_seen.lock().unwrap().push(cursor.map(str::to_string));
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                return Ok(json!({ "follow_up_schedules": [] }));
            }
            Ok(pages.remove(0))
        }
    }

    fn follow_up(status: SyncStatus) -> FollowUpSchedule {
        let now = Utc::now();
        FollowUpSchedule {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            facility_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            next_visit: now.date_naive(),
            reason: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            sync_status: status,
        }
    }

    async fn status_of(repo: &SyncRepository<FollowUpSchedule>, id: Uuid) -> SyncStatus {
        repo.get_one(id)
            .await
            .expect("get failed")
            .expect("missing record")
            .sync_status
    }

    #[tokio::test]
    async fn test_push_settles_batches_and_flags_rejections() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let repo = SyncRepository::<FollowUpSchedule>::new(pool);
        let records: Vec<FollowUpSchedule> = (0..5).map(|_| follow_up(SyncStatus::Pending)).collect();
        repo.save(&records).await.expect("Failed to save");

        let api = ScriptedApi {
            reject: [records[1].id].into_iter().collect(),
            ..Default::default()
        };
        let stats = push(&repo, &api, 2).await.expect("push failed");

        assert_eq!(stats, PushStats { pushed: 4, invalid: 1 });
        assert_eq!(api.pushed.lock().unwrap().len(), 5);
        assert_eq!(status_of(&repo, records[1].id).await, SyncStatus::Invalid);
        assert_eq!(status_of(&repo, records[4].id).await, SyncStatus::Done);
    }

    #[tokio::test]
    async fn test_failed_push_leaves_records_in_flight() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let repo = SyncRepository::<FollowUpSchedule>::new(pool);
        let record = follow_up(SyncStatus::Pending);
        repo.save(std::slice::from_ref(&record)).await.expect("Failed to save");

        let failing = ScriptedApi {
            fail_push: true,
            ..Default::default()
        };
        let result = push(&repo, &failing, 10).await;
        assert!(matches!(result, Err(AppError::Network(_))));
        assert_eq!(status_of(&repo, record.id).await, SyncStatus::InFlight);

        let healthy = ScriptedApi::default();
        let stats = push(&repo, &healthy, 10).await.expect("push failed");
        assert_eq!(stats.pushed, 1);
        assert_eq!(status_of(&repo, record.id).await, SyncStatus::Done);
    }

    #[tokio::test]
    async fn test_edit_racing_a_push_is_never_swallowed() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let repo = SyncRepository::<FollowUpSchedule>::new(pool);

        // 削除が push のどの時点に割り込んでも失われないこと
        for yields in 0..8 {
            let record = follow_up(SyncStatus::Pending);
            repo.save(std::slice::from_ref(&record)).await.expect("Failed to save");

            let deleted = FollowUpSchedule {
                deleted_at: Some(Utc::now()),
                updated_at: Utc::now(),
                ..record.clone()
            };
            let writer = {
                let repo = repo.clone();
                tokio::spawn(async move {
                    for _ in 0..yields {
                        tokio::task::yield_now().await;
                    }
                    repo.save(std::slice::from_ref(&deleted)).await
                })
            };

            let api = ScriptedApi::default();
            push(&repo, &api, 10).await.expect("push failed");
            writer.await.expect("writer panicked").expect("Failed to save edit");

            let server_saw_delete = api
                .pushed
                .lock()
                .unwrap()
                .iter()
                .any(|p| p["id"] == json!(record.id) && !p["deleted_at"].is_null());
            let local = repo.get_one(record.id).await.expect("get failed").expect("missing record");
            assert!(local.deleted_at.is_some());
            assert!(
                server_saw_delete || local.sync_status == SyncStatus::Pending,
                "delete lost after {} yields: local status {:?}",
                yields,
                local.sync_status
            );

            // 次のサイクルで必ず届く
            push(&repo, &api, 10).await.expect("push failed");
            assert_eq!(status_of(&repo, record.id).await, SyncStatus::Done);
            assert!(
                api.pushed
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|p| p["id"] == json!(record.id) && !p["deleted_at"].is_null())
            );
        }
    }

    #[tokio::test]
    async fn test_claimed_batch_is_in_flight() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let repo = SyncRepository::<FollowUpSchedule>::new(pool);
        let records: Vec<FollowUpSchedule> = (0..3).map(|_| follow_up(SyncStatus::Pending)).collect();
        repo.save(&records).await.expect("Failed to save");

        let batch = repo.claim_pending_batch(2).await.expect("claim failed");
        assert_eq!(batch.len(), 2);
        for record in &batch {
            assert_eq!(status_of(&repo, record.id).await, SyncStatus::InFlight);
        }
        assert_eq!(repo.pending_sync_record_count().await.expect("count failed"), 1);
    }

    #[tokio::test]
    async fn test_pull_follows_tokens_until_a_short_page() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let repo = SyncRepository::<FollowUpSchedule>::new(pool.clone());
        preferences::set(&pool, FollowUpSchedule::CURSOR_KEY, "t0")
            .await
            .expect("set failed");

        let page = |n: usize, token: &str| {
            let payloads: Vec<Value> = (0..n)
                .map(|_| serde_json::to_value(follow_up(SyncStatus::Done).to_payload()).unwrap())
                .collect();
            json!({ "follow_up_schedules": payloads, "process_token": token })
        };
        let api = ScriptedApi {
            pages: Mutex::new(vec![page(2, "t1"), page(2, "t2"), page(1, "t3")]),
            ..Default::default()
        };

        let stats = pull(&repo, &api, 2).await.expect("pull failed");

        assert_eq!(stats, PullStats { pulled: 5, skipped: 0 });
        assert_eq!(
            *api.cursors_seen.lock().unwrap(),
            vec![Some("t0".to_string()), Some("t1".to_string()), Some("t2".to_string())]
        );
        assert_eq!(
            preferences::get(&pool, FollowUpSchedule::CURSOR_KEY)
                .await
                .expect("get failed")
                .as_deref(),
            Some("t3")
        );
        assert_eq!(repo.record_count().await.expect("count failed"), 5);
    }

    #[tokio::test]
    async fn test_pull_stops_when_token_does_not_move() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let repo = SyncRepository::<FollowUpSchedule>::new(pool);

        let full_page = json!({
            "follow_up_schedules": [
                serde_json::to_value(follow_up(SyncStatus::Done).to_payload()).unwrap()
            ],
            "process_token": null
        });
        let api = ScriptedApi {
            pages: Mutex::new(vec![full_page.clone(), full_page]),
            ..Default::default()
        };

        let stats = pull(&repo, &api, 1).await.expect("pull failed");
        assert_eq!(stats.pulled, 1);
        assert_eq!(api.cursors_seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_page_does_not_move_cursor() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let repo = SyncRepository::<FollowUpSchedule>::new(pool.clone());

        let api = ScriptedApi {
            pages: Mutex::new(vec![json!({
                "follow_up_schedules": [{ "id": "not-a-uuid" }],
                "process_token": "t9"
            })]),
            ..Default::default()
        };

        assert!(pull(&repo, &api, 10).await.is_err());
        assert_eq!(
            preferences::get(&pool, FollowUpSchedule::CURSOR_KEY)
                .await
                .expect("get failed"),
            None
        );
    }
}
