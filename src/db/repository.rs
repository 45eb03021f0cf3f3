use std::{collections::HashSet, marker::PhantomData};

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::begin_immediate;
use crate::models::{SyncStatus, SyncableRecord, can_be_overridden_by_server_copy};

/// Upper bound on ids bound into a single `IN (...)` clause.
const MAX_IDS_PER_STATEMENT: usize = 500;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub merged: usize,
    pub skipped: usize,
}

/// Storage operations the sync engine needs from one entity table.
pub struct SyncRepository<R> {
    db: SqlitePool,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for SyncRepository<R> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: SyncableRecord> SyncRepository<R> {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            _record: PhantomData,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    pub async fn save(&self, records: &[R]) -> Result<(), sqlx::Error> {
        let mut tx = self.db.begin().await?;
        for record in records {
            record.upsert(&mut tx).await?;
        }
        tx.commit().await
    }

    pub async fn get_one(&self, id: Uuid) -> Result<Option<R>, sqlx::Error> {
        let sql = format!("SELECT * FROM {} WHERE id = ?1", R::TABLE);
        sqlx::query_as::<_, R>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
    }

    pub async fn records_with_sync_status(&self, status: SyncStatus) -> Result<Vec<R>, sqlx::Error> {
        let sql = format!(
            "SELECT * FROM {} WHERE sync_status = ?1 ORDER BY updated_at ASC",
            R::TABLE
        );
        sqlx::query_as::<_, R>(&sql)
            .bind(status)
            .fetch_all(&self.db)
            .await
    }

    /// Records waiting to be pushed, oldest edit first. Rows stuck
    /// `IN_FLIGHT` after a failed push are included so they get resent.
    pub async fn pending_sync_records(&self, limit: u32) -> Result<Vec<R>, sqlx::Error> {
        let mut conn = self.db.acquire().await?;
        select_pending::<R>(&mut conn, limit).await
    }

    pub async fn mark_in_flight(&self, ids: &[Uuid]) -> Result<u64, sqlx::Error> {
        let mut conn = self.db.acquire().await?;
        update_status::<R>(&mut conn, ids, SyncStatus::InFlight, Some(SyncStatus::Pending)).await
    }

    /// Take the next batch to push: read it and flip its `PENDING` rows to
    /// `IN_FLIGHT` under one write lock. A local edit either lands before
    /// the read and travels with the batch, or after the flip and puts the
    /// row back to `PENDING`.
    pub async fn claim_pending_batch(&self, limit: u32) -> Result<Vec<R>, sqlx::Error> {
        let mut tx = begin_immediate(&self.db).await?;
        let batch = select_pending::<R>(&mut tx, limit).await?;
        let ids: Vec<Uuid> = batch.iter().map(|record| record.id()).collect();
        update_status::<R>(&mut tx, &ids, SyncStatus::InFlight, Some(SyncStatus::Pending)).await?;
        tx.commit().await?;
        Ok(batch)
    }

    pub async fn set_sync_status(&self, from: SyncStatus, to: SyncStatus) -> Result<u64, sqlx::Error> {
        let sql = format!(
            "UPDATE {} SET sync_status = ?1 WHERE sync_status = ?2",
            R::TABLE
        );
        let result = sqlx::query(&sql)
            .bind(to)
            .bind(from)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_sync_status_for_ids(&self, ids: &[Uuid], to: SyncStatus) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.db.acquire().await?;
        update_status::<R>(&mut conn, ids, to, None).await
    }

    /// Settle a finished push. Rows edited again while the request was out
    /// are back to `PENDING` and keep that status.
    pub async fn complete_push(
        &self,
        ids: &[Uuid],
        invalid_ids: &HashSet<Uuid>,
    ) -> Result<(u64, u64), sqlx::Error> {
        let (invalid, done): (Vec<Uuid>, Vec<Uuid>) =
            ids.iter().copied().partition(|id| invalid_ids.contains(id));

        let mut tx = self.db.begin().await?;
        let marked_invalid =
            update_status::<R>(&mut tx, &invalid, SyncStatus::Invalid, Some(SyncStatus::InFlight)).await?;
        let marked_done =
            update_status::<R>(&mut tx, &done, SyncStatus::Done, Some(SyncStatus::InFlight)).await?;
        tx.commit().await?;

        Ok((marked_done, marked_invalid))
    }

    /// Apply pulled server copies on `conn`. A local row that still carries
    /// an unsynced edit is left alone; everything else is replaced and
    /// marked `DONE`.
    pub async fn merge_with_local_data(
        conn: &mut SqliteConnection,
        payloads: Vec<R::Payload>,
    ) -> Result<MergeStats, sqlx::Error> {
        let sql = format!("SELECT sync_status FROM {} WHERE id = ?1", R::TABLE);
        let mut stats = MergeStats::default();

        for payload in payloads {
            let id = R::payload_id(&payload);
            let local = sqlx::query_scalar::<_, SyncStatus>(&sql)
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

            if can_be_overridden_by_server_copy(local) {
                R::from_payload(payload, SyncStatus::Done)
                    .upsert(&mut *conn)
                    .await?;
                stats.merged += 1;
            } else {
                debug!("{}: keeping local edit of {}", R::TABLE, id);
                stats.skipped += 1;
            }
        }

        Ok(stats)
    }

    pub async fn record_count(&self) -> Result<i64, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE deleted_at IS NULL", R::TABLE);
        sqlx::query_scalar::<_, i64>(&sql).fetch_one(&self.db).await
    }

    pub async fn pending_sync_record_count(&self) -> Result<i64, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE sync_status = ?1", R::TABLE);
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(SyncStatus::Pending)
            .fetch_one(&self.db)
            .await
    }

    /// Hard-delete soft-deleted rows the server already knows about.
    pub async fn purge_deleted(&self) -> Result<u64, sqlx::Error> {
        let sql = format!(
            "DELETE FROM {} WHERE deleted_at IS NOT NULL AND sync_status = ?1",
            R::TABLE
        );
        let result = sqlx::query(&sql)
            .bind(SyncStatus::Done)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

async fn select_pending<R: SyncableRecord>(
    conn: &mut SqliteConnection,
    limit: u32,
) -> Result<Vec<R>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT * FROM {}
        WHERE sync_status IN (?1, ?2)
        ORDER BY updated_at ASC, id ASC
        LIMIT ?3
        "#,
        R::TABLE
    );
    sqlx::query_as::<_, R>(&sql)
        .bind(SyncStatus::Pending)
        .bind(SyncStatus::InFlight)
        .bind(i64::from(limit))
        .fetch_all(&mut *conn)
        .await
}

async fn update_status<R: SyncableRecord>(
    conn: &mut SqliteConnection,
    ids: &[Uuid],
    to: SyncStatus,
    only_from: Option<SyncStatus>,
) -> Result<u64, sqlx::Error> {
    let mut affected = 0;

    for chunk in ids.chunks(MAX_IDS_PER_STATEMENT) {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("UPDATE {} SET sync_status = ", R::TABLE));
        builder.push_bind(to);
        builder.push(" WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        if let Some(from) = only_from {
            builder.push(" AND sync_status = ");
            builder.push_bind(from);
        }

        affected += builder.build().execute(&mut *conn).await?.rows_affected();
    }

    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::db::connect_in_memory;
    use crate::models::{BloodPressureMeasurement, BloodPressurePayload};

    fn measurement(status: SyncStatus, minutes_ago: i64) -> BloodPressureMeasurement {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        BloodPressureMeasurement {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            facility_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            systolic: 120,
            diastolic: 80,
            recorded_at: at,
            created_at: at,
            updated_at: at,
            deleted_at: None,
            sync_status: status,
        }
    }

    fn server_copy(of: &BloodPressureMeasurement, systolic: i32) -> BloodPressurePayload {
        BloodPressurePayload {
            systolic,
            ..of.to_payload()
        }
    }

    async fn setup() -> SyncRepository<BloodPressureMeasurement> {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        SyncRepository::new(pool)
    }

    #[tokio::test]
    async fn test_pending_records_include_in_flight_oldest_first() {
        let repo = setup().await;
        let newest = measurement(SyncStatus::Pending, 1);
        let stuck = measurement(SyncStatus::InFlight, 30);
        let oldest = measurement(SyncStatus::Pending, 60);
        let done = measurement(SyncStatus::Done, 90);
        repo.save(&[newest.clone(), stuck.clone(), oldest.clone(), done])
            .await
            .expect("Failed to save");

        let pending = repo.pending_sync_records(10).await.expect("query failed");
        let ids: Vec<Uuid> = pending.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![oldest.id, stuck.id, newest.id]);

        let limited = repo.pending_sync_records(2).await.expect("query failed");
        assert_eq!(limited.len(), 2);

        assert_eq!(repo.pending_sync_record_count().await.expect("count failed"), 2);
    }

    #[tokio::test]
    async fn test_complete_push_only_settles_rows_still_in_flight() {
        let repo = setup().await;
        let accepted = measurement(SyncStatus::Pending, 3);
        let rejected = measurement(SyncStatus::Pending, 2);
        let edited = measurement(SyncStatus::Pending, 1);
        repo.save(&[accepted.clone(), rejected.clone(), edited.clone()])
            .await
            .expect("Failed to save");

        let ids = vec![accepted.id, rejected.id, edited.id];
        assert_eq!(repo.mark_in_flight(&ids).await.expect("mark failed"), 3);

        // edited locally while the request is out
        repo.set_sync_status_for_ids(&[edited.id], SyncStatus::Pending)
            .await
            .expect("update failed");

        let invalid: HashSet<Uuid> = [rejected.id].into_iter().collect();
        let (done, marked_invalid) = repo
            .complete_push(&ids, &invalid)
            .await
            .expect("complete failed");
        assert_eq!((done, marked_invalid), (1, 1));

        let status = |id: Uuid| {
            let repo = repo.clone();
            async move {
                repo.get_one(id)
                    .await
                    .expect("get failed")
                    .expect("missing record")
                    .sync_status
            }
        };
        assert_eq!(status(accepted.id).await, SyncStatus::Done);
        assert_eq!(status(rejected.id).await, SyncStatus::Invalid);
        assert_eq!(status(edited.id).await, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn test_merge_never_overrides_unsynced_edits() {
        let repo = setup().await;
        let pending = measurement(SyncStatus::Pending, 4);
        let in_flight = measurement(SyncStatus::InFlight, 3);
        let done = measurement(SyncStatus::Done, 2);
        let invalid = measurement(SyncStatus::Invalid, 1);
        repo.save(&[pending.clone(), in_flight.clone(), done.clone(), invalid.clone()])
            .await
            .expect("Failed to save");
        let unseen = measurement(SyncStatus::Done, 0);

        let payloads = vec![
            server_copy(&pending, 150),
            server_copy(&in_flight, 150),
            server_copy(&done, 150),
            server_copy(&invalid, 150),
            server_copy(&unseen, 150),
        ];

        let mut conn = repo.pool().acquire().await.expect("acquire failed");
        let stats = SyncRepository::<BloodPressureMeasurement>::merge_with_local_data(&mut conn, payloads)
            .await
            .expect("merge failed");
        drop(conn);
        assert_eq!(stats, MergeStats { merged: 3, skipped: 2 });

        for kept in [&pending, &in_flight] {
            let local = repo.get_one(kept.id).await.expect("get failed").expect("missing");
            assert_eq!(local.systolic, 120);
            assert_eq!(local.sync_status, kept.sync_status);
        }
        for replaced in [&done, &invalid, &unseen] {
            let local = repo.get_one(replaced.id).await.expect("get failed").expect("missing");
            assert_eq!(local.systolic, 150);
            assert_eq!(local.sync_status, SyncStatus::Done);
        }
    }

    #[tokio::test]
    async fn test_status_updates() {
        let repo = setup().await;
        repo.save(&[measurement(SyncStatus::Invalid, 2), measurement(SyncStatus::Invalid, 1)])
            .await
            .expect("Failed to save");

        assert_eq!(
            repo.set_sync_status_for_ids(&[], SyncStatus::Done)
                .await
                .expect("update failed"),
            0
        );
        assert_eq!(
            repo.set_sync_status(SyncStatus::Invalid, SyncStatus::Pending)
                .await
                .expect("update failed"),
            2
        );
        let pending = repo
            .records_with_sync_status(SyncStatus::Pending)
            .await
            .expect("query failed");
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn test_purge_keeps_deletions_not_yet_pushed() {
        let repo = setup().await;
        let mut synced = measurement(SyncStatus::Done, 2);
        synced.deleted_at = Some(Utc::now());
        let mut unsynced = measurement(SyncStatus::Pending, 1);
        unsynced.deleted_at = Some(Utc::now());
        let live = measurement(SyncStatus::Done, 0);
        repo.save(&[synced.clone(), unsynced.clone(), live])
            .await
            .expect("Failed to save");

        assert_eq!(repo.record_count().await.expect("count failed"), 1);
        assert_eq!(repo.purge_deleted().await.expect("purge failed"), 1);
        assert!(repo.get_one(synced.id).await.expect("get failed").is_none());
        assert!(repo.get_one(unsynced.id).await.expect("get failed").is_some());
    }
}
