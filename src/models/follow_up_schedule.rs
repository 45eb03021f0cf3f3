use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use super::{SyncStatus, SyncableRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FollowUpSchedule {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub facility_id: Uuid,
    pub user_id: Uuid,
    pub next_visit: NaiveDate,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpSchedulePayload {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub facility_id: Uuid,
    pub user_id: Uuid,
    pub next_visit: NaiveDate,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFollowUp {
    pub facility_id: Uuid,
    pub user_id: Uuid,
    pub next_visit: NaiveDate,
    pub reason: Option<String>,
}

const UPSERT: &str = r#"
    INSERT INTO follow_up_schedules
        (id, patient_id, facility_id, user_id, next_visit, reason,
        created_at, updated_at, deleted_at, sync_status)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT(id) DO UPDATE SET
        patient_id = excluded.patient_id,
        facility_id = excluded.facility_id,
        user_id = excluded.user_id,
        next_visit = excluded.next_visit,
        reason = excluded.reason,
        created_at = excluded.created_at,
        updated_at = excluded.updated_at,
        deleted_at = excluded.deleted_at,
        sync_status = excluded.sync_status
"#;

#[async_trait]
impl SyncableRecord for FollowUpSchedule {
    type Payload = FollowUpSchedulePayload;

    const TABLE: &'static str = "follow_up_schedules";
    const RESOURCE: &'static str = "follow_up_schedules";
    const ENDPOINT: &'static str = "v4/follow_up_schedules/sync";
    const CURSOR_KEY: &'static str = "last_follow_up_schedule_pull_token_v4";

    fn id(&self) -> Uuid {
        self.id
    }

    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn to_payload(&self) -> FollowUpSchedulePayload {
        FollowUpSchedulePayload {
            id: self.id,
            patient_id: self.patient_id,
            facility_id: self.facility_id,
            user_id: self.user_id,
            next_visit: self.next_visit,
            reason: self.reason.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }

    fn from_payload(payload: FollowUpSchedulePayload, sync_status: SyncStatus) -> Self {
        FollowUpSchedule {
            id: payload.id,
            patient_id: payload.patient_id,
            facility_id: payload.facility_id,
            user_id: payload.user_id,
            next_visit: payload.next_visit,
            reason: payload.reason,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            deleted_at: payload.deleted_at,
            sync_status,
        }
    }

    fn payload_id(payload: &FollowUpSchedulePayload) -> Uuid {
        payload.id
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(UPSERT)
            .bind(self.id)
            .bind(self.patient_id)
            .bind(self.facility_id)
            .bind(self.user_id)
            .bind(self.next_visit)
            .bind(&self.reason)
            .bind(self.created_at)
            .bind(self.updated_at)
            .bind(self.deleted_at)
            .bind(self.sync_status)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
