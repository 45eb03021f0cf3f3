use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use super::{SyncStatus, SyncableRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BloodPressureMeasurement {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub facility_id: Uuid,
    pub user_id: Uuid,
    pub systolic: i32,
    pub diastolic: i32,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodPressurePayload {
    pub id: Uuid,
    pub systolic: i32,
    pub diastolic: i32,
    pub patient_id: Uuid,
    pub facility_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBloodPressure {
    pub systolic: i32,
    pub diastolic: i32,
    pub facility_id: Uuid,
    pub user_id: Uuid,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl NewBloodPressure {
    pub fn validate(&self) -> Result<(), String> {
        if !(70..=300).contains(&self.systolic) {
            return Err(format!("systolic out of range: {}", self.systolic));
        }
        if !(40..=180).contains(&self.diastolic) {
            return Err(format!("diastolic out of range: {}", self.diastolic));
        }
        if self.systolic < self.diastolic {
            return Err("systolic must not be less than diastolic".to_string());
        }
        Ok(())
    }
}

const UPSERT: &str = r#"
    INSERT INTO blood_pressures
        (id, patient_id, facility_id, user_id, systolic, diastolic,
        recorded_at, created_at, updated_at, deleted_at, sync_status)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
    ON CONFLICT(id) DO UPDATE SET
        patient_id = excluded.patient_id,
        facility_id = excluded.facility_id,
        user_id = excluded.user_id,
        systolic = excluded.systolic,
        diastolic = excluded.diastolic,
        recorded_at = excluded.recorded_at,
        created_at = excluded.created_at,
        updated_at = excluded.updated_at,
        deleted_at = excluded.deleted_at,
        sync_status = excluded.sync_status
"#;

#[async_trait]
impl SyncableRecord for BloodPressureMeasurement {
    type Payload = BloodPressurePayload;

    const TABLE: &'static str = "blood_pressures";
    const RESOURCE: &'static str = "blood_pressures";
    const ENDPOINT: &'static str = "v3/blood_pressures/sync";
    const CURSOR_KEY: &'static str = "last_bp_pull_token_v3";

    fn id(&self) -> Uuid {
        self.id
    }

    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn to_payload(&self) -> BloodPressurePayload {
        BloodPressurePayload {
            id: self.id,
            systolic: self.systolic,
            diastolic: self.diastolic,
            patient_id: self.patient_id,
            facility_id: self.facility_id,
            user_id: self.user_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            recorded_at: self.recorded_at,
        }
    }

    fn from_payload(payload: BloodPressurePayload, sync_status: SyncStatus) -> Self {
        BloodPressureMeasurement {
            id: payload.id,
            patient_id: payload.patient_id,
            facility_id: payload.facility_id,
            user_id: payload.user_id,
            systolic: payload.systolic,
            diastolic: payload.diastolic,
            recorded_at: payload.recorded_at,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            deleted_at: payload.deleted_at,
            sync_status,
        }
    }

    fn payload_id(payload: &BloodPressurePayload) -> Uuid {
        payload.id
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(UPSERT)
            .bind(self.id)
            .bind(self.patient_id)
            .bind(self.facility_id)
            .bind(self.user_id)
            .bind(self.systolic)
            .bind(self.diastolic)
            .bind(self.recorded_at)
            .bind(self.created_at)
            .bind(self.updated_at)
            .bind(self.deleted_at)
            .bind(self.sync_status)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(systolic: i32, diastolic: i32) -> NewBloodPressure {
        NewBloodPressure {
            systolic,
            diastolic,
            facility_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            recorded_at: None,
        }
    }

    #[test]
    fn rejects_implausible_readings() {
        assert!(reading(120, 80).validate().is_ok());
        assert!(reading(60, 40).validate().is_err());
        assert!(reading(120, 200).validate().is_err());
        assert!(reading(90, 100).validate().is_err());
    }
}
