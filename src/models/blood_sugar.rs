use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use super::{SyncStatus, SyncableRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum BloodSugarType {
    Random,
    PostPrandial,
    Fasting,
    Hba1c,
    #[serde(other)]
    Unknown,
}

impl BloodSugarType {
    /// Accepted reading range; HbA1c is a percentage, the rest are mg/dL.
    pub fn valid_range(&self) -> Option<(f64, f64)> {
        match self {
            BloodSugarType::Random | BloodSugarType::PostPrandial | BloodSugarType::Fasting => {
                Some((30.0, 1000.0))
            }
            BloodSugarType::Hba1c => Some((3.0, 25.0)),
            BloodSugarType::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BloodSugarMeasurement {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub facility_id: Uuid,
    pub user_id: Uuid,
    pub blood_sugar_type: BloodSugarType,
    pub blood_sugar_value: f64,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodSugarPayload {
    pub id: Uuid,
    pub blood_sugar_type: BloodSugarType,
    pub blood_sugar_value: f64,
    pub patient_id: Uuid,
    pub facility_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBloodSugar {
    pub blood_sugar_type: BloodSugarType,
    pub blood_sugar_value: f64,
    pub facility_id: Uuid,
    pub user_id: Uuid,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl NewBloodSugar {
    pub fn validate(&self) -> Result<(), String> {
        let Some((min, max)) = self.blood_sugar_type.valid_range() else {
            return Err("unknown blood sugar type".to_string());
        };
        if self.blood_sugar_value < min || self.blood_sugar_value > max {
            return Err(format!(
                "blood sugar value {} outside {}..={}",
                self.blood_sugar_value, min, max
            ));
        }
        Ok(())
    }
}

const UPSERT: &str = r#"
    INSERT INTO blood_sugars
        (id, patient_id, facility_id, user_id, blood_sugar_type, blood_sugar_value,
        recorded_at, created_at, updated_at, deleted_at, sync_status)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
    ON CONFLICT(id) DO UPDATE SET
        patient_id = excluded.patient_id,
        facility_id = excluded.facility_id,
        user_id = excluded.user_id,
        blood_sugar_type = excluded.blood_sugar_type,
        blood_sugar_value = excluded.blood_sugar_value,
        recorded_at = excluded.recorded_at,
        created_at = excluded.created_at,
        updated_at = excluded.updated_at,
        deleted_at = excluded.deleted_at,
        sync_status = excluded.sync_status
"#;

#[async_trait]
impl SyncableRecord for BloodSugarMeasurement {
    type Payload = BloodSugarPayload;

    const TABLE: &'static str = "blood_sugars";
    const RESOURCE: &'static str = "blood_sugars";
    const ENDPOINT: &'static str = "v4/blood_sugars/sync";
    const CURSOR_KEY: &'static str = "last_blood_sugar_pull_token_v4";

    fn id(&self) -> Uuid {
        self.id
    }

    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn to_payload(&self) -> BloodSugarPayload {
        BloodSugarPayload {
            id: self.id,
            blood_sugar_type: self.blood_sugar_type,
            blood_sugar_value: self.blood_sugar_value,
            patient_id: self.patient_id,
            facility_id: self.facility_id,
            user_id: self.user_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            recorded_at: self.recorded_at,
        }
    }

    fn from_payload(payload: BloodSugarPayload, sync_status: SyncStatus) -> Self {
        BloodSugarMeasurement {
            id: payload.id,
            patient_id: payload.patient_id,
            facility_id: payload.facility_id,
            user_id: payload.user_id,
            blood_sugar_type: payload.blood_sugar_type,
            blood_sugar_value: payload.blood_sugar_value,
            recorded_at: payload.recorded_at,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            deleted_at: payload.deleted_at,
            sync_status,
        }
    }

    fn payload_id(payload: &BloodSugarPayload) -> Uuid {
        payload.id
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(UPSERT)
            .bind(self.id)
            .bind(self.patient_id)
            .bind(self.facility_id)
            .bind(self.user_id)
            .bind(self.blood_sugar_type)
            .bind(self.blood_sugar_value)
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
