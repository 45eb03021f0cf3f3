use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use super::{SyncStatus, SyncableRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Answer {
    Yes,
    No,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MedicalHistory {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub diagnosed_with_hypertension: Answer,
    pub is_on_treatment_for_hypertension: Answer,
    pub has_had_heart_attack: Answer,
    pub has_had_stroke: Answer,
    pub has_had_kidney_disease: Answer,
    pub has_diabetes: Answer,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalHistoryPayload {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub diagnosed_with_hypertension: Answer,
    pub receiving_treatment_for_hypertension: Answer,
    pub prior_heart_attack: Answer,
    pub prior_stroke: Answer,
    pub chronic_kidney_disease: Answer,
    pub diabetes: Answer,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}

/// Answers captured on the medical history screen. Omitted questions stay
/// unanswered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MedicalHistoryEntry {
    pub diagnosed_with_hypertension: Answer,
    pub is_on_treatment_for_hypertension: Answer,
    pub has_had_heart_attack: Answer,
    pub has_had_stroke: Answer,
    pub has_had_kidney_disease: Answer,
    pub has_diabetes: Answer,
}

const UPSERT: &str = r#"
    INSERT INTO medical_histories
        (id, patient_id, diagnosed_with_hypertension, is_on_treatment_for_hypertension,
        has_had_heart_attack, has_had_stroke, has_had_kidney_disease, has_diabetes,
        recorded_at, created_at, updated_at, deleted_at, sync_status)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
    ON CONFLICT(id) DO UPDATE SET
        patient_id = excluded.patient_id,
        diagnosed_with_hypertension = excluded.diagnosed_with_hypertension,
        is_on_treatment_for_hypertension = excluded.is_on_treatment_for_hypertension,
        has_had_heart_attack = excluded.has_had_heart_attack,
        has_had_stroke = excluded.has_had_stroke,
        has_had_kidney_disease = excluded.has_had_kidney_disease,
        has_diabetes = excluded.has_diabetes,
        recorded_at = excluded.recorded_at,
        created_at = excluded.created_at,
        updated_at = excluded.updated_at,
        deleted_at = excluded.deleted_at,
        sync_status = excluded.sync_status
"#;

#[async_trait]
impl SyncableRecord for MedicalHistory {
    type Payload = MedicalHistoryPayload;

    const TABLE: &'static str = "medical_histories";
    const RESOURCE: &'static str = "medical_histories";
    const ENDPOINT: &'static str = "v3/medical_histories/sync";
    const CURSOR_KEY: &'static str = "last_medical_history_pull_token_v3";

    fn id(&self) -> Uuid {
        self.id
    }

    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn to_payload(&self) -> MedicalHistoryPayload {
        MedicalHistoryPayload {
            id: self.id,
            patient_id: self.patient_id,
            diagnosed_with_hypertension: self.diagnosed_with_hypertension,
            receiving_treatment_for_hypertension: self.is_on_treatment_for_hypertension,
            prior_heart_attack: self.has_had_heart_attack,
            prior_stroke: self.has_had_stroke,
            chronic_kidney_disease: self.has_had_kidney_disease,
            diabetes: self.has_diabetes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            recorded_at: self.recorded_at,
        }
    }

    fn from_payload(payload: MedicalHistoryPayload, sync_status: SyncStatus) -> Self {
        MedicalHistory {
            id: payload.id,
            patient_id: payload.patient_id,
            diagnosed_with_hypertension: payload.diagnosed_with_hypertension,
            is_on_treatment_for_hypertension: payload.receiving_treatment_for_hypertension,
            has_had_heart_attack: payload.prior_heart_attack,
            has_had_stroke: payload.prior_stroke,
            has_had_kidney_disease: payload.chronic_kidney_disease,
            has_diabetes: payload.diabetes,
            recorded_at: payload.recorded_at,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            deleted_at: payload.deleted_at,
            sync_status,
        }
    }

    fn payload_id(payload: &MedicalHistoryPayload) -> Uuid {
        payload.id
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(UPSERT)
            .bind(self.id)
            .bind(self.patient_id)
            .bind(self.diagnosed_with_hypertension)
            .bind(self.is_on_treatment_for_hypertension)
            .bind(self.has_had_heart_attack)
            .bind(self.has_had_stroke)
            .bind(self.has_had_kidney_disease)
            .bind(self.has_diabetes)
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
