use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use super::{SyncStatus, SyncableRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Visited,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CancelReason {
    NotResponding,
    Moved,
    Dead,
    InvalidPhoneNumber,
    PublicHospitalTransfer,
    MovedToPrivate,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AppointmentType {
    Manual,
    Automatic,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub facility_id: Uuid,
    pub creation_facility_id: Option<Uuid>,
    pub scheduled_date: NaiveDate,
    pub status: AppointmentStatus,
    pub cancel_reason: Option<CancelReason>,
    pub remind_on: Option<NaiveDate>,
    pub agreed_to_visit: Option<bool>,
    pub appointment_type: AppointmentType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentPayload {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub facility_id: Uuid,
    pub creation_facility_id: Option<Uuid>,
    pub scheduled_date: NaiveDate,
    pub status: AppointmentStatus,
    pub cancel_reason: Option<CancelReason>,
    pub remind_on: Option<NaiveDate>,
    pub agreed_to_visit: Option<bool>,
    pub appointment_type: AppointmentType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub facility_id: Uuid,
    pub scheduled_date: NaiveDate,
    #[serde(default = "default_appointment_type")]
    pub appointment_type: AppointmentType,
}

fn default_appointment_type() -> AppointmentType {
    AppointmentType::Manual
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointment {
    pub reason: CancelReason,
}

const UPSERT: &str = r#"
    INSERT INTO appointments
        (id, patient_id, facility_id, creation_facility_id, scheduled_date, status,
        cancel_reason, remind_on, agreed_to_visit, appointment_type,
        created_at, updated_at, deleted_at, sync_status)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
    ON CONFLICT(id) DO UPDATE SET
        patient_id = excluded.patient_id,
        facility_id = excluded.facility_id,
        creation_facility_id = excluded.creation_facility_id,
        scheduled_date = excluded.scheduled_date,
        status = excluded.status,
        cancel_reason = excluded.cancel_reason,
        remind_on = excluded.remind_on,
        agreed_to_visit = excluded.agreed_to_visit,
        appointment_type = excluded.appointment_type,
        created_at = excluded.created_at,
        updated_at = excluded.updated_at,
        deleted_at = excluded.deleted_at,
        sync_status = excluded.sync_status
"#;

#[async_trait]
impl SyncableRecord for Appointment {
    type Payload = AppointmentPayload;

    const TABLE: &'static str = "appointments";
    const RESOURCE: &'static str = "appointments";
    const ENDPOINT: &'static str = "v3/appointments/sync";
    const CURSOR_KEY: &'static str = "last_appointment_pull_token_v3";

    fn id(&self) -> Uuid {
        self.id
    }

    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn to_payload(&self) -> AppointmentPayload {
        AppointmentPayload {
            id: self.id,
            patient_id: self.patient_id,
            facility_id: self.facility_id,
            creation_facility_id: self.creation_facility_id,
            scheduled_date: self.scheduled_date,
            status: self.status,
            cancel_reason: self.cancel_reason,
            remind_on: self.remind_on,
            agreed_to_visit: self.agreed_to_visit,
            appointment_type: self.appointment_type,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }

    fn from_payload(payload: AppointmentPayload, sync_status: SyncStatus) -> Self {
        Appointment {
            id: payload.id,
            patient_id: payload.patient_id,
            facility_id: payload.facility_id,
            creation_facility_id: payload.creation_facility_id,
            scheduled_date: payload.scheduled_date,
            status: payload.status,
            cancel_reason: payload.cancel_reason,
            remind_on: payload.remind_on,
            agreed_to_visit: payload.agreed_to_visit,
            appointment_type: payload.appointment_type,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            deleted_at: payload.deleted_at,
            sync_status,
        }
    }

    fn payload_id(payload: &AppointmentPayload) -> Uuid {
        payload.id
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(UPSERT)
            .bind(self.id)
            .bind(self.patient_id)
            .bind(self.facility_id)
            .bind(self.creation_facility_id)
            .bind(self.scheduled_date)
            .bind(self.status)
            .bind(self.cancel_reason)
            .bind(self.remind_on)
            .bind(self.agreed_to_visit)
            .bind(self.appointment_type)
            .bind(self.created_at)
            .bind(self.updated_at)
            .bind(self.deleted_at)
            .bind(self.sync_status)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
