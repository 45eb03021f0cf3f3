pub mod appointment;
pub mod blood_pressure;
pub mod blood_sugar;
pub mod facility;
pub mod follow_up_schedule;
pub mod medical_history;
pub mod patient;
pub mod sync_status;

pub use appointment::{
    Appointment, AppointmentPayload, AppointmentStatus, AppointmentType, CancelAppointment,
    CancelReason, NewAppointment,
};
pub use blood_pressure::{BloodPressureMeasurement, BloodPressurePayload, NewBloodPressure};
pub use blood_sugar::{BloodSugarMeasurement, BloodSugarPayload, BloodSugarType, NewBloodSugar};
pub use facility::{Facility, FacilityPayload};
pub use follow_up_schedule::{FollowUpSchedule, FollowUpSchedulePayload, NewFollowUp};
pub use medical_history::{Answer, MedicalHistory, MedicalHistoryEntry, MedicalHistoryPayload};
pub use patient::{Gender, NewPatient, Patient, PatientAddressPayload, PatientPayload, PatientStatus};
pub use sync_status::{SyncStatus, can_be_overridden_by_server_copy};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use sqlx::{FromRow, SqliteConnection, sqlite::SqliteRow};
use uuid::Uuid;

/// A local table whose rows are mirrored on the sync server.
///
/// Implementors describe where the rows live (`TABLE`), how they travel
/// (`RESOURCE` is the JSON key wrapping the payload list, `ENDPOINT` the path
/// under the API base url) and which preference holds the pull cursor. The
/// push/pull/merge logic itself is written once against this trait.
#[async_trait]
pub trait SyncableRecord:
    for<'r> FromRow<'r, SqliteRow> + Clone + Send + Sync + Unpin + 'static
{
    type Payload: Serialize + DeserializeOwned + Send + Sync + 'static;

    const TABLE: &'static str;
    const RESOURCE: &'static str;
    const ENDPOINT: &'static str;
    const CURSOR_KEY: &'static str;

    fn id(&self) -> Uuid;

    fn sync_status(&self) -> SyncStatus;

    fn to_payload(&self) -> Self::Payload;

    fn from_payload(payload: Self::Payload, sync_status: SyncStatus) -> Self;

    fn payload_id(payload: &Self::Payload) -> Uuid;

    /// Insert the row, or replace every column of the existing row with the
    /// same id.
    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error>;
}
