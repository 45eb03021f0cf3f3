use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use super::{SyncStatus, SyncableRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Transgender,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PatientStatus {
    Active,
    Dead,
    Migrated,
    Unresponsive,
    Inactive,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
    pub gender: Gender,
    pub date_of_birth: Option<NaiveDate>,
    pub age: Option<i32>,
    pub age_updated_at: Option<DateTime<Utc>>,
    pub status: PatientStatus,
    pub address_id: Uuid,
    pub street_address: Option<String>,
    pub village_or_colony: Option<String>,
    pub district: String,
    pub state: String,
    pub country: String,
    pub address_created_at: DateTime<Utc>,
    pub address_updated_at: DateTime<Utc>,
    pub address_deleted_at: Option<DateTime<Utc>>,
    pub registered_facility_id: Option<Uuid>,
    pub assigned_facility_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientAddressPayload {
    pub id: Uuid,
    pub street_address: Option<String>,
    pub village_or_colony: Option<String>,
    pub district: String,
    pub state: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientPayload {
    pub id: Uuid,
    pub full_name: String,
    pub gender: Gender,
    pub date_of_birth: Option<NaiveDate>,
    pub age: Option<i32>,
    pub age_updated_at: Option<DateTime<Utc>>,
    pub status: PatientStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
    pub address: PatientAddressPayload,
    pub registration_facility_id: Option<Uuid>,
    pub assigned_facility_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPatient {
    pub full_name: String,
    pub gender: Gender,
    pub date_of_birth: Option<NaiveDate>,
    pub age: Option<i32>,
    pub street_address: Option<String>,
    pub village_or_colony: Option<String>,
    pub district: String,
    pub state: String,
    pub country: String,
    pub registered_facility_id: Uuid,
}

impl NewPatient {
    pub fn validate(&self) -> Result<(), String> {
        if self.full_name.trim().is_empty() {
            return Err("full_name is required".to_string());
        }
        if self.date_of_birth.is_none() && self.age.is_none() {
            return Err("either date_of_birth or age is required".to_string());
        }
        if let Some(age) = self.age {
            if !(0..=120).contains(&age) {
                return Err(format!("age out of range: {}", age));
            }
        }
        if self.district.trim().is_empty() || self.state.trim().is_empty() {
            return Err("district and state are required".to_string());
        }
        Ok(())
    }
}

const UPSERT: &str = r#"
    INSERT INTO patients
        (id, full_name, gender, date_of_birth, age, age_updated_at, status,
        address_id, street_address, village_or_colony, district, state, country,
        address_created_at, address_updated_at, address_deleted_at,
        registered_facility_id, assigned_facility_id,
        recorded_at, created_at, updated_at, deleted_at, sync_status)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
        ?17, ?18, ?19, ?20, ?21, ?22, ?23)
    ON CONFLICT(id) DO UPDATE SET
        full_name = excluded.full_name,
        gender = excluded.gender,
        date_of_birth = excluded.date_of_birth,
        age = excluded.age,
        age_updated_at = excluded.age_updated_at,
        status = excluded.status,
        address_id = excluded.address_id,
        street_address = excluded.street_address,
        village_or_colony = excluded.village_or_colony,
        district = excluded.district,
        state = excluded.state,
        country = excluded.country,
        address_created_at = excluded.address_created_at,
        address_updated_at = excluded.address_updated_at,
        address_deleted_at = excluded.address_deleted_at,
        registered_facility_id = excluded.registered_facility_id,
        assigned_facility_id = excluded.assigned_facility_id,
        recorded_at = excluded.recorded_at,
        created_at = excluded.created_at,
        updated_at = excluded.updated_at,
        deleted_at = excluded.deleted_at,
        sync_status = excluded.sync_status
"#;

#[async_trait]
impl SyncableRecord for Patient {
    type Payload = PatientPayload;

    const TABLE: &'static str = "patients";
    const RESOURCE: &'static str = "patients";
    const ENDPOINT: &'static str = "v3/patients/sync";
    const CURSOR_KEY: &'static str = "last_patient_pull_token_v3";

    fn id(&self) -> Uuid {
        self.id
    }

    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn to_payload(&self) -> PatientPayload {
        PatientPayload {
            id: self.id,
            full_name: self.full_name.clone(),
            gender: self.gender,
            date_of_birth: self.date_of_birth,
            age: self.age,
            age_updated_at: self.age_updated_at,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            recorded_at: self.recorded_at,
            address: PatientAddressPayload {
                id: self.address_id,
                street_address: self.street_address.clone(),
                village_or_colony: self.village_or_colony.clone(),
                district: self.district.clone(),
                state: self.state.clone(),
                country: self.country.clone(),
                created_at: self.address_created_at,
                updated_at: self.address_updated_at,
                deleted_at: self.address_deleted_at,
            },
            registration_facility_id: self.registered_facility_id,
            assigned_facility_id: self.assigned_facility_id,
        }
    }

    fn from_payload(payload: PatientPayload, sync_status: SyncStatus) -> Self {
        let address = payload.address;
        Patient {
            id: payload.id,
            full_name: payload.full_name,
            gender: payload.gender,
            date_of_birth: payload.date_of_birth,
            age: payload.age,
            age_updated_at: payload.age_updated_at,
            status: payload.status,
            address_id: address.id,
            street_address: address.street_address,
            village_or_colony: address.village_or_colony,
            district: address.district,
            state: address.state,
            country: address.country,
            address_created_at: address.created_at,
            address_updated_at: address.updated_at,
            address_deleted_at: address.deleted_at,
            registered_facility_id: payload.registration_facility_id,
            assigned_facility_id: payload.assigned_facility_id,
            recorded_at: payload.recorded_at,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            deleted_at: payload.deleted_at,
            sync_status,
        }
    }

    fn payload_id(payload: &PatientPayload) -> Uuid {
        payload.id
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(UPSERT)
            .bind(self.id)
            .bind(&self.full_name)
            .bind(self.gender)
            .bind(self.date_of_birth)
            .bind(self.age)
            .bind(self.age_updated_at)
            .bind(self.status)
            .bind(self.address_id)
            .bind(&self.street_address)
            .bind(&self.village_or_colony)
            .bind(&self.district)
            .bind(&self.state)
            .bind(&self.country)
            .bind(self.address_created_at)
            .bind(self.address_updated_at)
            .bind(self.address_deleted_at)
            .bind(self.registered_facility_id)
            .bind(self.assigned_facility_id)
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
