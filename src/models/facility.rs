use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use super::{SyncStatus, SyncableRecord};

/// Facilities are owned by the server and only ever pulled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Facility {
    pub id: Uuid,
    pub name: String,
    pub facility_type: Option<String>,
    pub district: String,
    pub state: String,
    pub country: String,
    pub protocol_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityPayload {
    pub id: Uuid,
    pub name: String,
    pub facility_type: Option<String>,
    pub district: String,
    pub state: String,
    pub country: String,
    pub protocol_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

const UPSERT: &str = r#"
    INSERT INTO facilities
        (id, name, facility_type, district, state, country, protocol_id,
        created_at, updated_at, deleted_at, sync_status)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        facility_type = excluded.facility_type,
        district = excluded.district,
        state = excluded.state,
        country = excluded.country,
        protocol_id = excluded.protocol_id,
        created_at = excluded.created_at,
        updated_at = excluded.updated_at,
        deleted_at = excluded.deleted_at,
        sync_status = excluded.sync_status
"#;

#[async_trait]
impl SyncableRecord for Facility {
    type Payload = FacilityPayload;

    const TABLE: &'static str = "facilities";
    const RESOURCE: &'static str = "facilities";
    const ENDPOINT: &'static str = "v3/facilities/sync";
    const CURSOR_KEY: &'static str = "last_facility_pull_token_v3";

    fn id(&self) -> Uuid {
        self.id
    }

    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn to_payload(&self) -> FacilityPayload {
        FacilityPayload {
            id: self.id,
            name: self.name.clone(),
            facility_type: self.facility_type.clone(),
            district: self.district.clone(),
            state: self.state.clone(),
            country: self.country.clone(),
            protocol_id: self.protocol_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }

    fn from_payload(payload: FacilityPayload, sync_status: SyncStatus) -> Self {
        Facility {
            id: payload.id,
            name: payload.name,
            facility_type: payload.facility_type,
            district: payload.district,
            state: payload.state,
            country: payload.country,
            protocol_id: payload.protocol_id,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            deleted_at: payload.deleted_at,
            sync_status,
        }
    }

    fn payload_id(payload: &FacilityPayload) -> Uuid {
        payload.id
    }

    async fn upsert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(UPSERT)
            .bind(self.id)
            .bind(&self.name)
            .bind(&self.facility_type)
            .bind(&self.district)
            .bind(&self.state)
            .bind(&self.country)
            .bind(self.protocol_id)
            .bind(self.created_at)
            .bind(self.updated_at)
            .bind(self.deleted_at)
            .bind(self.sync_status)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
