use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::{delete, patch, post, put};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::records;
use crate::error::AppError;
use crate::models::*;
use crate::services::{DataSyncStatus, SyncResult};
use crate::session::LoggedInUser;
use crate::state::AppState;
use crate::sync::SyncGroup;

#[derive(Deserialize)]
struct OverdueParams {
    today: Option<NaiveDate>,
}

#[derive(Serialize)]
struct SyncStatusResponse {
    user: Option<LoggedInUser>,
    can_sync_data: bool,
    #[serde(flatten)]
    status: DataSyncStatus,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync", post(sync_now))
        .route("/sync/status", get(sync_status))
        .route("/sync/{group}", post(sync_group))
        .route("/patients", post(register_patient))
        .route("/patients/{id}/blood_pressures", post(record_blood_pressure))
        .route("/patients/{id}/blood_sugars", post(record_blood_sugar))
        .route("/patients/{id}/medical_history", put(save_medical_history))
        .route("/patients/{id}/appointments", post(schedule_appointment))
        .route("/patients/{id}/follow_ups", post(schedule_follow_up))
        .route("/appointments/{id}/cancel", patch(cancel_appointment))
        .route("/blood_pressures/{id}", delete(delete_blood_pressure))
        .route(
            "/facilities/{id}/overdue_appointments",
            get(overdue_appointments),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn sync_now(State(state): State<AppState>) -> Json<Vec<SyncResult>> {
    Json(state.data_sync.sync_the_world().await)
}

async fn sync_group(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<Vec<SyncResult>>, AppError> {
    let group = group.parse::<SyncGroup>().map_err(AppError::BadRequest)?;
    Ok(Json(state.data_sync.sync_group(group).await))
}

async fn sync_status(State(state): State<AppState>) -> Result<Json<SyncStatusResponse>, AppError> {
    Ok(Json(SyncStatusResponse {
        user: state.session.logged_in_user(),
        can_sync_data: state.session.can_sync_data(),
        status: state.data_sync.status().await?,
    }))
}

async fn register_patient(
    State(state): State<AppState>,
    Json(req): Json<NewPatient>,
) -> Result<(StatusCode, Json<Patient>), AppError> {
    let patient = records::register_patient(&state.db, req).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

async fn record_blood_pressure(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
    Json(req): Json<NewBloodPressure>,
) -> Result<(StatusCode, Json<BloodPressureMeasurement>), AppError> {
    let measurement = records::record_blood_pressure(&state.db, patient_id, req).await?;
    Ok((StatusCode::CREATED, Json(measurement)))
}

async fn record_blood_sugar(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
    Json(req): Json<NewBloodSugar>,
) -> Result<(StatusCode, Json<BloodSugarMeasurement>), AppError> {
    let measurement = records::record_blood_sugar(&state.db, patient_id, req).await?;
    Ok((StatusCode::CREATED, Json(measurement)))
}

async fn save_medical_history(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
    Json(entry): Json<MedicalHistoryEntry>,
) -> Result<Json<MedicalHistory>, AppError> {
    let history = records::save_medical_history(&state.db, patient_id, entry).await?;
    Ok(Json(history))
}

async fn schedule_appointment(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
    Json(req): Json<NewAppointment>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    let appointment = records::schedule_appointment(&state.db, patient_id, req).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

async fn schedule_follow_up(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
    Json(req): Json<NewFollowUp>,
) -> Result<(StatusCode, Json<FollowUpSchedule>), AppError> {
    let follow_up = records::schedule_follow_up(&state.db, patient_id, req).await?;
    Ok((StatusCode::CREATED, Json(follow_up)))
}

async fn cancel_appointment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelAppointment>,
) -> Result<Json<Appointment>, AppError> {
    let appointment = records::cancel_appointment(&state.db, id, req.reason)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(appointment))
}

async fn delete_blood_pressure(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if records::delete_blood_pressure(&state.db, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

async fn overdue_appointments(
    State(state): State<AppState>,
    Path(facility_id): Path<Uuid>,
    Query(params): Query<OverdueParams>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let today = params.today.unwrap_or_else(|| Utc::now().date_naive());
    let appointments = records::overdue_appointments(&state.db, facility_id, today).await?;
    Ok(Json(appointments))
}
