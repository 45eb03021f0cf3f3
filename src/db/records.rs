use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::repository::SyncRepository;
use crate::error::AppError;
use crate::models::{
    Appointment, AppointmentStatus, BloodPressureMeasurement, BloodSugarMeasurement, CancelReason,
    FollowUpSchedule, MedicalHistory, MedicalHistoryEntry, NewAppointment, NewBloodPressure,
    NewBloodSugar, NewFollowUp, NewPatient, Patient, PatientStatus, SyncStatus, SyncableRecord,
};

async fn ensure_patient(db: &SqlitePool, patient_id: Uuid) -> Result<(), AppError> {
    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM patients WHERE id = ?1 AND deleted_at IS NULL",
    )
    .bind(patient_id)
    .fetch_one(db)
    .await?;

    if exists == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub async fn register_patient(db: &SqlitePool, req: NewPatient) -> Result<Patient, AppError> {
    req.validate().map_err(AppError::BadRequest)?;

    let now = Utc::now();
    let patient = Patient {
        id: Uuid::new_v4(),
        full_name: req.full_name.trim().to_string(),
        gender: req.gender,
        date_of_birth: req.date_of_birth,
        age: req.age,
        age_updated_at: req.age.map(|_| now),
        status: PatientStatus::Active,
        address_id: Uuid::new_v4(),
        street_address: req.street_address,
        village_or_colony: req.village_or_colony,
        district: req.district,
        state: req.state,
        country: req.country,
        address_created_at: now,
        address_updated_at: now,
        address_deleted_at: None,
        registered_facility_id: Some(req.registered_facility_id),
        assigned_facility_id: Some(req.registered_facility_id),
        recorded_at: now,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        sync_status: SyncStatus::Pending,
    };

    SyncRepository::<Patient>::new(db.clone())
        .save(std::slice::from_ref(&patient))
        .await?;
    Ok(patient)
}

pub async fn record_blood_pressure(
    db: &SqlitePool,
    patient_id: Uuid,
    req: NewBloodPressure,
) -> Result<BloodPressureMeasurement, AppError> {
    req.validate().map_err(AppError::BadRequest)?;
    ensure_patient(db, patient_id).await?;

    let now = Utc::now();
    let measurement = BloodPressureMeasurement {
        id: Uuid::new_v4(),
        patient_id,
        facility_id: req.facility_id,
        user_id: req.user_id,
        systolic: req.systolic,
        diastolic: req.diastolic,
        recorded_at: req.recorded_at.unwrap_or(now),
        created_at: now,
        updated_at: now,
        deleted_at: None,
        sync_status: SyncStatus::Pending,
    };

    SyncRepository::<BloodPressureMeasurement>::new(db.clone())
        .save(std::slice::from_ref(&measurement))
        .await?;
    Ok(measurement)
}

pub async fn record_blood_sugar(
    db: &SqlitePool,
    patient_id: Uuid,
    req: NewBloodSugar,
) -> Result<BloodSugarMeasurement, AppError> {
    req.validate().map_err(AppError::BadRequest)?;
    ensure_patient(db, patient_id).await?;

    let now = Utc::now();
    let measurement = BloodSugarMeasurement {
        id: Uuid::new_v4(),
        patient_id,
        facility_id: req.facility_id,
        user_id: req.user_id,
        blood_sugar_type: req.blood_sugar_type,
        blood_sugar_value: req.blood_sugar_value,
        recorded_at: req.recorded_at.unwrap_or(now),
        created_at: now,
        updated_at: now,
        deleted_at: None,
        sync_status: SyncStatus::Pending,
    };

    SyncRepository::<BloodSugarMeasurement>::new(db.clone())
        .save(std::slice::from_ref(&measurement))
        .await?;
    Ok(measurement)
}

/// A patient has a single medical history; answering again updates it.
pub async fn save_medical_history(
    db: &SqlitePool,
    patient_id: Uuid,
    entry: MedicalHistoryEntry,
) -> Result<MedicalHistory, AppError> {
    ensure_patient(db, patient_id).await?;

    let existing = sqlx::query_as::<_, MedicalHistory>(
        r#"
        SELECT * FROM medical_histories
        WHERE patient_id = ?1 AND deleted_at IS NULL
        ORDER BY updated_at DESC
        LIMIT 1
        "#,
    )
    .bind(patient_id)
    .fetch_optional(db)
    .await?;

    let now = Utc::now();
    let history = match existing {
        Some(history) => MedicalHistory {
            diagnosed_with_hypertension: entry.diagnosed_with_hypertension,
            is_on_treatment_for_hypertension: entry.is_on_treatment_for_hypertension,
            has_had_heart_attack: entry.has_had_heart_attack,
            has_had_stroke: entry.has_had_stroke,
            has_had_kidney_disease: entry.has_had_kidney_disease,
            has_diabetes: entry.has_diabetes,
            updated_at: now,
            sync_status: SyncStatus::Pending,
            ..history
        },
        None => MedicalHistory {
            id: Uuid::new_v4(),
            patient_id,
            diagnosed_with_hypertension: entry.diagnosed_with_hypertension,
            is_on_treatment_for_hypertension: entry.is_on_treatment_for_hypertension,
            has_had_heart_attack: entry.has_had_heart_attack,
            has_had_stroke: entry.has_had_stroke,
            has_had_kidney_disease: entry.has_had_kidney_disease,
            has_diabetes: entry.has_diabetes,
            recorded_at: now,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            sync_status: SyncStatus::Pending,
        },
    };

    SyncRepository::<MedicalHistory>::new(db.clone())
        .save(std::slice::from_ref(&history))
        .await?;
    Ok(history)
}

/// Book the next visit. Appointments still open for the patient are
/// closed as visited in the same transaction.
pub async fn schedule_appointment(
    db: &SqlitePool,
    patient_id: Uuid,
    req: NewAppointment,
) -> Result<Appointment, AppError> {
    ensure_patient(db, patient_id).await?;

    let now = Utc::now();
    let appointment = Appointment {
        id: Uuid::new_v4(),
        patient_id,
        facility_id: req.facility_id,
        creation_facility_id: Some(req.facility_id),
        scheduled_date: req.scheduled_date,
        status: AppointmentStatus::Scheduled,
        cancel_reason: None,
        remind_on: None,
        agreed_to_visit: None,
        appointment_type: req.appointment_type,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        sync_status: SyncStatus::Pending,
    };

    let mut tx = db.begin().await?;
    sqlx::query(
        r#"
        UPDATE appointments
        SET status = ?1, updated_at = ?2, sync_status = ?3
        WHERE patient_id = ?4 AND status = ?5 AND deleted_at IS NULL
        "#,
    )
    .bind(AppointmentStatus::Visited)
    .bind(now)
    .bind(SyncStatus::Pending)
    .bind(patient_id)
    .bind(AppointmentStatus::Scheduled)
    .execute(&mut *tx)
    .await?;
    appointment.upsert(&mut tx).await?;
    tx.commit().await?;

    Ok(appointment)
}

pub async fn cancel_appointment(
    db: &SqlitePool,
    id: Uuid,
    reason: CancelReason,
) -> Result<Option<Appointment>, AppError> {
    let repo = SyncRepository::<Appointment>::new(db.clone());
    let Some(appointment) = repo.get_one(id).await? else {
        return Ok(None);
    };

    let cancelled = Appointment {
        status: AppointmentStatus::Cancelled,
        cancel_reason: Some(reason),
        updated_at: Utc::now(),
        sync_status: SyncStatus::Pending,
        ..appointment
    };
    repo.save(std::slice::from_ref(&cancelled)).await?;

    Ok(Some(cancelled))
}

pub async fn schedule_follow_up(
    db: &SqlitePool,
    patient_id: Uuid,
    req: NewFollowUp,
) -> Result<FollowUpSchedule, AppError> {
    ensure_patient(db, patient_id).await?;

    let now = Utc::now();
    let follow_up = FollowUpSchedule {
        id: Uuid::new_v4(),
        patient_id,
        facility_id: req.facility_id,
        user_id: req.user_id,
        next_visit: req.next_visit,
        reason: req.reason,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        sync_status: SyncStatus::Pending,
    };

    SyncRepository::<FollowUpSchedule>::new(db.clone())
        .save(std::slice::from_ref(&follow_up))
        .await?;
    Ok(follow_up)
}

/// Soft delete; the deletion is pushed like any other edit.
pub async fn delete_blood_pressure(db: &SqlitePool, id: Uuid) -> Result<bool, AppError> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE blood_pressures
        SET deleted_at = ?1, updated_at = ?1, sync_status = ?2
        WHERE id = ?3 AND deleted_at IS NULL
        "#,
    )
    .bind(now)
    .bind(SyncStatus::Pending)
    .bind(id)
    .execute(db)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn overdue_appointments(
    db: &SqlitePool,
    facility_id: Uuid,
    today: NaiveDate,
) -> Result<Vec<Appointment>, AppError> {
    let appointments = sqlx::query_as::<_, Appointment>(
        r#"
        SELECT * FROM appointments
        WHERE facility_id = ?1
          AND status = ?2
          AND deleted_at IS NULL
          AND scheduled_date < ?3
        ORDER BY scheduled_date ASC
        "#,
    )
    .bind(facility_id)
    .bind(AppointmentStatus::Scheduled)
    .bind(today)
    .fetch_all(db)
    .await?;

    Ok(appointments)
}
