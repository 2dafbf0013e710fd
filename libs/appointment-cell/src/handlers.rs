// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_queue_control;

use crate::models::{
    AppointmentError, BookAppointmentRequest, RegisterPersonRequest,
    RescheduleAppointmentRequest,
};
use crate::state::AppState;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

impl DateQuery {
    fn date_or_today(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Utc::now().date_naive())
    }
}

// ==============================================================================
// APPOINTMENT LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    // Patients book for themselves; clinic roles may book on behalf of anyone.
    let is_self = request.patient_id.to_string() == user.id;
    if !is_self && !user.can_manage_queue() {
        return Err(AppError::Auth(
            "Not authorized to book appointment for this patient".to_string(),
        ));
    }

    let appointment = state.lifecycle.book(request).await.map_err(to_app_error)?;
    let token_number = appointment.token_number;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "token_number": token_number,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle.get(appointment_id).await.map_err(to_app_error)?;

    let is_patient = appointment.patient_id.to_string() == user.id;
    let is_doctor = appointment.doctor_id.to_string() == user.id;
    if !is_patient && !is_doctor && !user.is_admin() && !user.is_staff() {
        return Err(AppError::Auth(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_appointment_party(&state, appointment_id, &user).await?;

    let appointment = state
        .lifecycle
        .reschedule(appointment_id, request)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled successfully"
    })))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    ensure_clinic_actor(&state, appointment_id, &user).await?;

    let appointment = state
        .lifecycle
        .confirm(appointment_id)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment confirmed"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    ensure_appointment_party(&state, appointment_id, &user).await?;

    let appointment = state
        .lifecycle
        .cancel(appointment_id)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "status": appointment.status,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    ensure_clinic_actor(&state, appointment_id, &user).await?;

    let appointment = state
        .lifecycle
        .complete(appointment_id)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "status": appointment.status,
        "message": "Appointment completed"
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && !user.is_staff() {
        return Err(AppError::Auth(
            "Only staff or admin may delete appointments".to_string(),
        ));
    }

    state
        .lifecycle
        .delete(appointment_id)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment deleted"
    })))
}

// ==============================================================================
// LISTING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let is_self = patient_id.to_string() == user.id;
    if !is_self && !user.can_manage_queue() {
        return Err(AppError::Auth(
            "Not authorized to view this patient's appointments".to_string(),
        ));
    }

    let appointments = state
        .lifecycle
        .patient_appointments(patient_id)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<AppState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    ensure_queue_actor(&user, &doctor_id)?;

    let appointments = state
        .lifecycle
        .doctor_day(doctor_id, query.date_or_today())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

// ==============================================================================
// QUEUE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_queue_snapshot(
    State(state): State<AppState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let snapshot = state
        .lifecycle
        .queue_snapshot(doctor_id, query.date_or_today())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!(snapshot)))
}

#[axum::debug_handler]
pub async fn advance_queue(
    State(state): State<AppState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    ensure_queue_actor(&user, &doctor_id)?;

    let current_token = state
        .lifecycle
        .advance_queue(doctor_id, query.date_or_today())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "current_token": current_token
    })))
}

#[axum::debug_handler]
pub async fn reset_queue(
    State(state): State<AppState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    ensure_queue_actor(&user, &doctor_id)?;

    let current_token = state
        .lifecycle
        .reset_queue(doctor_id, query.date_or_today())
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({
        "success": true,
        "current_token": current_token
    })))
}

// ==============================================================================
// DIRECTORY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn register_doctor(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(request): Json<RegisterPersonRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && !user.is_staff() {
        return Err(AppError::Auth(
            "Only staff or admin may register doctors".to_string(),
        ));
    }

    let id = state
        .lifecycle
        .register_doctor(request.name)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({ "success": true, "doctor_id": id })))
}

#[axum::debug_handler]
pub async fn register_patient(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(request): Json<RegisterPersonRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && !user.is_staff() {
        return Err(AppError::Auth(
            "Only staff or admin may register patients".to_string(),
        ));
    }

    let id = state
        .lifecycle
        .register_patient(request.name)
        .await
        .map_err(to_app_error)?;

    Ok(Json(json!({ "success": true, "patient_id": id })))
}

// ==============================================================================
// PRIVATE HELPERS
// ==============================================================================

/// Patient on the appointment, the treating doctor, or staff/admin.
async fn ensure_appointment_party(
    state: &AppState,
    appointment_id: Uuid,
    user: &User,
) -> Result<(), AppError> {
    let appointment = state.lifecycle.get(appointment_id).await.map_err(to_app_error)?;

    let is_patient = appointment.patient_id.to_string() == user.id;
    let is_doctor = appointment.doctor_id.to_string() == user.id;
    if !is_patient && !is_doctor && !user.is_admin() && !user.is_staff() {
        return Err(AppError::Auth(
            "Not authorized to modify this appointment".to_string(),
        ));
    }
    Ok(())
}

/// The treating doctor or staff/admin; patients cannot drive clinical
/// transitions (confirm/complete).
async fn ensure_clinic_actor(
    state: &AppState,
    appointment_id: Uuid,
    user: &User,
) -> Result<(), AppError> {
    let appointment = state.lifecycle.get(appointment_id).await.map_err(to_app_error)?;

    let is_doctor = appointment.doctor_id.to_string() == user.id;
    if !is_doctor && !user.is_admin() && !user.is_staff() {
        return Err(AppError::Auth(
            "Only the treating doctor or staff may perform this action".to_string(),
        ));
    }
    Ok(())
}

/// Queue mutation: doctor/staff/admin, and a doctor only on their own queue.
fn ensure_queue_actor(user: &User, doctor_id: &Uuid) -> Result<(), AppError> {
    require_queue_control(user)?;
    if user.is_doctor() && doctor_id.to_string() != user.id {
        return Err(AppError::Auth(
            "Doctors may only manage their own queue".to_string(),
        ));
    }
    Ok(())
}

fn to_app_error(err: AppointmentError) -> AppError {
    match err {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        AppointmentError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
        AppointmentError::InvalidTime(msg) => AppError::BadRequest(msg),
        AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
        AppointmentError::InvalidTransition(status) => {
            AppError::Conflict(format!("Cannot transition from current status: {}", status))
        }
        AppointmentError::AtEndOfQueue { max_token } => AppError::Conflict(format!(
            "Queue is already at the last issued token ({})",
            max_token
        )),
        AppointmentError::NotCancelled(status) => AppError::PreconditionFailed(format!(
            "Only cancelled appointments can be deleted (current status: {})",
            status
        )),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}
