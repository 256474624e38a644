use axum::{
    Json, Router,
    extract::State,
    routing::get,
};
use chrono::Local;
use serde::Serialize;

use crate::{
    analytics::{AppointmentStats, BackupSnapshot, compute_stats},
    error::ApiError,
    lifecycle::{AppointmentAction, available_actions},
    middleware::auth_context::AuthContext,
    models::*,
    workflow::BookingRequest,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(book_appointment))
        .route("/appointments/stats", get(appointment_stats))
        .route("/appointments/export", get(export_backup))
}

/// An appointment plus the buttons its card should offer this actor.
#[derive(Debug, Serialize)]
pub struct AppointmentCard {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub actions: Vec<AppointmentAction>,
}

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<AppointmentCard>>>, ApiError> {
    let appointments = state
        .workflow
        .refresh(auth.session_token_id, &auth.actor)
        .await?;

    let cards = appointments
        .into_iter()
        .map(|appointment| AppointmentCard {
            actions: available_actions(&auth.actor, &appointment),
            appointment,
        })
        .collect();
    Ok(Json(ApiOk { data: cards }))
}

pub async fn book_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<BookingRequest>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    if auth.actor.role != Role::Patient {
        return Err(ApiError::forbidden("Only patients and guests book appointments"));
    }
    let created = state
        .workflow
        .book(auth.session_token_id, &auth.actor, req)
        .await?;
    Ok(Json(ApiOk { data: created }))
}

pub async fn appointment_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<AppointmentStats>>, ApiError> {
    auth.require_staff()?;
    let appointments = state
        .workflow
        .refresh(auth.session_token_id, &auth.actor)
        .await?;
    Ok(Json(ApiOk {
        data: compute_stats(&appointments, Local::now().date_naive()),
    }))
}

pub async fn export_backup(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<BackupSnapshot>>, ApiError> {
    auth.require_admin()?;
    let clinic = state.backend.clinic_info().await?;
    let doctors = state.backend.list_doctors().await?;
    let appointments = state.backend.list_appointments().await?;
    tracing::info!(appointments = appointments.len(), "backup exported");
    Ok(Json(ApiOk {
        data: BackupSnapshot::new(clinic, doctors, appointments, Local::now().date_naive()),
    }))
}
