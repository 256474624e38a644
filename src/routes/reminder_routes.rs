use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Serialize;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::*,
    notifier::{NotificationHandle, ScheduledNotification},
    reminders::{ReminderEntry, ReminderRequest},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/reminders",
            get(list_reminders)
                .post(schedule_reminder)
                .delete(cancel_all_reminders),
        )
        .route(
            "/reminders/{appointment_id}",
            get(get_reminder).delete(cancel_reminder),
        )
        .route("/notifications", get(list_notifications))
}

#[derive(Debug, Serialize)]
pub struct ScheduledReminderData {
    pub appointment_id: String,
    /// `None` when the reminder moment had already passed.
    pub handle: Option<NotificationHandle>,
}

pub async fn list_reminders(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<Vec<ReminderEntry>>>, ApiError> {
    let entries = state.reminders.entries().await?;
    Ok(Json(ApiOk { data: entries }))
}

pub async fn schedule_reminder(
    State(state): State<AppState>,
    _auth: AuthContext,
    Json(req): Json<ReminderRequest>,
) -> Result<Json<ApiOk<ScheduledReminderData>>, ApiError> {
    if req.appointment_id.trim().is_empty() {
        return Err(ApiError::validation("appointment_id is required"));
    }
    let handle = state.reminders.schedule(&req).await?;
    Ok(Json(ApiOk {
        data: ScheduledReminderData {
            appointment_id: req.appointment_id,
            handle,
        },
    }))
}

pub async fn get_reminder(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(appointment_id): Path<String>,
) -> Result<Json<ApiOk<ReminderEntry>>, ApiError> {
    let handle = state
        .reminders
        .handle_for(&appointment_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound("NOT_FOUND", format!("no reminder for appointment {appointment_id}"))
        })?;
    Ok(Json(ApiOk {
        data: ReminderEntry {
            appointment_id,
            handle,
        },
    }))
}

/// Unknown ids succeed; there is nothing left to disarm.
pub async fn cancel_reminder(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(appointment_id): Path<String>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    state.reminders.cancel(&appointment_id).await?;
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}

pub async fn cancel_all_reminders(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    auth.require_account()?;
    state.reminders.cancel_all().await?;
    tracing::info!(user_id = %auth.actor.user_id, "all reminders cancelled");
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<Vec<ScheduledNotification>>>, ApiError> {
    let queued = state.notifier.list().await?;
    Ok(Json(ApiOk { data: queued }))
}
