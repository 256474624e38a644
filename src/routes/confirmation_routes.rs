use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    gate::{ActionDescriptor, DialogView},
    lifecycle::AppointmentAction,
    middleware::auth_context::AuthContext,
    models::*,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/confirmations", post(open_confirmation))
        .route("/confirmations/{dialog_id}", get(get_confirmation))
        .route("/confirmations/{dialog_id}/confirm", post(confirm))
        .route("/confirmations/{dialog_id}/dismiss", post(dismiss))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmationRequest {
    Transition {
        appointment_id: String,
        target: AppointmentStatus,
    },
    CreateOffer {
        offer: NewOffer,
    },
    DeleteOffer {
        offer_id: String,
    },
}

#[derive(Debug, Serialize)]
pub struct ConfirmedData {
    pub dialog_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<Offer>,
}

fn describe(action: AppointmentAction) -> ActionDescriptor {
    match action {
        AppointmentAction::Confirm => ActionDescriptor::new(
            "Confirm Appointment",
            "Do you want to confirm this appointment?",
            "Confirm",
            false,
        ),
        AppointmentAction::Cancel => ActionDescriptor::new(
            "Cancel Appointment",
            "Are you sure you want to cancel this appointment?",
            "Cancel Appointment",
            true,
        ),
        AppointmentAction::Complete => ActionDescriptor::new(
            "Complete Appointment",
            "Do you want to mark this appointment as completed?",
            "Complete",
            false,
        ),
        AppointmentAction::Withdraw => ActionDescriptor::new(
            "Delete Appointment",
            "Are you sure you want to permanently delete this appointment?",
            "Delete",
            true,
        ),
    }
}

/// Validate the request now and park it; nothing reaches the backend until confirm.
pub async fn open_confirmation(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ConfirmationRequest>,
) -> Result<Json<ApiOk<DialogView>>, ApiError> {
    let (descriptor, action) = match req {
        ConfirmationRequest::Transition {
            appointment_id,
            target,
        } => {
            let action = state
                .workflow
                .preview_transition(auth.session_token_id, &auth.actor, &appointment_id, target)
                .await?;
            (
                describe(action),
                PendingAction::Transition {
                    appointment_id,
                    target,
                },
            )
        }
        ConfirmationRequest::CreateOffer { offer } => {
            auth.require_admin()?;
            if offer.title.trim().is_empty() {
                return Err(ApiError::validation("offer title is required"));
            }
            (
                ActionDescriptor::new(
                    "Add Offer",
                    &format!("Publish the offer \"{}\"?", offer.title.trim()),
                    "Add",
                    false,
                ),
                PendingAction::CreateOffer(offer),
            )
        }
        ConfirmationRequest::DeleteOffer { offer_id } => {
            auth.require_admin()?;
            (
                ActionDescriptor::new(
                    "Delete Offer",
                    "Are you sure you want to delete this offer?",
                    "Delete",
                    true,
                ),
                PendingAction::DeleteOffer { offer_id },
            )
        }
    };

    let view = state.gate.open(auth.session_token_id, descriptor, action).await;
    Ok(Json(ApiOk { data: view }))
}

pub async fn get_confirmation(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(dialog_id): Path<Uuid>,
) -> Result<Json<ApiOk<DialogView>>, ApiError> {
    let view = state.gate.view(auth.session_token_id, dialog_id).await?;
    Ok(Json(ApiOk { data: view }))
}

async fn run_action(
    state: &AppState,
    auth: &AuthContext,
    action: PendingAction,
) -> Result<Option<Offer>, ApiError> {
    match action {
        PendingAction::Transition {
            appointment_id,
            target,
        } => {
            state
                .workflow
                .request_transition(auth.session_token_id, &auth.actor, &appointment_id, target)
                .await?;
            Ok(None)
        }
        PendingAction::CreateOffer(offer) => Ok(Some(state.backend.create_offer(&offer).await?)),
        PendingAction::DeleteOffer { offer_id } => {
            state.backend.delete_offer(&offer_id).await?;
            Ok(None)
        }
    }
}

pub async fn confirm(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(dialog_id): Path<Uuid>,
) -> Result<Json<ApiOk<ConfirmedData>>, ApiError> {
    let offer = state
        .gate
        .confirm_then_run(auth.session_token_id, dialog_id, |action| {
            run_action(&state, &auth, action)
        })
        .await?;
    Ok(Json(ApiOk {
        data: ConfirmedData { dialog_id, offer },
    }))
}

pub async fn dismiss(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(dialog_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    state.gate.dismiss(auth.session_token_id, dialog_id).await?;
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}
