use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::warn;

use crate::backend::BackendError;
use crate::gate::GateError;
use crate::kv_store::StoreError;
use crate::lifecycle::LifecycleError;
use crate::notifier::NotifierError;
use crate::reminders::ReminderError;
use crate::workflow::WorkflowError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Upstream(String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("INVALID_CREDENTIALS", "Email or password is incorrect".into())
    }

    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden("FORBIDDEN", msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::BadRequest("VALIDATION_ERROR", msg.into())
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Forbidden(code, msg) => {
                (StatusCode::FORBIDDEN, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Upstream(msg) => (
                StatusCode::BAD_GATEWAY,
                ApiError::to_error_response("BACKEND_ERROR", &msg),
            )
                .into_response(),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::to_error_response("INTERNAL", &msg),
            )
                .into_response(),
        }
    }
}

/* -------------------------
   Domain error mapping
--------------------------*/

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::InvalidTransition { .. } => {
                ApiError::Conflict("INVALID_TRANSITION", e.to_string())
            }
            LifecycleError::NotPermitted { .. } => ApiError::forbidden(e.to_string()),
        }
    }
}

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::NotFound(_) => ApiError::NotFound("NOT_FOUND", e.to_string()),
            GateError::Busy(_) => ApiError::Conflict("DIALOG_BUSY", e.to_string()),
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        warn!("clinic backend call failed: {e}");
        match &e {
            BackendError::Rejected { status: 404, detail } => {
                ApiError::NotFound("NOT_FOUND", detail.clone())
            }
            BackendError::Rejected { status: 401, .. } => ApiError::invalid_credentials(),
            BackendError::Rejected {
                status: 400 | 422,
                detail,
            } => ApiError::validation(detail.clone()),
            _ => ApiError::Upstream(e.to_string()),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::Lifecycle(e) => e.into(),
            WorkflowError::Backend(e) => e.into(),
            WorkflowError::NotFound(_) => ApiError::NotFound("NOT_FOUND", e.to_string()),
            WorkflowError::Validation(msg) => ApiError::validation(msg),
        }
    }
}

impl From<ReminderError> for ApiError {
    fn from(e: ReminderError) -> Self {
        match e {
            ReminderError::PermissionDenied => ApiError::forbidden(e.to_string()),
            other => ApiError::Internal(format!("reminder error: {other}")),
        }
    }
}

impl From<NotifierError> for ApiError {
    fn from(e: NotifierError) -> Self {
        match e {
            NotifierError::PermissionDenied => ApiError::forbidden(e.to_string()),
            other => ApiError::Internal(format!("notification error: {other}")),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(format!("storage error: {e}"))
    }
}
