use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::*,
};

pub const LANGUAGE_KEY: &str = "@app:language";
pub const PUSH_TOKEN_KEY: &str = "pushToken";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/settings/language", get(get_language).put(set_language))
        .route("/push-token", post(register_push_token))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ar,
}

impl Language {
    fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ar => "ar",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "en" => Some(Language::En),
            "ar" => Some(Language::Ar),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguageData {
    pub language: Language,
}

#[derive(Debug, Deserialize)]
pub struct PushTokenRequest {
    pub token: String,
}

pub async fn get_language(
    State(state): State<AppState>,
) -> Result<Json<ApiOk<LanguageData>>, ApiError> {
    let stored = state.kv.get_item(LANGUAGE_KEY).await?;
    let language = match stored.as_deref() {
        None => Language::default(),
        Some(raw) => Language::parse(raw).unwrap_or_else(|| {
            warn!(raw, "unknown stored language, falling back to en");
            Language::default()
        }),
    };
    Ok(Json(ApiOk {
        data: LanguageData { language },
    }))
}

pub async fn set_language(
    State(state): State<AppState>,
    Json(req): Json<LanguageData>,
) -> Result<Json<ApiOk<LanguageData>>, ApiError> {
    state.kv.set_item(LANGUAGE_KEY, req.language.as_str()).await?;
    Ok(Json(ApiOk { data: req }))
}

/// Keep the device token locally and register it with the clinic backend.
pub async fn register_push_token(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<PushTokenRequest>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let token = req.token.trim();
    if token.is_empty() {
        return Err(ApiError::validation("token is required"));
    }

    state.kv.set_item(PUSH_TOKEN_KEY, token).await?;
    state
        .backend
        .register_push_token(&PushTokenRegistration {
            token: token.to_string(),
            user_id: auth.actor.user_id.clone(),
            user_role: auth.actor.role,
            platform: state.device_platform.clone(),
        })
        .await?;

    info!(user_id = %auth.actor.user_id, platform = %state.device_platform, "push token registered");
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}
