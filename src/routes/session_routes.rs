use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{generate_access_token, hash_access_token},
    error::ApiError,
    middleware::auth_context::{AuthContext, evict_session, sweep_dead_sessions},
    models::*,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/guest", post(guest))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

/// Persist a new local session for `actor` and hand back its bearer token.
pub async fn open_session(
    state: &AppState,
    actor: Actor,
    device_name: Option<&str>,
) -> Result<SessionResponseData, ApiError> {
    let access_token = generate_access_token();
    let token_hash = hash_access_token(&access_token);
    let now = Utc::now();
    let expires_at = now + Duration::hours(state.session_ttl_hours);
    let session_token_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO session_token
            (session_token_id, session_token_hash, user_id, role, display_name,
             email, phone, is_guest, device_name, created_at, expires_at)
        VALUES
            (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session_token_id.to_string())
    .bind(&token_hash)
    .bind(&actor.user_id)
    .bind(actor.role.as_str())
    .bind(&actor.name)
    .bind(&actor.email)
    .bind(actor.phone.as_deref())
    .bind(actor.is_guest)
    .bind(device_name)
    .bind(now.to_rfc3339())
    .bind(expires_at.to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    info!(%session_token_id, role = %actor.role, guest = actor.is_guest, "session opened");

    if let Err(e) = sweep_dead_sessions(state).await {
        warn!("session sweep failed: {e:?}");
    }

    Ok(SessionResponseData {
        access_token,
        expires_at,
        user: actor,
    })
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiOk<SessionResponseData>>, ApiError> {
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("email and password are required"));
    }

    let user = state.backend.login(&email, &req.password).await?;
    let data = open_session(&state, Actor::from(user), req.device_name.as_deref()).await?;
    Ok(Json(ApiOk { data }))
}

pub async fn register(
    State(state): State<AppState>,
    Json(mut req): Json<RegisterRequest>,
) -> Result<Json<ApiOk<SessionResponseData>>, ApiError> {
    req.name = req.name.trim().to_string();
    req.email = normalize_email(&req.email);
    if req.name.is_empty() || req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("name, email and password are required"));
    }

    let user = state.backend.register(&req).await?;
    let data = open_session(&state, Actor::from(user), None).await?;
    Ok(Json(ApiOk { data }))
}

/// Book without an account. Guests are patients filed under the shared guest id.
pub async fn guest(
    State(state): State<AppState>,
    Json(req): Json<GuestRequest>,
) -> Result<Json<ApiOk<SessionResponseData>>, ApiError> {
    if req.name.trim().is_empty() || req.email.trim().is_empty() || req.phone.trim().is_empty() {
        return Err(ApiError::validation("name, email and phone are required"));
    }
    if !req.email.contains('@') {
        return Err(ApiError::validation("email is not valid"));
    }

    let actor = Actor::guest(&req.name, &req.email, &req.phone);
    let data = open_session(&state, actor, req.device_name.as_deref()).await?;
    Ok(Json(ApiOk { data }))
}

pub async fn me(auth: AuthContext) -> Result<Json<ApiOk<MeResponseData>>, ApiError> {
    Ok(Json(ApiOk {
        data: MeResponseData {
            user: auth.actor,
            session_token_id: auth.session_token_id,
        },
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = ?
        WHERE session_token_id = ?
          AND revoked_at IS NULL
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .bind(auth.session_token_id.to_string())
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    evict_session(&state, auth.session_token_id).await;

    info!(session_token_id = %auth.session_token_id, "session closed");
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}
