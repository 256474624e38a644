use std::collections::HashSet;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use headers::{Authorization, authorization::Bearer};
use tracing::debug;
use uuid::Uuid;

use crate::auth::hash_access_token;
use crate::error::ApiError;
use crate::models::{Actor, AppState, SessionRow};

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub session_token_id: Uuid,
    pub actor: Actor,
}

impl AuthContext {
    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.actor.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Staff only"))
        }
    }

    /// Staff, or a patient signed in with a real account.
    pub fn require_account(&self) -> Result<(), ApiError> {
        if self.actor.is_guest {
            Err(ApiError::forbidden("Sign in to manage every reminder"))
        } else {
            Ok(())
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.actor.role == crate::models::Role::Admin {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin only"))
        }
    }
}

/// Resolve a bearer token to a live session. Revoked, expired or unknown
/// tokens are all `SESSION_EXPIRED`; a dead session also loses its board and
/// its open dialogs.
pub async fn resolve_session(state: &AppState, token: &str) -> Result<AuthContext, ApiError> {
    let token_hash = hash_access_token(token);

    let row: SessionRow = sqlx::query_as::<_, SessionRow>(
        r#"
        SELECT session_token_id, user_id, role, display_name, email, phone, is_guest,
               expires_at, revoked_at
        FROM session_token
        WHERE session_token_hash = ?
        "#,
    )
    .bind(&token_hash)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(ApiError::session_expired)?;

    let session_token_id = Uuid::parse_str(&row.session_token_id)
        .map_err(|e| ApiError::Internal(format!("corrupt session id: {e}")))?;
    let now = Utc::now();
    if row.revoked_at.is_some() || !is_unexpired(&row.expires_at, now)? {
        evict_session(state, session_token_id).await;
        return Err(ApiError::session_expired());
    }

    let actor = row.actor().map_err(ApiError::Internal)?;

    // Touch last_seen_at (best-effort)
    let _ = sqlx::query("UPDATE session_token SET last_seen_at = ? WHERE session_token_id = ?")
        .bind(now.to_rfc3339())
        .bind(&row.session_token_id)
        .execute(&state.db)
        .await;

    Ok(AuthContext {
        session_token_id,
        actor,
    })
}

fn is_unexpired(expires_at: &str, now: DateTime<Utc>) -> Result<bool, ApiError> {
    let expires_at = DateTime::parse_from_rfc3339(expires_at)
        .map_err(|e| ApiError::Internal(format!("corrupt session expiry: {e}")))?;
    Ok(expires_at > now)
}

/// Forget the in-memory state held for one session.
pub async fn evict_session(state: &AppState, session_token_id: Uuid) {
    state.workflow.forget(session_token_id).await;
    state.gate.close_all(session_token_id).await;
}

/// Trim boards and dialogs down to sessions that are neither revoked nor expired.
pub async fn sweep_dead_sessions(state: &AppState) -> Result<(), ApiError> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT session_token_id, expires_at
        FROM session_token
        WHERE revoked_at IS NULL
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let now = Utc::now();
    let mut live = HashSet::new();
    for (id, expires_at) in rows {
        if !is_unexpired(&expires_at, now)? {
            continue;
        }
        if let Ok(id) = Uuid::parse_str(&id) {
            live.insert(id);
        }
    }

    state.workflow.retain_sessions(&live).await;
    state.gate.retain_owners(&live).await;
    debug!(live = live.len(), "swept in-memory session state");
    Ok(())
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::session_expired())?;

            resolve_session(state, authz.token()).await
        }
    }
}
