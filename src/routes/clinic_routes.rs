// src/routes/clinic_routes.rs

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, ClinicInfo, Doctor, Offer},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctors", get(list_doctors))
        .route("/offers", get(list_offers))
        .route("/clinic-info", get(get_clinic_info))
}

// Read-only catalogue; offer changes go through /confirmations.

pub async fn list_doctors(
    State(state): State<AppState>,
    _auth: AuthContext, // guests hold a session too
) -> Result<Json<ApiOk<Vec<Doctor>>>, ApiError> {
    let doctors = state.backend.list_doctors().await?;
    Ok(Json(ApiOk { data: doctors }))
}

pub async fn list_offers(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<Vec<Offer>>>, ApiError> {
    let offers = state.backend.list_offers().await?;
    Ok(Json(ApiOk { data: offers }))
}

pub async fn get_clinic_info(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<ClinicInfo>>, ApiError> {
    let info = state.backend.clinic_info().await?;
    Ok(Json(ApiOk { data: info }))
}
