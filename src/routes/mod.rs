use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod clinic_routes;
pub mod confirmation_routes;
pub mod reminder_routes;
pub mod session_routes;
pub mod settings_routes;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/session", session_routes::router())
        .merge(appointment_routes::router())
        .merge(confirmation_routes::router())
        .merge(reminder_routes::router())
        .merge(clinic_routes::router())
        .merge(settings_routes::router());

    Router::new().nest("/api/v1", api).with_state(state)
}
