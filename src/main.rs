mod auth;
mod config;
mod middleware;

mod analytics;
mod backend;
mod db;
mod error;
mod gate;
mod kv_store;
mod lifecycle;
mod models;
mod notifier;
mod reminders;
mod routes;
mod workflow;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use crate::{
    backend::HttpClinicBackend,
    config::Config,
    gate::ConfirmationGate,
    kv_store::KeyValueStore,
    models::AppState,
    notifier::SqliteNotifier,
    reminders::ReminderScheduler,
    workflow::AppointmentWorkflow,
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_sqlite(&cfg.database_url).await?;

    let notifier = Arc::new(SqliteNotifier::new(pool.clone(), cfg.notifications_enabled));
    notifier::spawn_dispatcher(
        notifier.clone(),
        Duration::from_secs(cfg.notification_poll_secs),
    );

    let backend = Arc::new(HttpClinicBackend::new(&cfg.backend_url)?);
    let kv = KeyValueStore::new(pool.clone());
    let reminders = ReminderScheduler::new(kv.clone(), notifier.clone(), cfg.reminder_hour);
    let workflow = Arc::new(AppointmentWorkflow::new(backend.clone(), reminders.clone()));

    let state = AppState {
        db: pool,
        session_ttl_hours: cfg.session_ttl_hours,
        device_platform: cfg.device_platform.clone(),
        backend,
        kv,
        notifier,
        reminders,
        workflow,
        gate: Arc::new(ConfirmationGate::new()),
    };

    // The UI shell runs in a WebView and calls the gateway cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!(
        backend = %cfg.backend_url,
        reminder_hour = cfg.reminder_hour,
        "Listening on http://{}",
        cfg.bind_addr
    );
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
