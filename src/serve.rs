use crate::clock::Clock;
use crate::config::ServeConfig;
use crate::notify::{report_delivery_failure, Notifier};
use crate::watchdog::{Watchdog, WatchdogStatus};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub watchdog: Arc<Watchdog>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub job_name: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/reset_timer", post(reset_timer))
        .route("/status", get(status))
        .route("/notification_fail", post(notification_fail))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn run(config: &ServeConfig, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("serve listening on {local_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true}))
}

async fn reset_timer(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.watchdog.reset().await;
    Json(serde_json::json!({"message": "timer reset"}))
}

async fn status(State(state): State<AppState>) -> Json<WatchdogStatus> {
    Json(state.watchdog.status().await)
}

/// Always 200; the gateway outcome is reported in `delivered`.
async fn notification_fail(State(state): State<AppState>) -> Json<serde_json::Value> {
    let delivered =
        report_delivery_failure(state.notifier.as_ref(), state.clock.as_ref(), &state.job_name)
            .await;
    let message = if delivered {
        "failure notice sent"
    } else {
        "failure notice could not be delivered"
    };
    Json(serde_json::json!({"message": message, "delivered": delivered}))
}
