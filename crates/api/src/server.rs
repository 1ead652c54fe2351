use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{Method, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use engine::Bot;
use execution::{Exchange, ExchangeError};
use protocol::{
    BotStatus, CONTROL_PATH, ControlAction, ControlRequest, ControlResponse, HEALTH_PATH,
    LOGS_LIMIT, LOGS_PATH, LogsResponse, STATUS_PATH, STREAM_PATH,
};

use crate::config::{CorsOrigins, ServerConfig};
use crate::ws;

pub type SharedBot = Arc<Bot<Arc<dyn Exchange>>>;

#[derive(Clone)]
pub struct AppState {
    pub bot: SharedBot,
    pub status_push: Duration,
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);
    let cors = match &config.cors_origins {
        CorsOrigins::Any => cors.allow_origin(Any),
        CorsOrigins::List(list) => cors.allow_origin(AllowOrigin::list(list.clone())),
    };

    let mut app = Router::new()
        .route(HEALTH_PATH, get(health))
        .route(CONTROL_PATH, post(control))
        .route(STATUS_PATH, get(status))
        .route(LOGS_PATH, get(logs))
        .route(STREAM_PATH, get(ws::stream))
        .with_state(state);

    if config.frontend_dir.is_dir() {
        info!("serving frontend from {}", config.frontend_dir.display());
        let index = config.frontend_dir.join("index.html");
        app = app.fallback_service(
            ServeDir::new(&config.frontend_dir).fallback(ServeFile::new(index)),
        );
    }

    app.layer(cors).layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

async fn control(
    State(state): State<AppState>,
    Json(req): Json<ControlRequest>,
) -> (StatusCode, Json<ControlResponse>) {
    let Some(action) = ControlAction::parse(&req.action) else {
        return (StatusCode::BAD_REQUEST, Json(ControlResponse::unknown()));
    };

    match action {
        ControlAction::Start => state.bot.start(),
        ControlAction::Stop => state.bot.stop(),
    };
    info!("control: {}", action);

    (StatusCode::OK, Json(ControlResponse::accepted(action)))
}

async fn status(
    State(state): State<AppState>,
) -> Result<Json<BotStatus>, (StatusCode, Json<serde_json::Value>)> {
    state.bot.status().await.map(Json).map_err(exchange_err)
}

async fn logs(State(state): State<AppState>) -> Json<LogsResponse> {
    Json(LogsResponse {
        logs: state.bot.logs(LOGS_LIMIT),
    })
}

fn exchange_err(e: ExchangeError) -> (StatusCode, Json<serde_json::Value>) {
    error!("exchange error: {}", e);
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({"error": e.to_string()})),
    )
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
