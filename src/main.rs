mod config;
mod error;
mod fusionbrain;
mod state;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

use crate::error::ApiError;
use crate::fusionbrain::Style;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!(
        base_url = %config.base_url,
        poll_attempts = config.poll_attempts,
        poll_delay_secs = config.poll_delay.as_secs(),
        "FusionBrain proxy starting"
    );

    let state = Arc::new(AppState::new(&config)?);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server running at http://localhost:{}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/styles", get(styles))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[derive(Deserialize)]
struct GenerateRequest {
    prompt: Option<String>,
    style: Option<String>,
}

#[derive(Serialize)]
struct GenerateResponse {
    image_base64: String,
}

async fn generate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "unreadable generate request");
            return Err(ApiError::EmptyPrompt);
        }
    };

    let prompt = request
        .prompt
        .filter(|p| !p.is_empty())
        .ok_or(ApiError::EmptyPrompt)?;
    let style = request.style.unwrap_or_default();

    let request_id = uuid::Uuid::new_v4();
    let image_base64 = state
        .generate(&prompt, style)
        .instrument(tracing::info_span!("generate", %request_id))
        .await?;

    Ok(Json(GenerateResponse { image_base64 }))
}

async fn styles(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Style>>, ApiError> {
    state.client.list_styles().await.map(Json).map_err(|e| {
        tracing::error!(error = %e, "cannot load styles");
        ApiError::StylesUnavailable
    })
}
