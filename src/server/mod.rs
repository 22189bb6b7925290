//! HTTP API for the inference service
//!
//! | Method | Path                 | Purpose                          |
//! |--------|----------------------|----------------------------------|
//! | GET    | `/api/health`        | readiness, loads the model       |
//! | GET    | `/api/model/info`    | model name, shape, classes       |
//! | POST   | `/api/predict`       | multipart `file`                 |
//! | POST   | `/api/batch-predict` | multipart `files`, repeated      |
//! | GET    | `/api/stats`         | stored evaluation of the model   |

pub mod error;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::ApiError;
pub use state::{AppState, SharedState};

use crate::config::ServeConfig;
use crate::utils::error::{JaundiceError, Result};

/// Upper bound on a whole request body; single files are capped separately
pub const MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024;

/// Build the application router
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/model/info", get(routes::model_info))
        .route("/api/predict", post(routes::predict))
        .route("/api/batch-predict", post(routes::batch_predict))
        .route("/api/stats", get(routes::stats))
        .fallback(routes::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Bind to the configured address and serve until the process exits
pub async fn serve(config: &ServeConfig, state: SharedState) -> Result<()> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| JaundiceError::Config(format!("invalid bind address {}: {}", config.bind_address(), e)))?;

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
