pub mod publish;

use axum::{
    Extension, Router,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};

use crate::SharedState;
use crate::error::AppError;

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        // task queue push target
        .route(
            "/_dr/task/publishDnsUpdates",
            post(publish::publish_dns_updates),
        )
        // operations
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .layer(Extension(state))
}

async fn metrics(Extension(state): Extension<SharedState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.encode().map_err(AppError::internal)?;
    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    ))
}

async fn healthz() -> &'static str {
    "ok"
}
