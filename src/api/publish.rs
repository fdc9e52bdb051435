// POST /_dr/task/publishDnsUpdates
use axum::{
    Extension, Form, Json,
    extract::rejection::FormRejection,
    http::{HeaderMap, StatusCode},
};
use serde_json::json;
use tracing::info;

use crate::SharedState;
use crate::auth::QueuePrincipal;
use crate::error::AppError;
use crate::publish::PublishOutcome;
use crate::publish::batch::{PublishBatch, PublishForm};

/// How many times the queue has already tried this task; absent on first delivery.
pub const RETRY_COUNT_HEADER: &str = "x-cloudtasks-taskretrycount";

fn retry_count(headers: &HeaderMap) -> Result<u32, AppError> {
    let Some(value) = headers.get(RETRY_COUNT_HEADER) else {
        return Ok(0);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| AppError::bad_request(format!("invalid {RETRY_COUNT_HEADER} header")))
}

pub async fn publish_dns_updates(
    QueuePrincipal(_): QueuePrincipal,
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    form: Result<Form<PublishForm>, FormRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let Form(form) = form.map_err(|e| AppError::bad_request(e.body_text()))?;
    let batch =
        PublishBatch::from_form(form).map_err(|e| AppError::bad_request(e.to_string()))?;
    let attempt = retry_count(&headers)?;

    info!(
        tld = %batch.tld,
        writer = %batch.writer,
        lock_index = batch.lock_index,
        num_locks = batch.num_locks,
        attempt,
        domains = batch.domains.len(),
        hosts = batch.hosts.len(),
        "received publish batch"
    );

    let response = match state.publisher.publish(&batch, attempt).await? {
        PublishOutcome::Succeeded { domains, hosts } => (
            StatusCode::OK,
            json!({
                "outcome": "succeeded",
                "domains": { "accepted": domains.accepted, "rejected": domains.rejected },
                "hosts": { "accepted": hosts.accepted, "rejected": hosts.rejected },
            }),
        ),
        PublishOutcome::Requeued(reason) => (
            StatusCode::OK,
            json!({ "outcome": "requeued", "reason": format!("{reason:?}") }),
        ),
        PublishOutcome::Split => (StatusCode::OK, json!({ "outcome": "split" })),
        PublishOutcome::PermanentlyFailed => (
            StatusCode::ACCEPTED,
            json!({ "outcome": "permanently_failed" }),
        ),
    };
    Ok((response.0, Json(response.1)))
}
