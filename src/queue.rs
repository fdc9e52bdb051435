//! Re-enqueueing publish batches on the external task queue.
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::publish::batch::PublishBatch;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("task queue request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("task queue rejected task with {status}: {message}")]
    Rejected { status: u16, message: String },
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, batch: &PublishBatch) -> Result<(), QueueError>;
}

/// Pushes batches to the queue's HTTP endpoint using the same form shape the worker accepts.
#[derive(Clone)]
pub struct HttpTaskQueue {
    http: Client,
    url: String,
    token: Option<String>,
}

impl HttpTaskQueue {
    pub fn new(http: Client, url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl TaskQueue for HttpTaskQueue {
    async fn enqueue(&self, batch: &PublishBatch) -> Result<(), QueueError> {
        let mut req = self.http.post(&self.url).form(&batch.to_form());
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await?;
        let status = res.status();
        if !status.is_success() {
            let message = res.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %message, "task queue rejected publish batch");
            return Err(QueueError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        debug!(
            tld = %batch.tld,
            domains = batch.domains.len(),
            hosts = batch.hosts.len(),
            "enqueued publish batch"
        );
        Ok(())
    }
}
