//! Outbound operator/registrar email, sent through an HTTP mail relay.
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail relay request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("mail relay rejected message with {status}: {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub to: Vec<String>,
    pub bcc: Vec<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

#[derive(Clone)]
pub struct HttpMailRelay {
    http: Client,
    url: String,
    token: Option<String>,
}

impl HttpMailRelay {
    pub fn new(http: Client, url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailRelay {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let mut req = self.http.post(&self.url).json(message);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await?;
        let status = res.status();
        if !status.is_success() {
            let message = res.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %message, "mail relay rejected message");
            return Err(MailError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        info!(recipients = message.to.len(), subject = %message.subject, "sent email");
        Ok(())
    }
}
