//! Email about items that could not be published after every retry.
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::{error, info, warn};

use super::batch::PublishBatch;
use crate::config::EmailConfig;
use crate::mail::{EmailMessage, Mailer};
use crate::registry::{RegistryError, RegistryStore};

lazy_static::lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^@\s<>,;]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Domain,
    Host,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemKind::Domain => "domain",
            ItemKind::Host => "host",
        })
    }
}

pub fn is_valid_email(address: &str) -> bool {
    EMAIL_RE.is_match(address.trim())
}

pub struct FailureNotifier {
    registry: Arc<dyn RegistryStore>,
    mailer: Arc<dyn Mailer>,
    email: EmailConfig,
}

impl FailureNotifier {
    pub fn new(registry: Arc<dyn RegistryStore>, mailer: Arc<dyn Mailer>, email: EmailConfig) -> Self {
        Self {
            registry,
            mailer,
            email,
        }
    }

    /// Tell the sponsoring registrar (and ops, in BCC) that the single item of `batch` failed
    /// for good. Problems are logged, never returned: the batch is acknowledged either way.
    pub async fn notify(&self, batch: &PublishBatch) {
        let (kind, name) = match (batch.domains.first(), batch.hosts.first()) {
            (Some(domain), _) => (ItemKind::Domain, domain.as_str()),
            (None, Some(host)) => (ItemKind::Host, host.as_str()),
            (None, None) => {
                error!(tld = %batch.tld, "permanently failed batch carries no items");
                return;
            }
        };

        match self.build_message(kind, name).await {
            Ok(Some(message)) => {
                if let Err(err) = self.mailer.send(&message).await {
                    error!(%kind, %name, "failed to send publish failure email: {err}");
                } else {
                    info!(%kind, %name, "sent publish failure email");
                }
            }
            Ok(None) => {}
            Err(err) => error!(%kind, %name, "registry lookup for failure email failed: {err}"),
        }
    }

    async fn build_message(
        &self,
        kind: ItemKind,
        name: &str,
    ) -> Result<Option<EmailMessage>, RegistryError> {
        let registrar_id = match kind {
            ItemKind::Domain => self.registry.load_domain(name).await?.map(|d| d.registrar_id),
            ItemKind::Host => self.registry.load_host(name).await?.map(|h| h.registrar_id),
        };
        let Some(registrar_id) = registrar_id else {
            error!(%kind, %name, "cannot notify about publish failure: {kind} not found");
            return Ok(None);
        };
        let Some(registrar) = self.registry.load_registrar(&registrar_id).await? else {
            error!(
                %kind, %name, registrar = %registrar_id,
                "cannot notify about publish failure: registrar not found"
            );
            return Ok(None);
        };

        let to: Vec<String> = registrar
            .admin_emails
            .iter()
            .filter(|address| {
                let ok = is_valid_email(address);
                if !ok {
                    warn!(registrar = %registrar.id, %address, "skipping unparseable contact address");
                }
                ok
            })
            .map(|address| address.trim().to_string())
            .collect();

        let (to, bcc) = if to.is_empty() {
            warn!(
                %kind, %name, registrar = %registrar.id,
                "registrar has no usable contact address, notifying the operations mailbox only"
            );
            (vec![self.email.bcc_email.clone()], Vec::new())
        } else {
            (to, vec![self.email.bcc_email.clone()])
        };

        Ok(Some(EmailMessage {
            subject: self.email.subject.clone(),
            body: self.render_body(&registrar.name, name, kind),
            to,
            bcc,
        }))
    }

    fn render_body(&self, registrar: &str, name: &str, kind: ItemKind) -> String {
        self.email
            .body_template
            .replace("{registrar}", registrar)
            .replace("{name}", name)
            .replace("{kind}", &kind.to_string())
            .replace("{support_email}", &self.email.support_email)
            .replace("{registry_name}", &self.email.registry_name)
    }
}
