//! Crate entrypoint wiring together configuration, the registry store, PowerDNS and the
//! publish pipeline.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod lock;
pub mod mail;
pub mod maintenance;
pub mod metrics;
pub mod powerdns;
pub mod publish;
pub mod queue;
pub mod registry;
pub mod validation;
pub mod writer;
pub mod zone;

#[cfg(test)]
mod testing;

use config::AppConfig;
use metrics::Metrics;
use publish::Publisher;

use std::sync::Arc;

/// Complete application dependencies shared across handlers.
pub struct AppState {
    pub config: AppConfig,
    pub publisher: Publisher,
    pub metrics: Arc<Metrics>,
}

/// Arc-wrapped version of `AppState` passed into Axum extensions.
pub type SharedState = Arc<AppState>;
