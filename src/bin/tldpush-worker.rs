use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tldpush::{
    AppState, SharedState, api,
    auth::hash_password,
    clock::{Clock, SystemClock},
    config::AppConfig,
    db::{self, lock_repo::SqliteLockManager, registry_repo::SqliteRegistry},
    mail::HttpMailRelay,
    maintenance::{ZoneDefaults, ZoneMaintainer},
    metrics::Metrics,
    powerdns::client::PowerDnsClient,
    publish::{PublishSettings, Publisher, notify::FailureNotifier},
    queue::HttpTaskQueue,
    registry::RegistryStore,
    writer::{WriterRegistry, powerdns::PowerDnsWriterFactory},
    zone::{cache::ZoneIdCache, directory::ZoneDirectory},
};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};

const API_KEY_ENV: &str = "TLDPUSH_PDNS_API_KEY";

#[derive(Parser, Debug)]
#[command(author, version, about, rename_all = "kebab-case")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    /// Path to the TOML configuration file
    #[arg(long, value_name = "PATH", default_value = "/etc/tldpush/tldpush.toml")]
    config: PathBuf,
    /// Path to the SQLite database file
    #[arg(long, value_name = "PATH", default_value = "/var/lib/tldpush/registry.db")]
    db_path: PathBuf,
    /// Listen address for the HTTP server
    #[arg(long, value_name = "ADDR", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an Argon2 hash for the [queue_auth] password_hash setting
    HashPassword {
        #[arg(value_name = "PASSWORD")]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(Command::HashPassword { password }) = &cli.command {
        println!("{}", hash_password(password)?);
        return Ok(());
    }

    init_tracing();

    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        config.powerdns.api_key = key;
    }

    let state = init_shared_state(&cli, config).await?;
    let app = api::create_router(state);

    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind to {}", cli.listen))?;

    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    Ok(())
}

async fn init_shared_state(cli: &Cli, config: AppConfig) -> Result<SharedState> {
    if let Some(parent) = cli.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create db directory {}", parent.display()))?;
    }
    let db = db::init_db(&cli.db_path)
        .await
        .with_context(|| format!("failed to open database {}", cli.db_path.display()))?;

    let pdns = Arc::new(PowerDnsClient::new(
        &config.powerdns.base_url,
        &config.powerdns.api_key,
        &config.powerdns.server_id,
    ));
    let servers = pdns
        .list_servers()
        .await
        .context("PowerDNS API is not reachable")?;
    info!(
        server_id = %pdns.server_id(),
        servers = servers.len(),
        "connected to PowerDNS"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = Arc::new(Metrics::new());
    let http = reqwest::Client::new();
    let registry: Arc<dyn RegistryStore> = Arc::new(SqliteRegistry::new(db.clone()));

    let maintainer = ZoneMaintainer::new(
        pdns.clone(),
        clock.clone(),
        metrics.clone(),
        ZoneDefaults::from(&config.powerdns),
    );
    let directory = Arc::new(ZoneDirectory::new(
        pdns.clone(),
        ZoneIdCache::new(clock.clone(), config.powerdns.zone_cache_horizon()),
        maintainer,
    ));
    let writers = WriterRegistry::new().with(Arc::new(PowerDnsWriterFactory::new(
        pdns,
        directory,
        registry.clone(),
        config.dns.clone(),
    )));
    let notifier = FailureNotifier::new(
        registry.clone(),
        Arc::new(HttpMailRelay::new(
            http.clone(),
            config.email.relay_url.clone(),
            config.email.relay_token.clone(),
        )),
        config.email.clone(),
    );
    let publisher = Publisher::new(
        registry,
        writers,
        Arc::new(SqliteLockManager::new(db, clock.clone())),
        Arc::new(HttpTaskQueue::new(
            http,
            config.publish.task_queue_url.clone(),
            config.publish.task_queue_token.clone(),
        )),
        notifier,
        metrics.clone(),
        clock,
        PublishSettings::from(&config.publish),
    );

    info!(
        dnssec = config.powerdns.dnssec_enabled,
        tsig = config.powerdns.tsig_enabled,
        "publish worker ready"
    );

    Ok(Arc::new(AppState {
        config,
        publisher,
        metrics,
    }))
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!("failed to install CTRL+C handler: {err}");
    }
    info!("shutdown signal received");
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
