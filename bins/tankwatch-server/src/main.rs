use std::sync::Arc;

use clap::Parser;

use tankwatch_api::StoreConnector;
use tankwatch_engine::config::{IngestConfig, Tunables};
use tankwatch_engine::Engine;
use tankwatch_storage_postgres::{PostgresConfig, PostgresConnector};

/// Credentials and hosts come from the environment
/// (db_user, db_password, database, db_host, db_port, mqtt_host, mqtt_port).
#[derive(Parser)]
#[command(name = "tankwatch-server", about = "Aquarium sensor readings: MQTT → PostgreSQL")]
struct Cli {
    /// Optional TOML file with tunables (rate limit, topic filter, timeouts).
    #[arg(long, env = "TANKWATCH_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let tunables = match &cli.config {
        Some(path) => {
            tracing::info!(config = %path, "loading tunables");
            Tunables::load(path)
        }
        None => Ok(Tunables::default()),
    };
    let config = match tunables.and_then(IngestConfig::from_env) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let db = &config.database;
    let connector: Arc<dyn StoreConnector> = Arc::new(PostgresConnector::new(&PostgresConfig {
        host: db.host.clone(),
        port: db.port,
        user: db.user.clone(),
        password: db.password.clone(),
        database: db.database.clone(),
        table: db.table.clone(),
        connect_timeout: db.connect_timeout,
    }));

    let engine = Engine::bootstrap(config, connector);
    tracing::info!("tankwatch-server started, press Ctrl+C to stop");

    if let Err(e) = wait_for_shutdown().await {
        tracing::error!(error = %e, "failed to listen for shutdown signals");
    }
    tracing::info!("shutting down...");
    engine.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
