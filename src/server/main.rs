use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info, Level};

use keyward::config::{get_config, KeywardConfig};
use keyward::errors::{LicenseError, LicenseResult};
use keyward::server::{build_router, AppState, Database};
use keyward::Authority;

fn init_tracing(config: &KeywardConfig) {
    let level = if config.logging.enabled {
        config.logging.level.parse().unwrap_or(Level::INFO)
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received, draining connections");
}

async fn run(config: &KeywardConfig) -> LicenseResult<()> {
    let admin_secret = config.require_admin_secret()?;

    let database = Database::connect(&config.database).await?;
    database.migrate().await?;

    let authority = Authority::new(database, Some(admin_secret));
    let app = build_router(AppState::new(authority));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| LicenseError::ConfigError(format!("invalid listen address: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| LicenseError::ServerError(format!("failed to bind {addr}: {e}")))?;

    info!(
        "Keyward listening on http://{addr} (store: {})",
        config.database.db_type
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| LicenseError::ServerError(format!("server error: {e}")))
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match get_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("keyward: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config);

    match run(config).await {
        Ok(()) => {
            info!("Keyward stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Keyward failed: {e}");
            ExitCode::FAILURE
        }
    }
}
