use std::process::ExitCode;
use std::sync::Arc;

use station_server::auth::ensure_admin;
use station_server::config::{AppConfig, DatabaseConfig};
use station_server::store::{MemoryStore, Store, StoreError};
use station_server::web::{AppState, create_router};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "station_server=info,tower_http=info";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let store = open_store(config.database.as_ref()).await?;

    if let Some(admin) = &config.admin {
        ensure_admin(store.as_ref(), admin).await?;
    }

    let app = create_router(AppState::new(store, config.pages));

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "station server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

#[cfg(feature = "postgres")]
async fn open_store(database: Option<&DatabaseConfig>) -> Result<Arc<dyn Store>, StoreError> {
    use station_server::store::{PostgresConfig, PostgresStore};

    let Some(database) = database else {
        return Ok(memory_store());
    };
    let store = PostgresStore::connect(PostgresConfig {
        database_url: database.url.clone(),
        max_pool_size: database.max_pool_size,
        connection_timeout: database.connection_timeout,
    })
    .await?;
    info!(pool = database.max_pool_size, "using PostgreSQL store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn open_store(database: Option<&DatabaseConfig>) -> Result<Arc<dyn Store>, StoreError> {
    debug_assert!(database.is_none());
    Ok(memory_store())
}

fn memory_store() -> Arc<dyn Store> {
    warn!("DATABASE_URL not set; data is kept in memory and lost on exit");
    Arc::new(MemoryStore::new())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
