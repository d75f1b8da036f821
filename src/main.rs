// src/main.rs

use examora::config::Config;
use examora::exam::{ExamService, SystemClock};
use examora::routes;
use examora::state::AppState;
use examora::storage::{MemoryStore, PgStore};
use dotenvy::dotenv;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let db_timeout = Duration::from_secs(config.db_timeout_secs);

    let exams = match &config.database_url {
        Some(database_url) => {
            let pool = connect_with_retry(database_url, db_timeout).await?;
            tracing::info!("Database connected...");

            // Run Migrations Automatically
            tracing::info!("Running migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Migrations applied successfully.");

            let store = Arc::new(PgStore::new(pool, db_timeout));
            ExamService::new(store.clone(), store, Arc::new(SystemClock))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, attempts are kept in memory only");
            let store = Arc::new(MemoryStore::new());
            ExamService::new(store.clone(), store, Arc::new(SystemClock))
        }
    };

    if config.sweep_interval_secs > 0 {
        spawn_expiry_sweep(exams.clone(), Duration::from_secs(config.sweep_interval_secs));
    }

    // Create AppState
    let state = AppState {
        exams,
        config: config.clone(),
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    // Start the server
    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize Database Pool with Retry
async fn connect_with_retry(database_url: &str, timeout: Duration) -> Result<PgPool, sqlx::Error> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(timeout)
            .connect(database_url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to connect to database after 5 retries: {}", e);
                    return Err(e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

/// Periodically closes attempts whose time ran out. Lazy expiry on access
/// already guarantees correctness; this only keeps listings tidy.
fn spawn_expiry_sweep(exams: ExamService, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match exams.sweep_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Expiry sweep closed {} attempts", n),
                Err(e) => tracing::warn!("Expiry sweep failed: {}", e),
            }
        }
    });
}
