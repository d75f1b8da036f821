// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Minimum score (percentage) for an attempt to count as passed.
pub const PASSING_SCORE: f64 = 60.0;

/// Duration assigned to a quiz when the author does not provide one.
pub const DEFAULT_DURATION_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: String,
    /// Upper bound for a single persistence call.
    pub db_timeout_secs: u64,
    /// Period of the background expiry sweep, 0 disables it.
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let db_timeout_secs = parse_db_timeout(env::var("DB_TIMEOUT_SECS").ok().as_deref());

        let sweep_interval_secs = env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            db_timeout_secs,
            sweep_interval_secs,
        }
    }
}

/// Seconds allowed per persistence call. Defaults to 5; a zero timeout
/// would fail every call, so it is raised to 1.
fn parse_db_timeout(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(5)
        .max(1)
}
