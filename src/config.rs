use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::Context;

/// Runtime settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub session_idle: time::Duration,
    pub request_timeout: Duration,
    /// Consult `profiles.role` when no role assignment grants hosting.
    pub legacy_role_fallback: bool,
    /// Zero disables the periodic event status refresh.
    pub event_status_refresh: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://buddyhub.db".to_owned(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 16,
            session_idle: time::Duration::minutes(30),
            request_timeout: Duration::from_secs(10),
            legacy_role_fallback: true,
            event_status_refresh: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let _ = dotenv::dotenv();
        let defaults = Config::default();

        Ok(Config {
            database_url: dotenv::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: parse_var("BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            max_connections: parse_var("MAX_CONNECTIONS")?.unwrap_or(defaults.max_connections),
            session_idle: parse_var("SESSION_IDLE_MINUTES")?
                .map(time::Duration::minutes)
                .unwrap_or(defaults.session_idle),
            request_timeout: parse_var("REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            legacy_role_fallback: parse_var("LEGACY_ROLE_FALLBACK")?
                .unwrap_or(defaults.legacy_role_fallback),
            event_status_refresh: parse_var("EVENT_STATUS_REFRESH_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.event_status_refresh),
        })
    }
}

fn parse_var<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid {key}: {value:?}")),
        Err(_) => Ok(None),
    }
}
