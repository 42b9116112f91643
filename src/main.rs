use buddyhub::{AppState, Config, app, db, events};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "buddyhub=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db_pool = db::connect(&config.database_url, config.max_connections).await?;

    if !config.event_status_refresh.is_zero() {
        events::spawn_status_refresh(db_pool.clone(), config.event_status_refresh);
    }

    let app = app(AppState::new(db_pool, &config), &config);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
