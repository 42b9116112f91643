pub mod buddies;
pub mod communities;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod gate;
pub mod moderation;
pub mod models;
pub mod profiles;
pub mod projects;
pub mod roles;
pub mod session;
#[cfg(any(test, feature = "test_utils"))]
pub mod testing;

use axum::{Router, extract::FromRef, http::StatusCode, middleware};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, SessionStore, cookie::SameSite};

pub use config::Config;
pub use error::{AppError, AppResult};
use roles::RoleResolver;
use session::SessionHub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub roles: RoleResolver,
    pub hub: SessionHub,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: &Config) -> Self {
        Self {
            db_pool,
            roles: RoleResolver::new(config.legacy_role_fallback),
            hub: SessionHub::default(),
        }
    }
}

/// All routes with sessions, tracing, the request timeout and CORS layered on.
pub fn app(state: AppState, config: &Config) -> Router {
    app_with_store(state, config, MemoryStore::default())
}

/// Like [`app`], over a session store the caller keeps a handle to.
pub fn app_with_store<Store>(state: AppState, config: &Config, store: Store) -> Router
where
    Store: SessionStore + Clone,
{
    let session_layer = SessionManagerLayer::new(store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(config.session_idle));

    Router::new()
        .merge(session::router())
        .merge(profiles::router())
        .nest("/buddies", buddies::router())
        .nest("/projects", projects::router())
        .nest("/events", events::router())
        .nest("/communities", communities::router())
        .nest("/admin", moderation::router())
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(middleware::map_response(error::timeout_body))
        .layer(CorsLayer::permissive())
}
