mod engine;
mod routes;

use std::time::Duration;

use axum::{Router, routing::{self, post}};
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::AppState;

pub use engine::{
    Attendance, NewEvent, attendance, cancel_rsvp, create, get, has_rsvp, refresh_statuses, rsvp,
};
pub(crate) use engine::update;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(routes::new_event))
        .route("/{event_id}", routing::get(routes::event))
        .route("/{event_id}/rsvp", post(routes::rsvp).delete(routes::cancel_rsvp))
        .route("/{event_id}/attendees", routing::get(routes::attendees))
}

/// Periodically recompute event statuses from their timestamps.
pub fn spawn_status_refresh(db_pool: SqlitePool, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = refresh_statuses(&db_pool, OffsetDateTime::now_utc()).await {
                tracing::warn!(error = %e, "event status refresh failed");
            }
        }
    })
}
