mod engine;
mod routes;

use axum::{Router, routing::{self, post}};

use crate::AppState;

pub use engine::{
    BuddyEntry, BuddyLists, RelationState, accept, cancel, count_accepted, count_incoming, get,
    lists, lookup, reject, remove, send_request, state,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", routing::get(routes::buddy_lists))
        .route("/count", routing::get(routes::incoming_count))
        .route(
            "/with/{user_id}",
            routing::get(routes::relation_state)
                .post(routes::request)
                .delete(routes::withdraw),
        )
        .route("/{relation_id}/accept", post(routes::accept))
        .route("/{relation_id}/reject", post(routes::reject))
}
