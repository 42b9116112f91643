mod engine;
mod routes;

use axum::{Router, routing::{self, post, put}};

use crate::AppState;

pub use engine::{
    NewProject, approve, create, get, get_request, is_member, members, open, reject, requests,
    set_looking_for, set_status,
};
pub(crate) use engine::{COLUMNS, update};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(routes::new_project))
        .route("/{project_id}", routing::get(routes::project))
        .route("/{project_id}/members", routing::get(routes::project_members))
        .route(
            "/{project_id}/requests",
            routing::get(routes::join_requests).post(routes::ask_to_join),
        )
        .route("/{project_id}/looking-for", put(routes::looking_for))
        .route("/{project_id}/status", put(routes::status))
        .route("/requests/{request_id}/approve", post(routes::approve_request))
        .route("/requests/{request_id}/reject", post(routes::reject_request))
}
