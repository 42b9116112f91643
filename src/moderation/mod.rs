mod engine;
mod routes;

use axum::{Router, routing::{delete, get, post, put}};

use crate::AppState;

pub use engine::{
    BulkAction, NewAssignment, Participant, add_community, add_participant, allow_rsvp,
    archive_event, archive_project, assign_role, bulk_projects, delete_event, delete_project,
    feature_event, feature_project, flag_project, participants, pending_profiles,
    remove_participant, revoke_role, set_approval,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects/bulk", post(routes::bulk_projects))
        .route("/projects/{project_id}", delete(routes::delete_project))
        .route("/projects/{project_id}/featured", put(routes::feature_project))
        .route("/projects/{project_id}/archived", put(routes::archive_project))
        .route("/projects/{project_id}/flag", put(routes::flag_project))
        .route("/events/{event_id}", delete(routes::delete_event))
        .route("/events/{event_id}/featured", put(routes::feature_event))
        .route("/events/{event_id}/archived", put(routes::archive_event))
        .route("/events/{event_id}/rsvp", put(routes::allow_rsvp))
        .route("/events/{event_id}/participants", get(routes::participants))
        .route(
            "/events/{event_id}/participants/{user_id}",
            put(routes::add_participant).delete(routes::remove_participant),
        )
        .route("/profiles/pending", get(routes::pending_profiles))
        .route("/profiles/{user_id}/status", put(routes::set_approval))
        .route("/roles", post(routes::assign_role))
        .route("/roles/{assignment_id}", delete(routes::revoke_role))
        .route("/communities", post(routes::add_community))
}
