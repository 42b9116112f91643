mod engine;
mod page;

use axum::{Router, routing::{self, post}};

use crate::AppState;

pub use engine::{ProfileCard, ProfileFields, card, edit, get, password_changed, register};
pub(crate) use engine::COLUMNS;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", routing::get(page::me).patch(page::edit_me))
        .route("/me/password-changed", post(page::password_changed))
        .route("/profiles", post(page::register))
        .route("/p/{user_id}", routing::get(page::profile))
}
