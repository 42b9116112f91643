use axum::{Json, debug_handler, extract::{Path, State}, http::StatusCode};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppResult, AppState, gate::Caller, models::BuddyRelation};

use super::engine::{self, BuddyLists, RelationState};

#[derive(Serialize)]
pub(crate) struct RelationView {
    state: RelationState,
    relation: Option<BuddyRelation>,
}

#[derive(Serialize)]
pub(crate) struct Count {
    count: i64,
}

#[debug_handler(state = AppState)]
pub(crate) async fn buddy_lists(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
) -> AppResult<Json<BuddyLists>> {
    Ok(Json(engine::lists(&db_pool, &caller).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn incoming_count(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
) -> AppResult<Json<Count>> {
    let me = caller.member()?;
    Ok(Json(Count {
        count: engine::count_incoming(&db_pool, me).await?,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn relation_state(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<RelationView>> {
    let me = caller.member()?;
    let relation = engine::lookup(&db_pool, me, user_id).await?;
    Ok(Json(RelationView {
        state: RelationState::of(relation.as_ref(), me),
        relation,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn request(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(user_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<BuddyRelation>)> {
    let relation = engine::send_request(&db_pool, &caller, user_id).await?;
    Ok((StatusCode::CREATED, Json(relation)))
}

/// Cancels an outgoing request, or ends an accepted relation.
#[debug_handler(state = AppState)]
pub(crate) async fn withdraw(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(user_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let me = caller.member()?;
    match engine::state(&db_pool, &caller, user_id).await? {
        RelationState::Accepted => engine::remove(&db_pool, &caller, user_id).await?,
        _ => engine::cancel(&db_pool, &caller, user_id).await?,
    }
    tracing::debug!(%me, other = %user_id, "relation withdrawn");
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn accept(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(relation_id): Path<Uuid>,
) -> AppResult<Json<BuddyRelation>> {
    Ok(Json(engine::accept(&db_pool, &caller, relation_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn reject(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(relation_id): Path<Uuid>,
) -> AppResult<Json<BuddyRelation>> {
    Ok(Json(engine::reject(&db_pool, &caller, relation_id).await?))
}
