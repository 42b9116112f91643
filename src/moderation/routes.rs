use axum::{Json, debug_handler, extract::{Path, State}, http::StatusCode};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    AppResult, AppState,
    communities::Community,
    gate::Caller,
    models::{ApprovalStatus, Event, Profile, Project, RoleAssignment},
    session::SessionHub,
};

use super::engine::{self, BulkAction, NewAssignment, Participant};

#[derive(Deserialize)]
pub(crate) struct Toggle {
    on: bool,
}

#[derive(Deserialize)]
pub(crate) struct FlagQuery {
    flagged: bool,
    note: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ApprovalQuery {
    status: ApprovalStatus,
}

#[derive(Deserialize)]
pub(crate) struct BulkQuery {
    ids: Vec<Uuid>,
    #[serde(flatten)]
    action: BulkAction,
}

#[derive(Serialize)]
pub(crate) struct BulkOutcome {
    touched: u64,
}

#[debug_handler(state = AppState)]
pub(crate) async fn bulk_projects(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Json(BulkQuery { ids, action }): Json<BulkQuery>,
) -> AppResult<Json<BulkOutcome>> {
    let touched = engine::bulk_projects(&db_pool, &caller, &ids, action).await?;
    Ok(Json(BulkOutcome { touched }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_project(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(project_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    engine::delete_project(&db_pool, &caller, project_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn feature_project(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(project_id): Path<Uuid>,
    Json(Toggle { on }): Json<Toggle>,
) -> AppResult<Json<Project>> {
    Ok(Json(engine::feature_project(&db_pool, &caller, project_id, on).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn archive_project(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(project_id): Path<Uuid>,
    Json(Toggle { on }): Json<Toggle>,
) -> AppResult<Json<Project>> {
    Ok(Json(engine::archive_project(&db_pool, &caller, project_id, on).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn flag_project(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(project_id): Path<Uuid>,
    Json(FlagQuery { flagged, note }): Json<FlagQuery>,
) -> AppResult<Json<Project>> {
    let project = engine::flag_project(&db_pool, &caller, project_id, flagged, note.as_deref()).await?;
    Ok(Json(project))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_event(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    engine::delete_event(&db_pool, &caller, event_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn feature_event(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
    Json(Toggle { on }): Json<Toggle>,
) -> AppResult<Json<Event>> {
    Ok(Json(engine::feature_event(&db_pool, &caller, event_id, on).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn archive_event(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
    Json(Toggle { on }): Json<Toggle>,
) -> AppResult<Json<Event>> {
    Ok(Json(engine::archive_event(&db_pool, &caller, event_id, on).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn allow_rsvp(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
    Json(Toggle { on }): Json<Toggle>,
) -> AppResult<Json<Event>> {
    Ok(Json(engine::allow_rsvp(&db_pool, &caller, event_id, on).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn participants(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
) -> AppResult<Json<Vec<Participant>>> {
    Ok(Json(engine::participants(&db_pool, &caller, event_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn add_participant(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path((event_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    engine::add_participant(&db_pool, &caller, event_id, user_id).await?;
    Ok(StatusCode::CREATED)
}

#[debug_handler(state = AppState)]
pub(crate) async fn remove_participant(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path((event_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    engine::remove_participant(&db_pool, &caller, event_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn pending_profiles(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(engine::pending_profiles(&db_pool, &caller).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn set_approval(
    State(db_pool): State<SqlitePool>,
    State(hub): State<SessionHub>,
    caller: Caller,
    Path(user_id): Path<Uuid>,
    Json(ApprovalQuery { status }): Json<ApprovalQuery>,
) -> AppResult<Json<Profile>> {
    Ok(Json(engine::set_approval(&db_pool, &hub, &caller, user_id, status).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn assign_role(
    State(db_pool): State<SqlitePool>,
    State(hub): State<SessionHub>,
    caller: Caller,
    Json(assignment): Json<NewAssignment>,
) -> AppResult<(StatusCode, Json<RoleAssignment>)> {
    let assigned = engine::assign_role(&db_pool, &hub, &caller, assignment).await?;
    Ok((StatusCode::CREATED, Json(assigned)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn revoke_role(
    State(db_pool): State<SqlitePool>,
    State(hub): State<SessionHub>,
    caller: Caller,
    Path(assignment_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    engine::revoke_role(&db_pool, &hub, &caller, assignment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn add_community(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Json(community): Json<Community>,
) -> AppResult<(StatusCode, Json<Community>)> {
    let community = engine::add_community(&db_pool, &caller, community).await?;
    Ok((StatusCode::CREATED, Json(community)))
}
