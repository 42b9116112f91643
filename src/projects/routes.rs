use axum::{Json, debug_handler, extract::{Path, State}, http::StatusCode};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    AppError, AppResult, AppState,
    gate::Caller,
    models::{JoinRequest, Project, ProjectMember, ProjectStatus},
};

use super::engine::{self, NewProject};

#[derive(Deserialize)]
pub(crate) struct JoinQuery {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
pub(crate) struct LookingForQuery {
    looking_for: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct StatusQuery {
    status: ProjectStatus,
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_project(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Json(new): Json<NewProject>,
) -> AppResult<(StatusCode, Json<Project>)> {
    let project = engine::create(&db_pool, &caller, new).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn project(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Project>> {
    caller.member()?;
    let project = engine::get(&db_pool, project_id)
        .await?
        .ok_or(AppError::NotFound("project"))?;
    Ok(Json(project))
}

#[debug_handler(state = AppState)]
pub(crate) async fn project_members(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<ProjectMember>>> {
    Ok(Json(engine::members(&db_pool, &caller, project_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn join_requests(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<JoinRequest>>> {
    Ok(Json(engine::requests(&db_pool, &caller, project_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn ask_to_join(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(project_id): Path<Uuid>,
    Json(JoinQuery { message }): Json<JoinQuery>,
) -> AppResult<(StatusCode, Json<JoinRequest>)> {
    let request = engine::open(&db_pool, &caller, project_id, &message).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn looking_for(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(project_id): Path<Uuid>,
    Json(LookingForQuery { looking_for }): Json<LookingForQuery>,
) -> AppResult<Json<Project>> {
    Ok(Json(
        engine::set_looking_for(&db_pool, &caller, project_id, looking_for).await?,
    ))
}

#[debug_handler(state = AppState)]
pub(crate) async fn status(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(project_id): Path<Uuid>,
    Json(StatusQuery { status }): Json<StatusQuery>,
) -> AppResult<Json<Project>> {
    Ok(Json(engine::set_status(&db_pool, &caller, project_id, status).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn approve_request(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<JoinRequest>> {
    Ok(Json(engine::approve(&db_pool, &caller, request_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn reject_request(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<JoinRequest>> {
    Ok(Json(engine::reject(&db_pool, &caller, request_id).await?))
}
