use axum::{Json, debug_handler, extract::{Path, State}, http::StatusCode};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    AppError, AppResult, AppState,
    gate::Caller,
    models::Event,
    roles::RoleResolver,
};

use super::engine::{self, Attendance, NewEvent};

#[derive(Serialize)]
pub(crate) struct Attendees {
    #[serde(flatten)]
    attendance: Attendance,
    /// Whether the caller has RSVPed.
    going: bool,
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_event(
    State(db_pool): State<SqlitePool>,
    State(roles): State<RoleResolver>,
    caller: Caller,
    Json(new): Json<NewEvent>,
) -> AppResult<(StatusCode, Json<Event>)> {
    let event = engine::create(&db_pool, &roles, &caller, new).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn event(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
) -> AppResult<Json<Event>> {
    caller.member()?;
    let event = engine::get(&db_pool, event_id)
        .await?
        .ok_or(AppError::NotFound("event"))?;
    Ok(Json(event))
}

#[debug_handler(state = AppState)]
pub(crate) async fn rsvp(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    engine::rsvp(&db_pool, &caller, event_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn cancel_rsvp(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    engine::cancel_rsvp(&db_pool, &caller, event_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
pub(crate) async fn attendees(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
) -> AppResult<Json<Attendees>> {
    let me = caller.member()?;
    if engine::get(&db_pool, event_id).await?.is_none() {
        return Err(AppError::NotFound("event"));
    }
    Ok(Json(Attendees {
        attendance: engine::attendance(&db_pool, event_id).await?,
        going: engine::has_rsvp(&db_pool, event_id, me).await?,
    }))
}
