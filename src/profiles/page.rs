use axum::{Json, debug_handler, extract::{Path, State}, http::StatusCode};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppError, AppResult, AppState, gate::Caller, models::Profile};

use super::engine::{self, ProfileCard, ProfileFields};

#[debug_handler(state = AppState)]
pub(crate) async fn me(State(db_pool): State<SqlitePool>, caller: Caller) -> AppResult<Json<Profile>> {
    let profile = engine::get(&db_pool, caller.user_id)
        .await?
        .ok_or(AppError::NotFound("profile"))?;
    Ok(Json(profile))
}

#[debug_handler(state = AppState)]
pub(crate) async fn edit_me(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Json(fields): Json<ProfileFields>,
) -> AppResult<Json<Profile>> {
    Ok(Json(engine::edit(&db_pool, &caller, fields).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn password_changed(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
) -> AppResult<Json<Profile>> {
    Ok(Json(engine::password_changed(&db_pool, &caller).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn register(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Json(fields): Json<ProfileFields>,
) -> AppResult<(StatusCode, Json<Profile>)> {
    let profile = engine::register(&db_pool, &caller, fields).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn profile(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ProfileCard>> {
    Ok(Json(engine::card(&db_pool, &caller, user_id).await?))
}
