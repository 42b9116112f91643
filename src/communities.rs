use axum::{Json, Router, debug_handler, extract::State, routing::get};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::{AppError, AppResult, AppState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Community {
    pub slug: String,
    pub name: String,
}

pub async fn list(db_pool: &SqlitePool) -> AppResult<Vec<Community>> {
    let communities = sqlx::query_as("SELECT slug, name FROM communities ORDER BY name")
        .fetch_all(db_pool)
        .await?;
    Ok(communities)
}

/// `None` is always fine: it means unaffiliated.
pub async fn ensure_known(db_pool: &SqlitePool, slug: Option<&str>) -> AppResult<()> {
    let Some(slug) = slug else {
        return Ok(());
    };
    let known: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM communities WHERE slug = ?)")
        .bind(slug)
        .fetch_one(db_pool)
        .await?;
    if known {
        Ok(())
    } else {
        Err(AppError::invalid(format!("unknown community {slug:?}")))
    }
}

pub async fn insert(db_pool: &SqlitePool, community: &Community) -> AppResult<()> {
    let slug = community.slug.trim();
    if slug.is_empty() || community.name.trim().is_empty() {
        return Err(AppError::invalid("a community needs a slug and a name"));
    }
    sqlx::query("INSERT INTO communities (slug, name) VALUES (?, ?)")
        .bind(slug)
        .bind(community.name.trim())
        .execute(db_pool)
        .await
        .map_err(|e| match AppError::from(e) {
            e if e.is_unique_violation() => AppError::conflict("that community already exists"),
            e => e,
        })?;
    Ok(())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(communities))
}

#[debug_handler(state = AppState)]
async fn communities(State(db_pool): State<SqlitePool>) -> AppResult<Json<Vec<Community>>> {
    Ok(Json(list(&db_pool).await?))
}
