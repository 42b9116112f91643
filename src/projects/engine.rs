//! Projects and the join-request workflow.
//!
//! A join request goes PENDING → APPROVED or PENDING → REJECTED and stays there. Approval is one
//! transaction covering both the status change and the new membership row, so a request is never
//! approved without its requester ending up on the roster.
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool, types::Json};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    AppError, AppResult, communities,
    error::is_unique_violation,
    gate::Caller,
    models::{JoinRequest, JoinStatus, MemberRole, Project, ProjectMember, ProjectStatus},
};

pub(crate) const COLUMNS: &str = "id, title, summary, status, owner_id, community_slug, tech_stack, looking_for, \
    featured, flagged, flagged_note, archived, created_at, updated_at";

const REQUEST_COLUMNS: &str = "id, project_id, requester_id, message, status, created_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default = "default_status")]
    pub status: ProjectStatus,
    pub community_slug: Option<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    pub looking_for: Option<String>,
}

fn default_status() -> ProjectStatus {
    ProjectStatus::Incubation
}

/// Blank recruitment text means "not recruiting".
fn normalize_looking_for(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty())
}

pub async fn get(db_pool: &SqlitePool, project_id: Uuid) -> AppResult<Option<Project>> {
    let project = sqlx::query_as(&format!("SELECT {COLUMNS} FROM projects WHERE id = ?"))
        .bind(project_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(project)
}

/// The project, if the caller owns it.
async fn owned(db_pool: &SqlitePool, caller: &Caller, project_id: Uuid) -> AppResult<Project> {
    let me = caller.member()?;
    let project = get(db_pool, project_id)
        .await?
        .ok_or(AppError::NotFound("project"))?;
    if project.owner_id != me {
        return Err(AppError::Forbidden);
    }
    Ok(project)
}

pub async fn create(db_pool: &SqlitePool, caller: &Caller, new: NewProject) -> AppResult<Project> {
    let owner = caller.member()?;
    let title = new.title.trim();
    if title.is_empty() {
        return Err(AppError::invalid("a project needs a title"));
    }
    communities::ensure_known(db_pool, new.community_slug.as_deref()).await?;

    let tech_stack: Vec<String> = new
        .tech_stack
        .iter()
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .collect();
    let now = OffsetDateTime::now_utc();

    let mut tx = db_pool.begin().await?;
    let project: Project = sqlx::query_as(&format!(
        "INSERT INTO projects (id, title, summary, status, owner_id, community_slug, tech_stack, looking_for, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING {COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(title)
    .bind(new.summary.trim())
    .bind(new.status)
    .bind(owner)
    .bind(new.community_slug)
    .bind(Json(tech_stack))
    .bind(normalize_looking_for(new.looking_for))
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    add_member(&mut tx, project.id, owner, MemberRole::Owner).await?;
    tx.commit().await?;

    tracing::info!(project = %project.id, %owner, "project created");
    Ok(project)
}

async fn add_member(
    conn: &mut SqliteConnection,
    project_id: Uuid,
    user_id: Uuid,
    role: MemberRole,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO project_members (project_id, user_id, role, created_at) VALUES (?, ?, ?, ?)
         ON CONFLICT (project_id, user_id) DO NOTHING",
    )
    .bind(project_id)
    .bind(user_id)
    .bind(role)
    .bind(OffsetDateTime::now_utc())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn is_member(db_pool: &SqlitePool, project_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    let member = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM project_members WHERE project_id = ? AND user_id = ?)",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_one(db_pool)
    .await?;
    Ok(member)
}

pub async fn members(db_pool: &SqlitePool, caller: &Caller, project_id: Uuid) -> AppResult<Vec<ProjectMember>> {
    caller.member()?;
    if get(db_pool, project_id).await?.is_none() {
        return Err(AppError::NotFound("project"));
    }
    let members = sqlx::query_as(
        "SELECT project_id, user_id, role FROM project_members
         WHERE project_id = ?
         ORDER BY role = 'member', created_at",
    )
    .bind(project_id)
    .fetch_all(db_pool)
    .await?;
    Ok(members)
}

/// Ask to join a project that is looking for collaborators.
pub async fn open(
    db_pool: &SqlitePool,
    caller: &Caller,
    project_id: Uuid,
    message: &str,
) -> AppResult<JoinRequest> {
    let me = caller.member()?;
    let project = get(db_pool, project_id)
        .await?
        .ok_or(AppError::NotFound("project"))?;

    if project.owner_id == me {
        return Err(AppError::invalid("you can't ask to join your own project"));
    }
    if !project.is_recruiting() {
        return Err(AppError::conflict("this project isn't looking for collaborators"));
    }
    if is_member(db_pool, project_id, me).await? {
        return Err(AppError::conflict("you are already a member of this project"));
    }

    let inserted = sqlx::query_as(&format!(
        "INSERT INTO join_requests (id, project_id, requester_id, message, status, created_at)
         VALUES (?, ?, ?, ?, 'PENDING', ?)
         RETURNING {REQUEST_COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(project_id)
    .bind(me)
    .bind(message.trim())
    .bind(OffsetDateTime::now_utc())
    .fetch_one(db_pool)
    .await;

    match inserted {
        Ok(request) => {
            tracing::info!(project = %project_id, requester = %me, "join request opened");
            Ok(request)
        }
        Err(e) if is_unique_violation(&e) => {
            Err(AppError::conflict("you already asked to join this project"))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn get_request(db_pool: &SqlitePool, request_id: Uuid) -> AppResult<Option<JoinRequest>> {
    let request = sqlx::query_as(&format!("SELECT {REQUEST_COLUMNS} FROM join_requests WHERE id = ?"))
        .bind(request_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(request)
}

/// A join request on a project the caller owns.
async fn owned_request(db_pool: &SqlitePool, caller: &Caller, request_id: Uuid) -> AppResult<JoinRequest> {
    let request = get_request(db_pool, request_id)
        .await?
        .ok_or(AppError::NotFound("join request"))?;
    owned(db_pool, caller, request.project_id).await?;
    Ok(request)
}

/// Approve a pending request and add its requester to the roster, atomically.
pub async fn approve(db_pool: &SqlitePool, caller: &Caller, request_id: Uuid) -> AppResult<JoinRequest> {
    let request = owned_request(db_pool, caller, request_id).await?;
    match request.status {
        JoinStatus::Approved => return Ok(request),
        JoinStatus::Rejected => return Err(AppError::conflict("this request was already rejected")),
        JoinStatus::Pending => {}
    }

    let mut tx = db_pool.begin().await?;
    let approved: Option<JoinRequest> = sqlx::query_as(&format!(
        "UPDATE join_requests SET status = 'APPROVED'
         WHERE id = ? AND status = 'PENDING'
         RETURNING {REQUEST_COLUMNS}"
    ))
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(approved) = approved else {
        return Err(AppError::conflict("this request was already handled"));
    };

    // Dropping `tx` on error rolls the status change back.
    add_member(&mut tx, approved.project_id, approved.requester_id, MemberRole::Member).await?;
    tx.commit().await?;

    tracing::info!(
        project = %approved.project_id,
        requester = %approved.requester_id,
        "join request approved"
    );
    Ok(approved)
}

pub async fn reject(db_pool: &SqlitePool, caller: &Caller, request_id: Uuid) -> AppResult<JoinRequest> {
    let request = owned_request(db_pool, caller, request_id).await?;
    match request.status {
        JoinStatus::Rejected => return Ok(request),
        JoinStatus::Approved => return Err(AppError::conflict("this request was already approved")),
        JoinStatus::Pending => {}
    }

    let rejected: Option<JoinRequest> = sqlx::query_as(&format!(
        "UPDATE join_requests SET status = 'REJECTED'
         WHERE id = ? AND status = 'PENDING'
         RETURNING {REQUEST_COLUMNS}"
    ))
    .bind(request_id)
    .fetch_optional(db_pool)
    .await?;

    let rejected = rejected.ok_or_else(|| AppError::conflict("this request was already handled"))?;
    tracing::info!(project = %rejected.project_id, requester = %rejected.requester_id, "join request rejected");
    Ok(rejected)
}

/// Requests on a project, newest first. Owner only.
pub async fn requests(db_pool: &SqlitePool, caller: &Caller, project_id: Uuid) -> AppResult<Vec<JoinRequest>> {
    owned(db_pool, caller, project_id).await?;
    let requests = sqlx::query_as(&format!(
        "SELECT {REQUEST_COLUMNS} FROM join_requests WHERE project_id = ? ORDER BY created_at DESC"
    ))
    .bind(project_id)
    .fetch_all(db_pool)
    .await?;
    Ok(requests)
}

/// Open (`Some`) or close (`None`) recruitment.
pub async fn set_looking_for(
    db_pool: &SqlitePool,
    caller: &Caller,
    project_id: Uuid,
    looking_for: Option<String>,
) -> AppResult<Project> {
    owned(db_pool, caller, project_id).await?;
    update(db_pool, project_id, "looking_for", normalize_looking_for(looking_for)).await
}

pub async fn set_status(
    db_pool: &SqlitePool,
    caller: &Caller,
    project_id: Uuid,
    status: ProjectStatus,
) -> AppResult<Project> {
    owned(db_pool, caller, project_id).await?;
    update(db_pool, project_id, "status", status).await
}

/// Single-column update. Last write wins.
pub(crate) async fn update<T>(
    db_pool: &SqlitePool,
    project_id: Uuid,
    column: &'static str,
    value: T,
) -> AppResult<Project>
where
    T: for<'q> sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite> + Send + 'static,
{
    let project = sqlx::query_as(&format!(
        "UPDATE projects SET {column} = ?, updated_at = ? WHERE id = ? RETURNING {COLUMNS}"
    ))
    .bind(value)
    .bind(OffsetDateTime::now_utc())
    .bind(project_id)
    .fetch_optional(db_pool)
    .await?;
    project.ok_or(AppError::NotFound("project"))
}
