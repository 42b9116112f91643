//! Admin-only moderation of projects, events, profiles and roles.
//!
//! Every operation here checks [`Caller::admin`] before it touches the store. Approval alone never
//! passes. Profile status and role changes are pushed to live sessions through the [`SessionHub`].
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    AppError, AppResult,
    communities::{self, Community},
    error::is_unique_violation,
    events,
    gate::Caller,
    models::{ApprovalStatus, Event, Profile, Project, Role, RoleAssignment},
    profiles, projects,
    session::SessionHub,
};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Participant {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub added_by: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAssignment {
    pub user_id: Uuid,
    pub role: Role,
    pub community_slug: Option<String>,
}

pub async fn feature_project(db_pool: &SqlitePool, caller: &Caller, project_id: Uuid, on: bool) -> AppResult<Project> {
    caller.admin()?;
    projects::update(db_pool, project_id, "featured", on).await
}

pub async fn archive_project(db_pool: &SqlitePool, caller: &Caller, project_id: Uuid, on: bool) -> AppResult<Project> {
    caller.admin()?;
    projects::update(db_pool, project_id, "archived", on).await
}

/// Raising a flag needs a note saying why; lowering it drops the note.
pub async fn flag_project(
    db_pool: &SqlitePool,
    caller: &Caller,
    project_id: Uuid,
    flagged: bool,
    note: Option<&str>,
) -> AppResult<Project> {
    caller.admin()?;
    let note = flag_note(flagged, note)?;

    let project = sqlx::query_as(&format!(
        "UPDATE projects SET flagged = ?, flagged_note = ?, updated_at = ? WHERE id = ?
         RETURNING {}",
        projects::COLUMNS
    ))
    .bind(flagged)
    .bind(note)
    .bind(OffsetDateTime::now_utc())
    .bind(project_id)
    .fetch_optional(db_pool)
    .await?;
    project.ok_or(AppError::NotFound("project"))
}

fn flag_note(flagged: bool, note: Option<&str>) -> AppResult<Option<String>> {
    match note.map(str::trim).filter(|n| !n.is_empty()) {
        Some(note) if flagged => Ok(Some(note.to_owned())),
        None if flagged => Err(AppError::invalid("a flag needs a note")),
        _ => Ok(None),
    }
}

/// One moderation action applied to many projects at once.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BulkAction {
    Feature { on: bool },
    Archive { on: bool },
    Flag { flagged: bool, note: Option<String> },
    Delete,
}

/// Apply `action` to every project in `ids` in a single statement. Unknown ids are skipped;
/// returns how many projects were touched.
pub async fn bulk_projects(
    db_pool: &SqlitePool,
    caller: &Caller,
    ids: &[Uuid],
    action: BulkAction,
) -> AppResult<u64> {
    let admin = caller.admin()?;
    if ids.is_empty() {
        return Err(AppError::invalid("pick at least one project"));
    }

    let now = OffsetDateTime::now_utc();
    let mut query = QueryBuilder::<Sqlite>::new("");
    match &action {
        BulkAction::Delete => {
            query.push("DELETE FROM projects");
        }
        BulkAction::Feature { on } => {
            query.push("UPDATE projects SET featured = ").push_bind(*on);
        }
        BulkAction::Archive { on } => {
            query.push("UPDATE projects SET archived = ").push_bind(*on);
        }
        BulkAction::Flag { flagged, note } => {
            let note = flag_note(*flagged, note.as_deref())?;
            query
                .push("UPDATE projects SET flagged = ")
                .push_bind(*flagged)
                .push(", flagged_note = ")
                .push_bind(note);
        }
    }
    if !matches!(action, BulkAction::Delete) {
        query.push(", updated_at = ").push_bind(now);
    }

    query.push(" WHERE id IN (");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let touched = query.build().execute(db_pool).await?.rows_affected();
    tracing::info!(?action, touched, %admin, "bulk project moderation");
    Ok(touched)
}

/// Hard delete. Members and join requests go with it.
pub async fn delete_project(db_pool: &SqlitePool, caller: &Caller, project_id: Uuid) -> AppResult<()> {
    let admin = caller.admin()?;
    let deleted = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(project_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(AppError::NotFound("project"));
    }
    tracing::info!(project = %project_id, %admin, "project deleted");
    Ok(())
}

pub async fn feature_event(db_pool: &SqlitePool, caller: &Caller, event_id: Uuid, on: bool) -> AppResult<Event> {
    caller.admin()?;
    events::update(db_pool, event_id, "is_featured", on).await
}

pub async fn archive_event(db_pool: &SqlitePool, caller: &Caller, event_id: Uuid, on: bool) -> AppResult<Event> {
    caller.admin()?;
    events::update(db_pool, event_id, "archived", on).await
}

pub async fn allow_rsvp(db_pool: &SqlitePool, caller: &Caller, event_id: Uuid, on: bool) -> AppResult<Event> {
    caller.admin()?;
    events::update(db_pool, event_id, "allow_rsvp", on).await
}

/// Hard delete. RSVPs and the participant roster go with it.
pub async fn delete_event(db_pool: &SqlitePool, caller: &Caller, event_id: Uuid) -> AppResult<()> {
    let admin = caller.admin()?;
    let deleted = sqlx::query("DELETE FROM events WHERE id = ?")
        .bind(event_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(AppError::NotFound("event"));
    }
    tracing::info!(event = %event_id, %admin, "event deleted");
    Ok(())
}

pub async fn participants(db_pool: &SqlitePool, caller: &Caller, event_id: Uuid) -> AppResult<Vec<Participant>> {
    caller.admin()?;
    let participants = sqlx::query_as(
        "SELECT p.user_id, pr.name, p.added_by, p.created_at
         FROM event_participants p
         LEFT JOIN profiles pr ON pr.id = p.user_id
         WHERE p.event_id = ?
         ORDER BY p.created_at",
    )
    .bind(event_id)
    .fetch_all(db_pool)
    .await?;
    Ok(participants)
}

pub async fn add_participant(
    db_pool: &SqlitePool,
    caller: &Caller,
    event_id: Uuid,
    user_id: Uuid,
) -> AppResult<()> {
    let admin = caller.admin()?;
    if events::get(db_pool, event_id).await?.is_none() {
        return Err(AppError::NotFound("event"));
    }
    if profiles::get(db_pool, user_id).await?.is_none() {
        return Err(AppError::NotFound("member"));
    }

    sqlx::query(
        "INSERT INTO event_participants (event_id, user_id, added_by, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(event_id)
    .bind(user_id)
    .bind(admin)
    .bind(OffsetDateTime::now_utc())
    .execute(db_pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::conflict("already on the roster")
        } else {
            e.into()
        }
    })?;
    Ok(())
}

pub async fn remove_participant(
    db_pool: &SqlitePool,
    caller: &Caller,
    event_id: Uuid,
    user_id: Uuid,
) -> AppResult<()> {
    caller.admin()?;
    let removed = sqlx::query("DELETE FROM event_participants WHERE event_id = ? AND user_id = ?")
        .bind(event_id)
        .bind(user_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if removed == 0 {
        return Err(AppError::NotFound("participant"));
    }
    Ok(())
}

/// Profiles waiting for a decision, oldest first.
pub async fn pending_profiles(db_pool: &SqlitePool, caller: &Caller) -> AppResult<Vec<Profile>> {
    caller.admin()?;
    let profiles = sqlx::query_as(&format!(
        "SELECT {} FROM profiles WHERE status = ? ORDER BY created_at",
        profiles::COLUMNS
    ))
    .bind(ApprovalStatus::Pending)
    .fetch_all(db_pool)
    .await?;
    Ok(profiles)
}

pub async fn set_approval(
    db_pool: &SqlitePool,
    hub: &SessionHub,
    caller: &Caller,
    user_id: Uuid,
    status: ApprovalStatus,
) -> AppResult<Profile> {
    let admin = caller.admin()?;
    let profile: Option<Profile> = sqlx::query_as(&format!(
        "UPDATE profiles SET status = ?, updated_at = ? WHERE id = ? RETURNING {}",
        profiles::COLUMNS
    ))
    .bind(status)
    .bind(OffsetDateTime::now_utc())
    .bind(user_id)
    .fetch_optional(db_pool)
    .await?;
    let profile = profile.ok_or(AppError::NotFound("profile"))?;

    tracing::info!(user = %user_id, ?status, %admin, "approval changed");
    hub.refresh(db_pool, user_id).await?;
    Ok(profile)
}

pub async fn assign_role(
    db_pool: &SqlitePool,
    hub: &SessionHub,
    caller: &Caller,
    assignment: NewAssignment,
) -> AppResult<RoleAssignment> {
    let admin = caller.admin()?;
    communities::ensure_known(db_pool, assignment.community_slug.as_deref()).await?;

    let assigned: RoleAssignment = sqlx::query_as(
        "INSERT INTO role_assignments (id, user_id, role, community_slug, created_at)
         VALUES (?, ?, ?, ?, ?)
         RETURNING id, user_id, role, community_slug, created_at",
    )
    .bind(Uuid::now_v7())
    .bind(assignment.user_id)
    .bind(assignment.role)
    .bind(assignment.community_slug)
    .bind(OffsetDateTime::now_utc())
    .fetch_one(db_pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::conflict("that role is already assigned")
        } else {
            e.into()
        }
    })?;

    tracing::info!(user = %assigned.user_id, role = assigned.role.as_str(), %admin, "role assigned");
    hub.refresh(db_pool, assigned.user_id).await?;
    Ok(assigned)
}

pub async fn revoke_role(
    db_pool: &SqlitePool,
    hub: &SessionHub,
    caller: &Caller,
    assignment_id: Uuid,
) -> AppResult<()> {
    let admin = caller.admin()?;
    let user_id: Option<Uuid> =
        sqlx::query_scalar("DELETE FROM role_assignments WHERE id = ? RETURNING user_id")
            .bind(assignment_id)
            .fetch_optional(db_pool)
            .await?;
    let user_id = user_id.ok_or(AppError::NotFound("role assignment"))?;

    tracing::info!(user = %user_id, %admin, "role revoked");
    hub.refresh(db_pool, user_id).await?;
    Ok(())
}

pub async fn add_community(db_pool: &SqlitePool, caller: &Caller, community: Community) -> AppResult<Community> {
    caller.admin()?;
    communities::insert(db_pool, &community).await?;
    Ok(community)
}
