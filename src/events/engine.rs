use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    AppError, AppResult, communities,
    gate::Caller,
    models::{Event, EventStatus},
    roles::RoleResolver,
};

const COLUMNS: &str = "id, title, start_at, end_at, status, allow_rsvp, archived, is_featured, \
    community_slug, created_by, created_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_at: Option<OffsetDateTime>,
    #[serde(default = "yes")]
    pub allow_rsvp: bool,
    pub community_slug: Option<String>,
}

fn yes() -> bool {
    true
}

/// RSVP-only count next to the count of everyone attending by either route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Attendance {
    pub rsvps: i64,
    pub participants: i64,
    pub attendees: i64,
}

pub async fn get(db_pool: &SqlitePool, event_id: Uuid) -> AppResult<Option<Event>> {
    let event = sqlx::query_as(&format!("SELECT {COLUMNS} FROM events WHERE id = ?"))
        .bind(event_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(event)
}

/// Host a new event. Only secretaries, joint secretaries and admins may.
pub async fn create(
    db_pool: &SqlitePool,
    roles: &RoleResolver,
    caller: &Caller,
    new: NewEvent,
) -> AppResult<Event> {
    let host = caller.member()?;
    if !roles.can_host_events(db_pool, host).await {
        return Err(AppError::Forbidden);
    }

    let title = new.title.trim();
    if title.is_empty() {
        return Err(AppError::invalid("an event needs a title"));
    }
    if new.end_at.is_some_and(|end_at| end_at < new.start_at) {
        return Err(AppError::invalid("an event can't end before it starts"));
    }
    communities::ensure_known(db_pool, new.community_slug.as_deref()).await?;

    let now = OffsetDateTime::now_utc();
    let event: Event = sqlx::query_as(&format!(
        "INSERT INTO events (id, title, start_at, end_at, status, allow_rsvp, community_slug, created_by, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING {COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(title)
    .bind(new.start_at)
    .bind(new.end_at)
    .bind(EventStatus::at(new.start_at, new.end_at, now))
    .bind(new.allow_rsvp)
    .bind(new.community_slug)
    .bind(host)
    .bind(now)
    .fetch_one(db_pool)
    .await?;

    tracing::info!(event = %event.id, %host, "event created");
    Ok(event)
}

/// The event, if it currently takes RSVPs.
async fn open_for_rsvp(db_pool: &SqlitePool, event_id: Uuid) -> AppResult<Event> {
    let event = get(db_pool, event_id)
        .await?
        .ok_or(AppError::NotFound("event"))?;
    if !event.allow_rsvp || event.archived {
        return Err(AppError::conflict("RSVPs are closed for this event"));
    }
    Ok(event)
}

/// RSVP the caller. Doing it twice is harmless.
pub async fn rsvp(db_pool: &SqlitePool, caller: &Caller, event_id: Uuid) -> AppResult<()> {
    let me = caller.member()?;
    open_for_rsvp(db_pool, event_id).await?;

    sqlx::query(
        "INSERT INTO event_rsvps (event_id, user_id, created_at) VALUES (?, ?, ?)
         ON CONFLICT (event_id, user_id) DO NOTHING",
    )
    .bind(event_id)
    .bind(me)
    .bind(OffsetDateTime::now_utc())
    .execute(db_pool)
    .await?;
    Ok(())
}

pub async fn cancel_rsvp(db_pool: &SqlitePool, caller: &Caller, event_id: Uuid) -> AppResult<()> {
    let me = caller.member()?;
    open_for_rsvp(db_pool, event_id).await?;

    sqlx::query("DELETE FROM event_rsvps WHERE event_id = ? AND user_id = ?")
        .bind(event_id)
        .bind(me)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn has_rsvp(db_pool: &SqlitePool, event_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    let found = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM event_rsvps WHERE event_id = ? AND user_id = ?)",
    )
    .bind(event_id)
    .bind(user_id)
    .fetch_one(db_pool)
    .await?;
    Ok(found)
}

pub async fn attendance(db_pool: &SqlitePool, event_id: Uuid) -> AppResult<Attendance> {
    let (rsvps, participants, attendees) = sqlx::query_as(
        "SELECT
            (SELECT count(*) FROM event_rsvps WHERE event_id = ?1),
            (SELECT count(*) FROM event_participants WHERE event_id = ?1),
            (SELECT count(*) FROM (
                SELECT user_id FROM event_rsvps WHERE event_id = ?1
                UNION
                SELECT user_id FROM event_participants WHERE event_id = ?1
            ))",
    )
    .bind(event_id)
    .fetch_one(db_pool)
    .await?;

    Ok(Attendance {
        rsvps,
        participants,
        attendees,
    })
}

#[derive(FromRow)]
struct Schedule {
    id: Uuid,
    start_at: OffsetDateTime,
    end_at: Option<OffsetDateTime>,
    status: EventStatus,
}

/// Bring every unfinished event's status in line with `now`. Returns how many changed.
pub async fn refresh_statuses(db_pool: &SqlitePool, now: OffsetDateTime) -> AppResult<u64> {
    let schedules: Vec<Schedule> =
        sqlx::query_as("SELECT id, start_at, end_at, status FROM events WHERE status <> 'PAST'")
            .fetch_all(db_pool)
            .await?;

    let mut changed = 0;
    for schedule in schedules {
        let status = EventStatus::at(schedule.start_at, schedule.end_at, now);
        if status == schedule.status {
            continue;
        }
        changed += sqlx::query("UPDATE events SET status = ? WHERE id = ? AND status = ?")
            .bind(status)
            .bind(schedule.id)
            .bind(schedule.status)
            .execute(db_pool)
            .await?
            .rows_affected();
    }

    if changed > 0 {
        tracing::debug!(changed, "event statuses refreshed");
    }
    Ok(changed)
}

/// Single-column update. Last write wins.
pub(crate) async fn update<T>(
    db_pool: &SqlitePool,
    event_id: Uuid,
    column: &'static str,
    value: T,
) -> AppResult<Event>
where
    T: for<'q> sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite> + Send + 'static,
{
    let event = sqlx::query_as(&format!(
        "UPDATE events SET {column} = ? WHERE id = ? RETURNING {COLUMNS}"
    ))
    .bind(value)
    .bind(event_id)
    .fetch_optional(db_pool)
    .await?;
    event.ok_or(AppError::NotFound("event"))
}
