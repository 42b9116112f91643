//! The tech buddy state machine.
//!
//! ```text
//!            send                 accept
//!   NONE ─────────────▶ PENDING ─────────▶ ACCEPTED
//!    ▲                   │  │                 │
//!    │      cancel       │  │ reject          │ remove
//!    ├───────────────────┘  ▼                 │
//!    │                   REJECTED             │
//!    │                      │ send (reopen)   │
//!    │                      ▼                 │
//!    │                   PENDING              │
//!    └────────────────────────────────────────┘
//! ```
//!
//! A pair of users shares at most one row, whichever of them asked first. The store enforces this
//! with a unique index over the normalized pair, so two people requesting each other at the same
//! moment end up with one request and one conflict.
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    AppError, AppResult,
    error::is_unique_violation,
    gate::Caller,
    models::{BuddyRelation, BuddyStatus},
};

const COLUMNS: &str = "id, requester_id, recipient_id, status, created_at, updated_at";

/// A relation as seen from one side of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationState {
    None,
    PendingOutgoing,
    PendingIncoming,
    Accepted,
    Rejected,
    Blocked,
}

impl RelationState {
    pub fn of(relation: Option<&BuddyRelation>, me: Uuid) -> Self {
        let Some(relation) = relation else {
            return RelationState::None;
        };
        match relation.status {
            BuddyStatus::Pending if relation.requester_id == me => RelationState::PendingOutgoing,
            BuddyStatus::Pending => RelationState::PendingIncoming,
            BuddyStatus::Accepted => RelationState::Accepted,
            BuddyStatus::Rejected => RelationState::Rejected,
            BuddyStatus::Blocked => RelationState::Blocked,
        }
    }
}

/// The relation between `a` and `b`, no matter who asked.
pub async fn lookup(db_pool: &SqlitePool, a: Uuid, b: Uuid) -> AppResult<Option<BuddyRelation>> {
    let relation = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM tech_buddies
         WHERE (requester_id = ?1 AND recipient_id = ?2)
            OR (requester_id = ?2 AND recipient_id = ?1)"
    ))
    .bind(a)
    .bind(b)
    .fetch_optional(db_pool)
    .await?;
    Ok(relation)
}

pub async fn get(db_pool: &SqlitePool, relation_id: Uuid) -> AppResult<Option<BuddyRelation>> {
    let relation = sqlx::query_as(&format!("SELECT {COLUMNS} FROM tech_buddies WHERE id = ?"))
        .bind(relation_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(relation)
}

pub async fn state(db_pool: &SqlitePool, caller: &Caller, other: Uuid) -> AppResult<RelationState> {
    let me = caller.member()?;
    let relation = lookup(db_pool, me, other).await?;
    Ok(RelationState::of(relation.as_ref(), me))
}

/// Ask `to` to become the caller's buddy.
///
/// A previously rejected relation is reopened in place: it goes back to PENDING with the caller as
/// the new requester, whichever side was rejected before.
pub async fn send_request(db_pool: &SqlitePool, caller: &Caller, to: Uuid) -> AppResult<BuddyRelation> {
    let from = caller.member()?;
    if from == to {
        return Err(AppError::invalid("you can't send a buddy request to yourself"));
    }

    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM profiles WHERE id = ?)")
        .bind(to)
        .fetch_one(db_pool)
        .await?;
    if !exists {
        return Err(AppError::NotFound("member"));
    }

    let now = OffsetDateTime::now_utc();
    match lookup(db_pool, from, to).await? {
        None => {
            let inserted = sqlx::query_as(&format!(
                "INSERT INTO tech_buddies (id, requester_id, recipient_id, status, created_at, updated_at)
                 VALUES (?, ?, ?, 'PENDING', ?, ?)
                 RETURNING {COLUMNS}"
            ))
            .bind(Uuid::now_v7())
            .bind(from)
            .bind(to)
            .bind(now)
            .bind(now)
            .fetch_one(db_pool)
            .await;

            match inserted {
                Ok(relation) => {
                    tracing::info!(%from, %to, "buddy request sent");
                    Ok(relation)
                }
                // Lost the race against the other side asking at the same time.
                Err(e) if is_unique_violation(&e) => {
                    Err(AppError::conflict("a buddy request between you already exists"))
                }
                Err(e) => Err(e.into()),
            }
        }
        Some(relation) if relation.status == BuddyStatus::Rejected => {
            let reopened: Option<BuddyRelation> = sqlx::query_as(&format!(
                "UPDATE tech_buddies
                 SET status = 'PENDING', requester_id = ?, recipient_id = ?, updated_at = ?
                 WHERE id = ? AND status = 'REJECTED'
                 RETURNING {COLUMNS}"
            ))
            .bind(from)
            .bind(to)
            .bind(now)
            .bind(relation.id)
            .fetch_optional(db_pool)
            .await?;

            let relation = reopened
                .ok_or_else(|| AppError::conflict("this request was already handled"))?;
            tracing::info!(%from, %to, "rejected buddy request reopened");
            Ok(relation)
        }
        Some(relation) => Err(AppError::conflict(match relation.status {
            BuddyStatus::Pending => "a buddy request between you is already pending",
            BuddyStatus::Accepted => "you are already buddies",
            _ => "you can't send a buddy request to this member",
        })),
    }
}

/// Move a pending relation addressed to the caller into `to`. A relation already in `to` is
/// returned as is.
async fn answer(
    db_pool: &SqlitePool,
    caller: &Caller,
    relation_id: Uuid,
    to: BuddyStatus,
) -> AppResult<BuddyRelation> {
    let me = caller.member()?;
    let relation = get(db_pool, relation_id)
        .await?
        .ok_or(AppError::NotFound("buddy request"))?;

    if relation.recipient_id != me {
        return Err(AppError::Forbidden);
    }
    if relation.status == to {
        return Ok(relation);
    }
    if relation.status != BuddyStatus::Pending {
        return Err(AppError::conflict("this request was already handled"));
    }

    let updated: Option<BuddyRelation> = sqlx::query_as(&format!(
        "UPDATE tech_buddies SET status = ?, updated_at = ?
         WHERE id = ? AND recipient_id = ? AND status = 'PENDING'
         RETURNING {COLUMNS}"
    ))
    .bind(to)
    .bind(OffsetDateTime::now_utc())
    .bind(relation_id)
    .bind(me)
    .fetch_optional(db_pool)
    .await?;

    match updated {
        Some(relation) => {
            tracing::info!(
                relation = %relation_id,
                from = %relation.other(me),
                status = ?to,
                "buddy request answered"
            );
            Ok(relation)
        }
        // Someone got there first: cancelled, or answered from another tab.
        None => match get(db_pool, relation_id).await? {
            Some(relation) if relation.status == to => Ok(relation),
            Some(_) => Err(AppError::conflict("this request was already handled")),
            None => Err(AppError::NotFound("buddy request")),
        },
    }
}

/// Accept a pending request. Accepting an already accepted relation returns it unchanged.
pub async fn accept(db_pool: &SqlitePool, caller: &Caller, relation_id: Uuid) -> AppResult<BuddyRelation> {
    answer(db_pool, caller, relation_id, BuddyStatus::Accepted).await
}

/// Reject a pending request. The row stays so the pair keeps its one relation.
pub async fn reject(db_pool: &SqlitePool, caller: &Caller, relation_id: Uuid) -> AppResult<BuddyRelation> {
    answer(db_pool, caller, relation_id, BuddyStatus::Rejected).await
}

/// Withdraw the caller's own pending request to `to`.
pub async fn cancel(db_pool: &SqlitePool, caller: &Caller, to: Uuid) -> AppResult<()> {
    let me = caller.member()?;
    let relation = lookup(db_pool, me, to)
        .await?
        .ok_or(AppError::NotFound("buddy request"))?;

    if relation.status != BuddyStatus::Pending {
        return Err(AppError::conflict("only pending requests can be cancelled"));
    }
    if relation.requester_id != me {
        return Err(AppError::Forbidden);
    }

    let deleted = sqlx::query(
        "DELETE FROM tech_buddies WHERE id = ? AND requester_id = ? AND status = 'PENDING'",
    )
    .bind(relation.id)
    .bind(me)
    .execute(db_pool)
    .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::conflict("this request was already handled"));
    }
    tracing::info!(from = %me, %to, "buddy request cancelled");
    Ok(())
}

/// End an accepted relation. Either side may do it.
pub async fn remove(db_pool: &SqlitePool, caller: &Caller, other: Uuid) -> AppResult<()> {
    let me = caller.member()?;
    let relation = lookup(db_pool, me, other)
        .await?
        .ok_or(AppError::NotFound("buddy"))?;

    if relation.status != BuddyStatus::Accepted {
        return Err(AppError::conflict("you are not buddies"));
    }

    let deleted = sqlx::query("DELETE FROM tech_buddies WHERE id = ? AND status = 'ACCEPTED'")
        .bind(relation.id)
        .execute(db_pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::conflict("you are not buddies"));
    }
    tracing::info!(%me, %other, "buddy removed");
    Ok(())
}

pub async fn count_accepted(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<i64> {
    // Two index lookups; a pair never has two rows and never contains the same user twice.
    let count = sqlx::query_scalar(
        "SELECT
            (SELECT count(*) FROM tech_buddies WHERE requester_id = ?1 AND status = 'ACCEPTED')
          + (SELECT count(*) FROM tech_buddies WHERE recipient_id = ?1 AND status = 'ACCEPTED')",
    )
    .bind(user_id)
    .fetch_one(db_pool)
    .await?;
    Ok(count)
}

/// Pending requests waiting for `user_id` to answer.
pub async fn count_incoming(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<i64> {
    let count = sqlx::query_scalar(
        "SELECT count(*) FROM tech_buddies WHERE recipient_id = ? AND status = 'PENDING'",
    )
    .bind(user_id)
    .fetch_one(db_pool)
    .await?;
    Ok(count)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct BuddyEntry {
    pub relation_id: Uuid,
    /// The other party.
    pub user_id: Uuid,
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub community_slug: Option<String>,
    pub status: BuddyStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuddyLists {
    pub accepted: Vec<BuddyEntry>,
    pub incoming: Vec<BuddyEntry>,
    pub outgoing: Vec<BuddyEntry>,
}

pub async fn lists(db_pool: &SqlitePool, caller: &Caller) -> AppResult<BuddyLists> {
    let me = caller.member()?;

    let entries: Vec<(BuddyEntry, Uuid)> = sqlx::query_as::<_, BuddyEntryRow>(
        "SELECT b.id AS relation_id,
                CASE WHEN b.requester_id = ?1 THEN b.recipient_id ELSE b.requester_id END AS user_id,
                p.name, p.specialization, p.community_slug, b.status, b.requester_id
         FROM tech_buddies b
         LEFT JOIN profiles p
           ON p.id = CASE WHEN b.requester_id = ?1 THEN b.recipient_id ELSE b.requester_id END
         WHERE (b.requester_id = ?1 OR b.recipient_id = ?1)
           AND b.status IN ('ACCEPTED', 'PENDING')
         ORDER BY b.updated_at DESC",
    )
    .bind(me)
    .fetch_all(db_pool)
    .await?
    .into_iter()
    .map(|row| (row.entry, row.requester_id))
    .collect();

    let mut lists = BuddyLists::default();
    for (entry, requester_id) in entries {
        match entry.status {
            BuddyStatus::Accepted => lists.accepted.push(entry),
            BuddyStatus::Pending if requester_id == me => lists.outgoing.push(entry),
            BuddyStatus::Pending => lists.incoming.push(entry),
            _ => {}
        }
    }
    Ok(lists)
}

#[derive(FromRow)]
struct BuddyEntryRow {
    #[sqlx(flatten)]
    entry: BuddyEntry,
    requester_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, testing};

    async fn rows_between(db_pool: &SqlitePool, a: Uuid, b: Uuid) -> i64 {
        sqlx::query_scalar(
            "SELECT count(*) FROM tech_buddies
             WHERE (requester_id = ?1 AND recipient_id = ?2) OR (requester_id = ?2 AND recipient_id = ?1)",
        )
        .bind(a)
        .bind(b)
        .fetch_one(db_pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn other_is_the_far_side() {
        let db_pool = db::temporary().await;
        let a = testing::member(&db_pool).await;
        let b = testing::member(&db_pool).await;

        let relation = send_request(&db_pool, &a, b.user_id).await.unwrap();
        assert_eq!(relation.other(a.user_id), b.user_id);
        assert_eq!(relation.other(b.user_id), a.user_id);
    }

    #[tokio::test]
    async fn request_accept_remove() {
        let db_pool = db::temporary().await;
        let a = testing::member(&db_pool).await;
        let b = testing::member(&db_pool).await;

        let relation = send_request(&db_pool, &a, b.user_id).await.unwrap();
        assert_eq!(relation.status, BuddyStatus::Pending);
        assert_eq!(relation.requester_id, a.user_id);
        assert_eq!(state(&db_pool, &a, b.user_id).await.unwrap(), RelationState::PendingOutgoing);
        assert_eq!(state(&db_pool, &b, a.user_id).await.unwrap(), RelationState::PendingIncoming);
        assert_eq!(count_incoming(&db_pool, b.user_id).await.unwrap(), 1);

        let relation = accept(&db_pool, &b, relation.id).await.unwrap();
        assert_eq!(relation.status, BuddyStatus::Accepted);
        assert_eq!(count_accepted(&db_pool, a.user_id).await.unwrap(), 1);
        assert_eq!(count_accepted(&db_pool, b.user_id).await.unwrap(), 1);
        assert_eq!(count_incoming(&db_pool, b.user_id).await.unwrap(), 0);

        remove(&db_pool, &a, b.user_id).await.unwrap();
        assert!(lookup(&db_pool, a.user_id, b.user_id).await.unwrap().is_none());
        assert!(lookup(&db_pool, b.user_id, a.user_id).await.unwrap().is_none());
        assert_eq!(count_accepted(&db_pool, a.user_id).await.unwrap(), 0);
        assert_eq!(count_accepted(&db_pool, b.user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn either_side_may_remove() {
        let db_pool = db::temporary().await;
        let a = testing::member(&db_pool).await;
        let b = testing::member(&db_pool).await;

        let relation = send_request(&db_pool, &a, b.user_id).await.unwrap();
        accept(&db_pool, &b, relation.id).await.unwrap();
        remove(&db_pool, &b, a.user_id).await.unwrap();

        assert_eq!(rows_between(&db_pool, a.user_id, b.user_id).await, 0);
        assert!(matches!(
            remove(&db_pool, &a, b.user_id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn no_self_requests() {
        let db_pool = db::temporary().await;
        let a = testing::member(&db_pool).await;

        assert!(matches!(
            send_request(&db_pool, &a, a.user_id).await,
            Err(AppError::Invalid(_))
        ));
        assert_eq!(count_incoming(&db_pool, a.user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn one_row_per_pair() {
        let db_pool = db::temporary().await;
        let a = testing::member(&db_pool).await;
        let b = testing::member(&db_pool).await;

        send_request(&db_pool, &a, b.user_id).await.unwrap();
        assert!(matches!(
            send_request(&db_pool, &b, a.user_id).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            send_request(&db_pool, &a, b.user_id).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(rows_between(&db_pool, a.user_id, b.user_id).await, 1);
    }

    #[tokio::test]
    async fn store_rejects_reversed_duplicate() {
        let db_pool = db::temporary().await;
        let a = testing::member(&db_pool).await;
        let b = testing::member(&db_pool).await;
        send_request(&db_pool, &a, b.user_id).await.unwrap();

        // Bypass the engine entirely: the index alone must refuse the mirrored row.
        let now = OffsetDateTime::now_utc();
        let err = sqlx::query(
            "INSERT INTO tech_buddies (id, requester_id, recipient_id, status, created_at, updated_at)
             VALUES (?, ?, ?, 'PENDING', ?, ?)",
        )
        .bind(Uuid::now_v7())
        .bind(b.user_id)
        .bind(a.user_id)
        .bind(now)
        .bind(now)
        .execute(&db_pool)
        .await
        .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn simultaneous_requests_leave_one_row() {
        let db_pool = db::temporary().await;
        let a = testing::member(&db_pool).await;
        let b = testing::member(&db_pool).await;

        let (ab, ba) = tokio::join!(
            send_request(&db_pool, &a, b.user_id),
            send_request(&db_pool, &b, a.user_id),
        );

        assert_eq!(ab.is_ok() as u8 + ba.is_ok() as u8, 1);
        let loser = if ab.is_ok() { ba } else { ab };
        assert!(matches!(loser, Err(AppError::Conflict(_))));
        assert_eq!(rows_between(&db_pool, a.user_id, b.user_id).await, 1);
    }

    #[tokio::test]
    async fn accept_twice_is_a_no_op() {
        let db_pool = db::temporary().await;
        let a = testing::member(&db_pool).await;
        let b = testing::member(&db_pool).await;

        let relation = send_request(&db_pool, &a, b.user_id).await.unwrap();
        let first = accept(&db_pool, &b, relation.id).await.unwrap();
        let second = accept(&db_pool, &b, relation.id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(rows_between(&db_pool, a.user_id, b.user_id).await, 1);
    }

    #[tokio::test]
    async fn only_recipient_answers() {
        let db_pool = db::temporary().await;
        let a = testing::member(&db_pool).await;
        let b = testing::member(&db_pool).await;
        let c = testing::member(&db_pool).await;

        let relation = send_request(&db_pool, &a, b.user_id).await.unwrap();
        assert!(matches!(accept(&db_pool, &a, relation.id).await, Err(AppError::Forbidden)));
        assert!(matches!(reject(&db_pool, &c, relation.id).await, Err(AppError::Forbidden)));
        assert_eq!(
            get(&db_pool, relation.id).await.unwrap().unwrap().status,
            BuddyStatus::Pending
        );
    }

    #[tokio::test]
    async fn cancel_only_by_requester() {
        let db_pool = db::temporary().await;
        let a = testing::member(&db_pool).await;
        let b = testing::member(&db_pool).await;

        send_request(&db_pool, &a, b.user_id).await.unwrap();
        assert!(matches!(
            cancel(&db_pool, &b, a.user_id).await,
            Err(AppError::Forbidden)
        ));
        assert_eq!(rows_between(&db_pool, a.user_id, b.user_id).await, 1);

        cancel(&db_pool, &a, b.user_id).await.unwrap();
        assert_eq!(rows_between(&db_pool, a.user_id, b.user_id).await, 0);
    }

    #[tokio::test]
    async fn cancel_after_accept_conflicts() {
        let db_pool = db::temporary().await;
        let a = testing::member(&db_pool).await;
        let b = testing::member(&db_pool).await;

        let relation = send_request(&db_pool, &a, b.user_id).await.unwrap();
        accept(&db_pool, &b, relation.id).await.unwrap();

        assert!(matches!(
            cancel(&db_pool, &a, b.user_id).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(count_accepted(&db_pool, a.user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rejected_request_is_reopened() {
        let db_pool = db::temporary().await;
        let a = testing::member(&db_pool).await;
        let b = testing::member(&db_pool).await;

        let relation = send_request(&db_pool, &a, b.user_id).await.unwrap();
        let rejected = reject(&db_pool, &b, relation.id).await.unwrap();
        assert_eq!(rejected.status, BuddyStatus::Rejected);
        assert_eq!(state(&db_pool, &a, b.user_id).await.unwrap(), RelationState::Rejected);

        let reopened = send_request(&db_pool, &a, b.user_id).await.unwrap();
        assert_eq!(reopened.id, relation.id);
        assert_eq!(reopened.status, BuddyStatus::Pending);
        assert_eq!(reopened.requester_id, a.user_id);
        assert_eq!(rows_between(&db_pool, a.user_id, b.user_id).await, 1);
    }

    #[tokio::test]
    async fn rejecting_side_may_reopen() {
        let db_pool = db::temporary().await;
        let a = testing::member(&db_pool).await;
        let b = testing::member(&db_pool).await;

        let relation = send_request(&db_pool, &a, b.user_id).await.unwrap();
        reject(&db_pool, &b, relation.id).await.unwrap();

        let reopened = send_request(&db_pool, &b, a.user_id).await.unwrap();
        assert_eq!(reopened.requester_id, b.user_id);
        assert_eq!(reopened.recipient_id, a.user_id);
        accept(&db_pool, &a, reopened.id).await.unwrap();
        assert_eq!(count_accepted(&db_pool, b.user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn pending_members_are_gated() {
        let db_pool = db::temporary().await;
        let pending = testing::pending(&db_pool).await;
        let b = testing::member(&db_pool).await;

        assert!(matches!(
            send_request(&db_pool, &pending, b.user_id).await,
            Err(AppError::PendingApproval)
        ));
        assert_eq!(count_incoming(&db_pool, b.user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lists_split_by_direction() {
        let db_pool = db::temporary().await;
        let me = testing::member(&db_pool).await;
        let buddy = testing::member(&db_pool).await;
        let asked_me = testing::member(&db_pool).await;
        let i_asked = testing::member(&db_pool).await;

        let relation = send_request(&db_pool, &buddy, me.user_id).await.unwrap();
        accept(&db_pool, &me, relation.id).await.unwrap();
        send_request(&db_pool, &asked_me, me.user_id).await.unwrap();
        send_request(&db_pool, &me, i_asked.user_id).await.unwrap();

        let lists = lists(&db_pool, &me).await.unwrap();
        let ids = |entries: &[BuddyEntry]| entries.iter().map(|e| e.user_id).collect::<Vec<_>>();
        assert_eq!(ids(&lists.accepted), vec![buddy.user_id]);
        assert_eq!(ids(&lists.incoming), vec![asked_me.user_id]);
        assert_eq!(ids(&lists.outgoing), vec![i_asked.user_id]);
        assert!(lists.accepted[0].name.is_some());
    }

    #[tokio::test]
    async fn count_matches_rows_after_churn() {
        let db_pool = db::temporary().await;
        let hub = testing::member(&db_pool).await;
        let mut others = Vec::new();
        for _ in 0..4 {
            let other = testing::member(&db_pool).await;
            let relation = send_request(&db_pool, &other, hub.user_id).await.unwrap();
            accept(&db_pool, &hub, relation.id).await.unwrap();
            others.push(other);
        }
        remove(&db_pool, &hub, others[1].user_id).await.unwrap();
        remove(&db_pool, &others[3], hub.user_id).await.unwrap();

        let recounted: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM tech_buddies
             WHERE status = 'ACCEPTED' AND (requester_id = ?1 OR recipient_id = ?1)",
        )
        .bind(hub.user_id)
        .fetch_one(&db_pool)
        .await
        .unwrap();
        assert_eq!(count_accepted(&db_pool, hub.user_id).await.unwrap(), recounted);
        assert_eq!(recounted, 2);
    }
}
