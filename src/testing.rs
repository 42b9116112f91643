//! Fixtures for tests: members, admins and hosts on a temporary database.
use std::collections::HashMap;

use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::{
    MemoryStore, SessionStore,
    session::{Id, Record},
};
use uuid::Uuid;

use crate::{
    gate::{self, Caller},
    models::{ApprovalStatus, Role},
    session::USER_ID,
};

/// Insert a profile with the given approval status and return its id.
pub async fn profile(db_pool: &SqlitePool, status: ApprovalStatus) -> Uuid {
    let id = Uuid::now_v7();
    let now = OffsetDateTime::now_utc();
    sqlx::query(
        "INSERT INTO profiles (id, name, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(format!("member {}", id.simple()))
    .bind(status)
    .bind(now)
    .bind(now)
    .execute(db_pool)
    .await
    .expect("profile inserted");
    id
}

pub async fn grant(db_pool: &SqlitePool, user_id: Uuid, role: Role) {
    sqlx::query(
        "INSERT INTO role_assignments (id, user_id, role, community_slug, created_at) VALUES (?, ?, ?, NULL, ?)",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(role)
    .bind(OffsetDateTime::now_utc())
    .execute(db_pool)
    .await
    .expect("role granted");
}

pub async fn caller(db_pool: &SqlitePool, user_id: Uuid) -> Caller {
    gate::resolve(db_pool, user_id).await.expect("caller resolved")
}

/// An approved member without elevated roles.
pub async fn member(db_pool: &SqlitePool) -> Caller {
    let user = profile(db_pool, ApprovalStatus::Approved).await;
    caller(db_pool, user).await
}

/// A signed-in user still waiting for approval.
pub async fn pending(db_pool: &SqlitePool) -> Caller {
    let user = profile(db_pool, ApprovalStatus::Pending).await;
    caller(db_pool, user).await
}

pub async fn admin(db_pool: &SqlitePool) -> Caller {
    let user = profile(db_pool, ApprovalStatus::Approved).await;
    grant(db_pool, user, Role::Admin).await;
    caller(db_pool, user).await
}

pub async fn host(db_pool: &SqlitePool) -> Caller {
    let user = profile(db_pool, ApprovalStatus::Approved).await;
    grant(db_pool, user, Role::Secretary).await;
    caller(db_pool, user).await
}

/// Store a signed-in session for `user_id`, the way the identity provider leaves it, and return
/// the matching `Cookie` header value.
pub async fn session_cookie(store: &MemoryStore, user_id: Uuid) -> String {
    let mut record = Record {
        id: Id::default(),
        data: HashMap::from([(
            USER_ID.to_owned(),
            serde_json::to_value(user_id).expect("uuid serializes"),
        )]),
        expiry_date: OffsetDateTime::now_utc() + time::Duration::hours(1),
    };
    store.create(&mut record).await.expect("session stored");
    format!("id={}", record.id)
}
