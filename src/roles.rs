//! Role resolution.
//!
//! Roles come from two places: the `role_assignments` table, and the older single `profiles.role`
//! column that predates it. [`RoleResolver`] consults them in that order. The legacy source can be
//! switched off once every profile role has been migrated to an assignment.
use std::collections::BTreeSet;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppResult, models::Role};

pub async fn is_admin(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<bool> {
    let admin: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM role_assignments WHERE user_id = ? AND role = 'admin')",
    )
    .bind(user_id)
    .fetch_one(db_pool)
    .await?;
    Ok(admin)
}

/// Union of every role assigned to the user, in any community.
pub async fn assigned_roles(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<BTreeSet<Role>> {
    let roles: Vec<Role> = sqlx::query_scalar("SELECT role FROM role_assignments WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(db_pool)
        .await?;
    Ok(roles.into_iter().collect())
}

/// One place roles can be read from.
pub trait RoleSource {
    fn name(&self) -> &'static str;

    fn roles(&self, db_pool: &SqlitePool, user_id: Uuid) -> impl Future<Output = AppResult<BTreeSet<Role>>> + Send;
}

pub struct Assignments;

impl RoleSource for Assignments {
    fn name(&self) -> &'static str {
        "role_assignments"
    }

    async fn roles(&self, db_pool: &SqlitePool, user_id: Uuid) -> AppResult<BTreeSet<Role>> {
        assigned_roles(db_pool, user_id).await
    }
}

pub struct LegacyProfileRole;

impl RoleSource for LegacyProfileRole {
    fn name(&self) -> &'static str {
        "profiles.role"
    }

    async fn roles(&self, db_pool: &SqlitePool, user_id: Uuid) -> AppResult<BTreeSet<Role>> {
        let role: Option<Option<String>> = sqlx::query_scalar("SELECT role FROM profiles WHERE id = ?")
            .bind(user_id)
            .fetch_optional(db_pool)
            .await?;

        Ok(role
            .flatten()
            .as_deref()
            .and_then(Role::parse_legacy)
            .into_iter()
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RoleResolver {
    pub legacy_fallback: bool,
}

impl Default for RoleResolver {
    fn default() -> Self {
        Self { legacy_fallback: true }
    }
}

impl RoleResolver {
    pub fn new(legacy_fallback: bool) -> Self {
        Self { legacy_fallback }
    }

    /// Whether the user may host events. Read failures count as "no".
    pub async fn can_host_events(&self, db_pool: &SqlitePool, user_id: Uuid) -> bool {
        if hosts_via(&Assignments, db_pool, user_id).await {
            return true;
        }
        self.legacy_fallback && hosts_via(&LegacyProfileRole, db_pool, user_id).await
    }

    /// Every role the user holds, across both sources.
    pub async fn roles(&self, db_pool: &SqlitePool, user_id: Uuid) -> AppResult<BTreeSet<Role>> {
        let mut roles = Assignments.roles(db_pool, user_id).await?;
        if self.legacy_fallback {
            roles.extend(LegacyProfileRole.roles(db_pool, user_id).await?);
        }
        Ok(roles)
    }
}

async fn hosts_via(source: &impl RoleSource, db_pool: &SqlitePool, user_id: Uuid) -> bool {
    match source.roles(db_pool, user_id).await {
        Ok(roles) => roles.iter().any(Role::can_host),
        Err(e) => {
            tracing::warn!(source = source.name(), %user_id, error = %e, "role lookup failed");
            false
        }
    }
}
