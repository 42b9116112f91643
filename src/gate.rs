//! Identity & approval gate.
//!
//! Every protected operation asks one question: is the caller approved, or an admin? Admin-only
//! operations ask the narrower one: is the caller an admin? Both are answered from the store on
//! every request, so a revoked approval takes effect on the very next call of a live session.
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::Serialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppError, AppResult, AppState, models::ApprovalStatus, roles, session::USER_ID};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Access {
    pub has_identity: bool,
    pub is_approved: bool,
    pub is_admin: bool,
}

impl Access {
    pub fn allowed(&self) -> bool {
        self.is_admin || self.is_approved
    }
}

/// An identified caller together with what the gate decided about them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub access: Access,
}

impl Caller {
    /// Passes approved members and admins.
    pub fn member(&self) -> AppResult<Uuid> {
        if self.access.allowed() {
            Ok(self.user_id)
        } else {
            Err(AppError::PendingApproval)
        }
    }

    /// Passes admins only. Approval alone is not enough.
    pub fn admin(&self) -> AppResult<Uuid> {
        if self.access.is_admin {
            Ok(self.user_id)
        } else {
            Err(AppError::Forbidden)
        }
    }
}

pub async fn approval_status(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<ApprovalStatus>> {
    let status = sqlx::query_scalar("SELECT status FROM profiles WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(status)
}

pub async fn access_of(db_pool: &SqlitePool, user_id: Option<Uuid>) -> AppResult<Access> {
    let Some(user_id) = user_id else {
        return Ok(Access::default());
    };

    let is_approved = approval_status(db_pool, user_id).await? == Some(ApprovalStatus::Approved);
    let is_admin = roles::is_admin(db_pool, user_id).await?;

    Ok(Access {
        has_identity: true,
        is_approved,
        is_admin,
    })
}

pub async fn resolve(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Caller> {
    Ok(Caller {
        user_id,
        access: access_of(db_pool, Some(user_id)).await?,
    })
}

/// Reads the identity the sign-in flow left in the session.
pub async fn session_user(session: &Session) -> AppResult<Option<Uuid>> {
    Ok(session.get::<Uuid>(USER_ID).await?)
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| {
                tracing::error!(msg, "session layer missing");
                AppError::Unauthenticated
            })?;

        let Some(user_id) = session_user(&session).await? else {
            return Err(AppError::Unauthenticated);
        };

        resolve(&state.db_pool, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, models::Role, testing};

    #[tokio::test]
    async fn anonymous_has_nothing() {
        let db_pool = db::temporary().await;
        let access = access_of(&db_pool, None).await.unwrap();
        assert_eq!(access, Access::default());
        assert!(!access.allowed());
    }

    #[tokio::test]
    async fn missing_profile_is_not_approved() {
        let db_pool = db::temporary().await;
        let caller = resolve(&db_pool, Uuid::now_v7()).await.unwrap();
        assert!(caller.access.has_identity);
        assert!(matches!(caller.member(), Err(AppError::PendingApproval)));
    }

    #[tokio::test]
    async fn gate_over_all_combinations() {
        let db_pool = db::temporary().await;

        for approved in [false, true] {
            for admin in [false, true] {
                let status = if approved {
                    ApprovalStatus::Approved
                } else {
                    ApprovalStatus::Pending
                };
                let user = testing::profile(&db_pool, status).await;
                if admin {
                    testing::grant(&db_pool, user, Role::Admin).await;
                }

                let caller = resolve(&db_pool, user).await.unwrap();
                assert_eq!(caller.member().is_ok(), approved || admin, "{approved} {admin}");
                assert_eq!(caller.admin().is_ok(), admin, "{approved} {admin}");
            }
        }
    }

    #[tokio::test]
    async fn revoked_approval_applies_immediately() {
        let db_pool = db::temporary().await;
        let user = testing::profile(&db_pool, ApprovalStatus::Approved).await;
        assert!(resolve(&db_pool, user).await.unwrap().member().is_ok());

        sqlx::query("UPDATE profiles SET status = 'REJECTED' WHERE id = ?")
            .bind(user)
            .execute(&db_pool)
            .await
            .unwrap();

        assert!(resolve(&db_pool, user).await.unwrap().member().is_err());
    }
}
