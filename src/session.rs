//! The shared session context.
//!
//! Sign-in happens at the external identity provider, which leaves the account id under
//! [`USER_ID`] in the session. Whenever something changes what a user may do (approval, roles,
//! sign-out) the change is pushed through one process-wide [`SessionHub`]; open `/me/ws` streams
//! forward the ones for their own user.
use axum::{
    Json, Router, debug_handler,
    extract::{State, WebSocketUpgrade, ws::Message},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppResult, AppState,
    gate::{self, Access},
};

pub const USER_ID: &str = "user_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessChange {
    pub user_id: Uuid,
    pub access: Access,
}

#[derive(Debug, Clone)]
pub struct SessionHub {
    tx: broadcast::Sender<AccessChange>,
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new(64)
    }
}

impl SessionHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AccessChange> {
        self.tx.subscribe()
    }

    pub fn publish(&self, change: AccessChange) {
        // Nobody listening is fine.
        let _ = self.tx.send(change);
    }

    /// Recompute a user's access from the store and push it to subscribers.
    pub async fn refresh(&self, db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Access> {
        let access = gate::access_of(db_pool, Some(user_id)).await?;
        tracing::debug!(%user_id, ?access, "access changed");
        self.publish(AccessChange { user_id, access });
        Ok(access)
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me/access", get(access))
        .route("/me/ws", get(access_ws))
        .route("/logout", post(logout))
}

#[debug_handler(state = AppState)]
async fn access(State(db_pool): State<SqlitePool>, session: Session) -> AppResult<Json<Access>> {
    let user_id = gate::session_user(&session).await?;
    Ok(Json(gate::access_of(&db_pool, user_id).await?))
}

#[debug_handler(state = AppState)]
async fn logout(State(hub): State<SessionHub>, session: Session) -> AppResult<StatusCode> {
    if let Some(user_id) = gate::session_user(&session).await? {
        hub.publish(AccessChange {
            user_id,
            access: Access::default(),
        });
    }
    session.flush().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = AppState)]
async fn access_ws(
    State(db_pool): State<SqlitePool>,
    State(hub): State<SessionHub>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let Some(user_id) = gate::session_user(&session).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    let current = gate::access_of(&db_pool, Some(user_id)).await?;
    let mut rx = hub.subscribe();

    Ok(ws.on_upgrade(async move |stream| {
        let (mut sender, mut receiver) = stream.split();

        let mut push_task = tokio::spawn(async move {
            let first = AccessChange { user_id, access: current };
            if send_change(&mut sender, &first).await.is_err() {
                return;
            }
            loop {
                match rx.recv().await {
                    Ok(change) if change.user_id == user_id => {
                        if send_change(&mut sender, &change).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(%user_id, skipped, "access stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // Incoming frames are ignored; the loop only watches for the client going away.
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                if matches!(msg, Message::Close(_)) {
                    break;
                }
            }
        });

        tokio::select! {
            _ = &mut push_task => recv_task.abort(),
            _ = &mut recv_task => push_task.abort(),
        };
    }))
}

async fn send_change<S>(sender: &mut S, change: &AccessChange) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let Ok(text) = serde_json::to_string(change) else {
        return Err(());
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, models::{ApprovalStatus, Role}, testing};

    #[tokio::test]
    async fn refresh_pushes_recomputed_access() {
        let db_pool = db::temporary().await;
        let hub = SessionHub::default();
        let mut rx = hub.subscribe();

        let user = testing::profile(&db_pool, ApprovalStatus::Pending).await;
        let access = hub.refresh(&db_pool, user).await.unwrap();
        assert!(!access.allowed());
        assert_eq!(rx.recv().await.unwrap(), AccessChange { user_id: user, access });

        testing::grant(&db_pool, user, Role::Admin).await;
        hub.refresh(&db_pool, user).await.unwrap();
        let change = rx.recv().await.unwrap();
        assert!(change.access.is_admin);
        assert!(change.access.allowed());
    }
}
