use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// No session. The caller needs to sign in with the identity provider first.
    #[error("sign in to continue")]
    Unauthenticated,

    /// Signed in, but neither approved nor an admin.
    #[error("your membership is awaiting approval")]
    PendingApproval,

    #[error("you are not allowed to do that")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// The action was already handled, or collides with existing state. Re-read to resync.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),

    #[error("the request took too long, try again")]
    Timeout,

    #[error(transparent)]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Session(#[from] tower_sessions::session::Error),
}

impl AppError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        use AppError::*;
        match self {
            Unauthenticated => "unauthenticated",
            PendingApproval => "pending_approval",
            Forbidden => "forbidden",
            NotFound(_) => "not_found",
            Conflict(_) => "conflict",
            Invalid(_) => "invalid",
            Timeout => "timeout",
            Store(_) => "store",
            Migrate(_) | Session(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        use AppError::*;
        match self {
            Unauthenticated => StatusCode::UNAUTHORIZED,
            PendingApproval | Forbidden => StatusCode::FORBIDDEN,
            NotFound(_) => StatusCode::NOT_FOUND,
            Conflict(_) => StatusCode::CONFLICT,
            Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Timeout => StatusCode::REQUEST_TIMEOUT,
            Store(e) if is_transient(e) => StatusCode::SERVICE_UNAVAILABLE,
            Store(_) | Migrate(_) | Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(self.status(), StatusCode::REQUEST_TIMEOUT | StatusCode::SERVICE_UNAVAILABLE)
    }

    /// True when the store refused a write because of a unique index.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Store(e) => is_unique_violation(e),
            _ => false,
        }
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|e| e.is_unique_violation())
}

fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            if self.retryable() {
                "the service is busy, try again".to_owned()
            } else {
                "something went wrong".to_owned()
            }
        } else {
            self.to_string()
        };

        (
            status,
            Json(ErrorBody {
                error: self.kind(),
                message,
                retryable: self.retryable(),
            }),
        )
            .into_response()
    }
}

/// Give the bare 408 produced by the timeout layer the usual error body.
pub async fn timeout_body(response: Response) -> Response {
    let bare = !response.headers().contains_key(header::CONTENT_TYPE);
    if response.status() == StatusCode::REQUEST_TIMEOUT && bare {
        AppError::Timeout.into_response()
    } else {
        response
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::Value;

    use super::*;

    async fn json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn bare_timeout_gets_the_error_body() {
        let response = timeout_body(StatusCode::REQUEST_TIMEOUT.into_response()).await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let body = json(response).await;
        assert_eq!(body["error"], "timeout");
        assert_eq!(body["retryable"], true);
    }

    #[tokio::test]
    async fn other_responses_pass_through() {
        let response = timeout_body(AppError::NotFound("event").into_response()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["error"], "not_found");

        let response = timeout_body(StatusCode::NO_CONTENT.into_response()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
