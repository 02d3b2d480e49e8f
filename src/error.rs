use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

/// Domain error taxonomy. The boundary layer maps each kind to a status code
/// and a safe message; store error text is never forwarded to clients.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    #[error("authentication required")]
    Unauthenticated,
    #[error("permission denied")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("assistant unavailable")]
    UpstreamUnavailable,
    #[error("operation timed out")]
    Timeout,
    #[error("internal error")]
    Unexpected(#[source] anyhow::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Error::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db) = e.as_database_error() {
            if db.is_unique_violation() {
                return Error::Conflict("record already exists".to_string());
            }
        }
        Error::Unexpected(e.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Unexpected(e)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if let Error::Unexpected(e) = &self {
            error!("unexpected error: {e:#}");
        }
        (self.status(), self.to_string()).into_response()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_per_kind() {
        let cases = [
            (Error::validation("bad input"), StatusCode::BAD_REQUEST),
            (Error::Unauthenticated, StatusCode::UNAUTHORIZED),
            (Error::Forbidden, StatusCode::FORBIDDEN),
            (Error::NotFound("chapter"), StatusCode::NOT_FOUND),
            (Error::conflict("duplicate"), StatusCode::CONFLICT),
            (Error::UpstreamUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (Error::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (
                Error::Unexpected(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_unexpected_hides_detail() {
        let error = Error::Unexpected(anyhow::anyhow!("connection string leaked"));
        assert_eq!(error.to_string(), "internal error");
    }
}
