use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::fixture::MatchStateError;
use crate::store::StoreError;

/// Every failure the HTTP boundary can return.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Malformed body on a mutation endpoint (create uses `InvalidRecord`).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<MatchStateError> for ApiError {
    fn from(err: MatchStateError) -> Self {
        ApiError::Store(StoreError::MatchState(err))
    }
}

impl ApiError {
    /// HTTP status plus the stable machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::Store(err) => match err {
                StoreError::InvalidRecord(_) => (StatusCode::BAD_REQUEST, "INVALID_RECORD"),
                StoreError::DuplicateId(_) => (StatusCode::CONFLICT, "DUPLICATE_ID"),
                StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                StoreError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
                StoreError::Inconsistent(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "STORE_INCONSISTENT")
                }
                StoreError::MatchState(m) => match m {
                    MatchStateError::IllegalTransition(_) => {
                        (StatusCode::CONFLICT, "ILLEGAL_TRANSITION")
                    }
                    MatchStateError::ClockRegression { .. } => {
                        (StatusCode::CONFLICT, "CLOCK_REGRESSION")
                    }
                    MatchStateError::FixtureFinalized => (StatusCode::CONFLICT, "FIXTURE_FINALIZED"),
                    MatchStateError::UnknownEventList(_) => {
                        (StatusCode::BAD_REQUEST, "UNKNOWN_EVENT_LIST")
                    }
                },
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.to_string();
        let retryable = matches!(&self, ApiError::Store(e) if e.is_retryable());

        if status.is_server_error() {
            warn!("{} {}: {}", status.as_u16(), code, message);
        } else {
            debug!("{} {}: {}", status.as_u16(), code, message);
        }

        let body = Json(json!({
            "error": code,
            "message": message,
        }));

        if retryable {
            return (status, [(header::RETRY_AFTER, "1")], body).into_response();
        }
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_asks_for_retry() {
        let resp = ApiError::from(StoreError::Unavailable("busy".into())).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers()[header::RETRY_AFTER], "1");

        let err = ApiError::from(StoreError::Inconsistent("row gone".into()));
        assert_eq!(
            err.status_and_code(),
            (StatusCode::INTERNAL_SERVER_ERROR, "STORE_INCONSISTENT")
        );
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.headers().get(header::RETRY_AFTER).is_none());
    }
}
