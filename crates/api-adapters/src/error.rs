//! # ApiError
//!
//! Everything a handler can fail with, and the status code and
//! caller-facing message each failure maps to.

use domains::DomainError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Unreadable envelope or a missing/ill-typed payload field.
    #[error("{0}")]
    BadRequest(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A server-side fault outside the domain taxonomy.
    #[error("{0}")]
    Internal(String),

    /// The handler task panicked.
    #[error("handler panicked")]
    Panicked,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn status(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) | ApiError::UnsupportedOperation(_) => 400,
            ApiError::Internal(_) | ApiError::Panicked => 500,
            ApiError::Domain(err) => match err {
                DomainError::Validation(_)
                | DomainError::InvalidOperation(_)
                | DomainError::Conflict(_) => 400,
                DomainError::Auth(_) => 401,
                DomainError::Forbidden(_) => 403,
                DomainError::NotFound { .. } => 404,
                DomainError::Dependency { .. } => 500,
            },
        }
    }

    /// What the caller sees. Server-side failures never leak detail.
    pub fn public_message(&self) -> String {
        if self.status() >= 500 {
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{AuthError, StoreError};

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases: Vec<(ApiError, u16)> = vec![
            (DomainError::validation("x").into(), 400),
            (DomainError::InvalidOperation("x".into()).into(), 400),
            (DomainError::Conflict("x".into()).into(), 400),
            (DomainError::Auth(AuthError::MissingToken).into(), 401),
            (DomainError::Forbidden("x".into()).into(), 403),
            (DomainError::not_found("content", "m1").into(), 404),
            (ApiError::UnsupportedOperation("nope".into()), 400),
            (ApiError::Internal("x".into()), 500),
            (ApiError::Panicked, 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err:?}");
        }
    }

    #[test]
    fn dependency_detail_stays_server_side() {
        let err: ApiError = DomainError::dependency(
            "read profile counters",
            StoreError::Unavailable("connection reset by 10.0.0.7".into()),
        )
        .into();
        assert_eq!(err.status(), 500);
        assert_eq!(err.public_message(), "Internal Server Error");
    }

    #[test]
    fn unsupported_operation_names_the_operation() {
        let err = ApiError::UnsupportedOperation("fly".into());
        assert_eq!(err.public_message(), "Unsupported operation: fly");
    }
}
