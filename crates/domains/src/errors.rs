//! # Errors
//!
//! `StoreError` and `AuthError` come out of the ports; `DomainError` is the
//! taxonomy every service returns and the dispatcher maps to a status code.

use thiserror::Error;

/// Failures reported by a [`DocumentStore`](crate::ports::DocumentStore) or
/// [`ObjectStore`](crate::ports::ObjectStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A condition attached to a write (or to one write of a transaction)
    /// did not hold. Nothing was written.
    #[error("conditional check failed")]
    ConditionFailed,

    /// An item in the store does not have the shape the caller expected.
    #[error("malformed item in {table}: {reason}")]
    Malformed { table: String, reason: String },

    /// The backing service could not be reached or rejected the call.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn malformed(table: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Malformed {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by an [`IdentityVerifier`](crate::ports::IdentityVerifier).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No token provided")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken(String),
}

/// The service-level error taxonomy.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Missing or malformed request fields.
    #[error("{0}")]
    Validation(String),

    /// A well-formed request the state rules forbid, e.g. following yourself.
    #[error("{0}")]
    InvalidOperation(String),

    /// Missing or invalid credential.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Authenticated, but not allowed to touch this resource.
    #[error("{0}")]
    Forbidden(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A conditional write lost. Benign for counter decrements, which never
    /// surface it; everywhere else it reaches the caller.
    #[error("{0}")]
    Conflict(String),

    /// A store or identity-provider call failed.
    #[error("dependency failure during {context}")]
    Dependency {
        context: String,
        #[source]
        source: StoreError,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        DomainError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn dependency(context: impl Into<String>, source: StoreError) -> Self {
        DomainError::Dependency {
            context: context.into(),
            source,
        }
    }
}

/// A specialized Result type for service logic.
pub type Result<T> = std::result::Result<T, DomainError>;
