//! # api-adapters
//!
//! The request dispatcher and its operation handlers, the response
//! envelope, and (with `web-axum`) an HTTP surface over them.

pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod response;

#[cfg(feature = "web-axum")]
pub mod web;

pub use dispatcher::{Dispatcher, OperationHandler, Reply, RequestContext};
pub use error::ApiError;
pub use metrics::Metrics;
pub use response::ApiResponse;
