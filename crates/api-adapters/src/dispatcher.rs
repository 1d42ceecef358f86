//! # Dispatcher
//!
//! One dispatcher per logical service. It unwraps the envelope, verifies
//! the caller unless the operation is on the service's public allow-list,
//! looks the operation up in its handler table and renders whatever comes
//! back as the CORS response envelope.
//!
//! # Developer Note
//! Authentication runs before routing, so an unknown operation without a
//! token is answered with 401 rather than 400. Handlers run on their own
//! task; a panic inside one becomes a 500 for that request only.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use domains::{AuthError, DomainError, IdentityVerifier, Principal};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::response::ApiResponse;

/// Payload fields tried, in order, when a log line needs the request's key.
const KEY_FIELDS: [&str; 6] = ["memeID", "followerId", "userId", "userEmail", "email", "followeeId"];

/// Metrics label for operations nobody registered.
const UNROUTED: &str = "unsupported";

/// What a handler sees of one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub operation: String,
    pub request: Map<String, Value>,
    /// Present whenever the operation was not public.
    pub principal: Option<Principal>,
}

impl RequestContext {
    /// A non-empty string field.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.request
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// All of `fields` as non-empty strings, or a 400 carrying `message`.
    pub fn required<const N: usize>(&self, fields: [&str; N], message: &str) -> Result<[&str; N], ApiError> {
        let mut values = [""; N];
        for (slot, field) in values.iter_mut().zip(fields) {
            *slot = self
                .str_field(field)
                .ok_or_else(|| ApiError::bad_request(message))?;
        }
        Ok(values)
    }

    /// Boolean flags are off unless literally `true`.
    pub fn flag(&self, name: &str) -> bool {
        self.request.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// A non-negative integer field.
    pub fn count(&self, name: &str) -> Option<usize> {
        self.request
            .get(name)
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
    }

    pub fn string_list(&self, name: &str) -> Option<Vec<String>> {
        self.request.get(name)?.as_array().map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
    }

    /// A verified caller may only act as themselves.
    pub fn ensure_actor(&self, user: &str) -> Result<(), ApiError> {
        match &self.principal {
            Some(principal) if !principal.acts_as(user) => Err(DomainError::Forbidden(
                "You are not authorized to act on behalf of this user".into(),
            )
            .into()),
            _ => Ok(()),
        }
    }

    fn log_key(&self) -> &str {
        KEY_FIELDS
            .iter()
            .find_map(|f| self.str_field(f))
            .unwrap_or("-")
    }
}

/// A successful handler result: the message and optional data.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub message: String,
    pub data: Option<Value>,
}

impl Reply {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(message: impl Into<String>, data: impl Serialize) -> Result<Self, ApiError> {
        let data = serde_json::to_value(data)
            .map_err(|e| ApiError::Internal(format!("unserializable reply: {e}")))?;
        Ok(Self {
            message: message.into(),
            data: Some(data),
        })
    }
}

#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, ctx: RequestContext) -> Result<Reply, ApiError>;
}

#[async_trait]
impl<F, Fut> OperationHandler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Reply, ApiError>> + Send + 'static,
{
    async fn handle(&self, ctx: RequestContext) -> Result<Reply, ApiError> {
        (self)(ctx).await
    }
}

pub struct Dispatcher {
    service: String,
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
    public_operations: HashSet<String>,
    verifier: Arc<dyn IdentityVerifier>,
    metrics: Option<Arc<Metrics>>,
}

impl Dispatcher {
    pub fn new(service: impl Into<String>, verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self {
            service: service.into(),
            handlers: HashMap::new(),
            public_operations: HashSet::new(),
            verifier,
            metrics: None,
        }
    }

    pub fn public_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.public_operations = operations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn register(mut self, operation: &str, handler: impl OperationHandler + 'static) -> Self {
        self.handlers.insert(operation.to_string(), Arc::new(handler));
        self
    }

    /// Registers `f` with a shared `state` handed to every call.
    pub fn route<S, F, Fut>(self, operation: &str, state: Arc<S>, f: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(Arc<S>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, ApiError>> + Send + 'static,
    {
        self.register(operation, move |ctx: RequestContext| f(Arc::clone(&state), ctx))
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn is_public(&self, operation: &str) -> bool {
        self.public_operations.contains(operation)
    }

    /// Handles one event end to end. Never fails: every outcome is an
    /// [`ApiResponse`].
    pub async fn dispatch(&self, event: &Value) -> ApiResponse {
        let started = Instant::now();
        let (operation, result) = match Envelope::parse(event) {
            Ok(envelope) => {
                let operation = envelope.operation.clone();
                (Some(operation), self.run(envelope).await)
            }
            Err(e) => {
                debug!(service = %self.service, error = %e, "unreadable envelope");
                (None, Err(e))
            }
        };

        let response = match &result {
            Ok(reply) => ApiResponse::ok(&reply.message, reply.data.clone()),
            Err(e) => ApiResponse::from_error(e),
        };

        if let Some(metrics) = &self.metrics {
            let label = match operation.as_deref() {
                Some(op) if self.handlers.contains_key(op) => op,
                _ => UNROUTED,
            };
            metrics.observe(&self.service, label, response.status_code, started.elapsed());
        }
        response
    }

    async fn run(&self, envelope: Envelope) -> Result<Reply, ApiError> {
        let Envelope {
            operation,
            request,
            bearer_token,
        } = envelope;

        // 1. Authentication
        let principal = if self.is_public(&operation) {
            None
        } else {
            Some(self.authenticate(&operation, bearer_token.as_deref()).await?)
        };

        // 2. Routing
        let Some(handler) = self.handlers.get(&operation).cloned() else {
            warn!(service = %self.service, operation, "unsupported operation");
            return Err(ApiError::UnsupportedOperation(operation));
        };

        // 3. Handler, isolated on its own task
        let ctx = RequestContext {
            operation,
            request,
            principal,
        };
        let log_ctx = ctx.clone();
        let result = match tokio::spawn(async move { handler.handle(ctx).await }).await {
            Ok(result) => result,
            Err(join) if join.is_panic() => Err(ApiError::Panicked),
            Err(join) => {
                error!(error = %join, "handler task cancelled");
                Err(ApiError::Panicked)
            }
        };

        self.log_outcome(&log_ctx, &result);
        result
    }

    async fn authenticate(&self, operation: &str, token: Option<&str>) -> Result<Principal, ApiError> {
        let Some(token) = token else {
            debug!(service = %self.service, operation, "no bearer token");
            return Err(DomainError::Auth(AuthError::MissingToken).into());
        };
        match self.verifier.verify(token).await {
            Ok(principal) => {
                debug!(service = %self.service, operation, subject = %principal.subject, "caller verified");
                Ok(principal)
            }
            Err(e) => {
                warn!(service = %self.service, operation, error = ?e, "token verification failed");
                Err(DomainError::Auth(e).into())
            }
        }
    }

    fn log_outcome(&self, ctx: &RequestContext, result: &Result<Reply, ApiError>) {
        let key = ctx.log_key();
        match result {
            Ok(_) => info!(service = %self.service, operation = %ctx.operation, key, "operation succeeded"),
            Err(e) if e.status() >= 500 => {
                let source = match e {
                    ApiError::Domain(DomainError::Dependency { source, .. }) => source.to_string(),
                    _ => String::new(),
                };
                error!(service = %self.service, operation = %ctx.operation, key, error = %e, source, "operation failed");
            }
            Err(e) => {
                debug!(service = %self.service, operation = %ctx.operation, key, status = e.status(), error = %e, "operation rejected")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::MockIdentityVerifier;
    use serde_json::json;

    fn verifier_for(email: &'static str) -> Arc<dyn IdentityVerifier> {
        let mut verifier = MockIdentityVerifier::new();
        verifier.expect_verify().returning(move |token| {
            if token == "good" {
                Ok(Principal {
                    subject: "sub-1".into(),
                    email: Some(email.into()),
                    username: None,
                })
            } else {
                Err(AuthError::InvalidToken("bad signature".into()))
            }
        });
        Arc::new(verifier)
    }

    fn echo_dispatcher() -> Dispatcher {
        Dispatcher::new("test", verifier_for("a@x.com"))
            .public_operations(["ping"])
            .register("ping", |_ctx: RequestContext| async { Ok::<_, ApiError>(Reply::message("pong")) })
            .register("whoami", |ctx: RequestContext| async move {
                let [user] = ctx.required(["userEmail"], "userEmail is required.")?;
                ctx.ensure_actor(user)?;
                Reply::with_data("you", json!({ "user": user }))
            })
            .register("boom", |_ctx: RequestContext| async {
                if true {
                    panic!("handler exploded");
                }
                Ok::<_, ApiError>(Reply::message("unreachable"))
            })
    }

    fn event(body: Value, token: Option<&str>) -> Value {
        let mut event = json!({ "body": body.to_string(), "headers": {} });
        if let Some(token) = token {
            event["headers"]["Authorization"] = json!(format!("Bearer {token}"));
        }
        event
    }

    #[tokio::test]
    async fn public_operation_skips_verification() {
        let resp = echo_dispatcher()
            .dispatch(&event(json!({ "operation": "ping" }), None))
            .await;
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.message(), "pong");
    }

    #[tokio::test]
    async fn missing_and_invalid_tokens_are_401() {
        let d = echo_dispatcher();
        let body = json!({ "operation": "whoami", "userEmail": "a@x.com" });

        let missing = d.dispatch(&event(body.clone(), None)).await;
        assert_eq!((missing.status_code, missing.message().as_str()), (401, "No token provided"));

        let invalid = d.dispatch(&event(body, Some("forged"))).await;
        assert_eq!((invalid.status_code, invalid.message().as_str()), (401, "Invalid token"));
    }

    #[tokio::test]
    async fn unknown_operation_is_checked_for_auth_first() {
        let d = echo_dispatcher();
        let anonymous = d.dispatch(&event(json!({ "operation": "fly" }), None)).await;
        assert_eq!(anonymous.status_code, 401);

        let authed = d.dispatch(&event(json!({ "operation": "fly" }), Some("good"))).await;
        assert_eq!(authed.status_code, 400);
        assert_eq!(authed.message(), "Unsupported operation: fly");
    }

    #[tokio::test]
    async fn acting_for_someone_else_is_forbidden() {
        let d = echo_dispatcher();
        let own = d
            .dispatch(&event(json!({ "operation": "whoami", "userEmail": "a@x.com" }), Some("good")))
            .await;
        assert_eq!(own.status_code, 200);
        assert_eq!(own.data(), json!({ "user": "a@x.com" }));

        let other = d
            .dispatch(&event(json!({ "operation": "whoami", "userEmail": "b@x.com" }), Some("good")))
            .await;
        assert_eq!(other.status_code, 403);
    }

    #[tokio::test]
    async fn missing_field_is_400_with_the_handler_message() {
        let resp = echo_dispatcher()
            .dispatch(&event(json!({ "operation": "whoami" }), Some("good")))
            .await;
        assert_eq!(resp.status_code, 400);
        assert_eq!(resp.message(), "userEmail is required.");
    }

    #[tokio::test]
    async fn panicking_handler_is_contained() {
        let d = echo_dispatcher();
        let resp = d.dispatch(&event(json!({ "operation": "boom" }), Some("good"))).await;
        assert_eq!(resp.status_code, 500);
        assert_eq!(resp.message(), "Internal Server Error");

        let after = d.dispatch(&event(json!({ "operation": "ping" }), None)).await;
        assert_eq!(after.status_code, 200);
    }

    #[tokio::test]
    async fn outcomes_are_counted() {
        let metrics = Arc::new(Metrics::new());
        let d = echo_dispatcher().with_metrics(metrics.clone());
        d.dispatch(&event(json!({ "operation": "ping" }), None)).await;
        d.dispatch(&event(json!({ "operation": "fly" }), Some("good"))).await;

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"operation="ping",status="200"} 1"#));
        assert!(text.contains(r#"operation="unsupported",status="400"} 1"#));
    }

    #[test]
    fn flags_and_lists() {
        let ctx = RequestContext {
            operation: "x".into(),
            request: json!({ "a": true, "b": "true", "ids": ["p", 3, "q"] })
                .as_object()
                .cloned()
                .unwrap(),
            principal: None,
        };
        assert!(ctx.flag("a"));
        assert!(!ctx.flag("b"));
        assert!(!ctx.flag("missing"));
        assert_eq!(ctx.string_list("ids"), Some(vec!["p".to_string(), "q".to_string()]));
        assert_eq!(ctx.string_list("a"), None);
        assert!(ctx.ensure_actor("anyone").is_ok());
    }
}
