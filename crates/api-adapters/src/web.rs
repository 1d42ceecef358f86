//! # HTTP surface
//!
//! Exposes every dispatcher at `POST /v1/{service}`. The request body is
//! the envelope's request object and the headers carry the bearer token,
//! so an HTTP call and a raw event go through the same dispatch path.
//!
//! Also serves `GET /healthz` and `GET /metrics`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Map, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::{error, Level};

use crate::dispatcher::Dispatcher;
use crate::error::ApiError;
use crate::metrics::{self, Metrics};
use crate::response::ApiResponse;

const REQUEST_ID: &str = "x-request-id";

#[derive(Debug, Clone, Copy)]
pub struct HttpLimits {
    pub request_timeout: Duration,
    pub body_limit_bytes: usize,
}

impl Default for HttpLimits {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            body_limit_bytes: 64 * 1024,
        }
    }
}

pub struct AppState {
    dispatchers: HashMap<String, Arc<Dispatcher>>,
    metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(dispatchers: impl IntoIterator<Item = Dispatcher>, metrics: Arc<Metrics>) -> Self {
        let dispatchers = dispatchers
            .into_iter()
            .map(|d| (d.service().to_string(), Arc::new(d)))
            .collect();
        Self {
            dispatchers,
            metrics,
        }
    }
}

pub fn router(state: AppState, limits: HttpLimits) -> Router {
    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id
            )
        })
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );
    let request_id_header = HeaderName::from_static(REQUEST_ID);

    Router::new()
        .route("/v1/{service}", post(dispatch))
        .route("/healthz", get(healthz))
        .route("/metrics", get(render_metrics))
        .with_state(Arc::new(state))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(trace)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            limits.request_timeout,
        ))
        .layer(RequestBodyLimitLayer::new(limits.body_limit_bytes))
        .layer(CorsLayer::permissive())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
}

async fn dispatch(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(dispatcher) = state.dispatchers.get(&service) else {
        return into_http(ApiResponse::new(404, &format!("Unknown service: {service}"), None));
    };
    let event = json!({
        "body": String::from_utf8_lossy(&body),
        "headers": header_object(&headers),
    });
    into_http(dispatcher.dispatch(&event).await)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, axum::Json(json!({ "status": "ok" })))
}

async fn render_metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(text) => ([(CONTENT_TYPE, metrics::CONTENT_TYPE)], text).into_response(),
        Err(e) => {
            error!(error = %e, "metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn header_object(headers: &HeaderMap) -> Value {
    let map: Map<String, Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_string(), Value::from(value)))
        })
        .collect();
    Value::Object(map)
}

/// Renders the envelope as a real HTTP response.
pub fn into_http(resp: ApiResponse) -> Response {
    let status = StatusCode::from_u16(resp.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, resp.body).into_response();
    let headers = response.headers_mut();
    for (name, value) in &resp.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    response
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    error!("request panicked outside a handler task");
    into_http(ApiResponse::from_error(&ApiError::Panicked))
}
