//! # Request envelope
//!
//! Normalizes an incoming event into the operation name, the flat request
//! object and the bearer token. The request object may arrive as a JSON
//! string in `body`, as an object in `body`, or be the event itself.

use serde_json::{Map, Value};

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub operation: String,
    /// The whole request object, `operation` included.
    pub request: Map<String, Value>,
    pub bearer_token: Option<String>,
}

impl Envelope {
    pub fn parse(event: &Value) -> Result<Self, ApiError> {
        // 1. Request object
        let request = match event.get("body") {
            Some(Value::String(raw)) if !raw.is_empty() => serde_json::from_str::<Value>(raw)
                .map_err(|_| ApiError::bad_request("Request body is not valid JSON."))?,
            Some(body @ Value::Object(_)) => body.clone(),
            _ => event.clone(),
        };
        let Value::Object(request) = request else {
            return Err(ApiError::bad_request("Request body must be a JSON object."));
        };

        // 2. Operation
        let operation = request
            .get("operation")
            .and_then(Value::as_str)
            .filter(|op| !op.is_empty())
            .ok_or_else(|| ApiError::bad_request("operation is required."))?
            .to_string();

        Ok(Self {
            operation,
            request,
            bearer_token: bearer_token(event.get("headers")),
        })
    }
}

/// `Authorization: Bearer <token>`; the header name is matched in either
/// of its two common spellings.
fn bearer_token(headers: Option<&Value>) -> Option<String> {
    let headers = headers?;
    ["Authorization", "authorization"]
        .iter()
        .filter_map(|name| headers.get(*name).and_then(Value::as_str))
        .find_map(|value| value.split_whitespace().nth(1))
        .map(str::to_string)
}
