//! The response envelope every operation returns:
//! `{statusCode, headers, body}` where `body` is the JSON text of
//! `{message, data}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;

/// Permissive CORS headers stamped on every response.
pub const CORS_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "application/json"),
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "OPTIONS,POST,GET"),
    ("Access-Control-Allow-Headers", "Content-Type, Authorization"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status_code: u16, message: &str, data: Option<Value>) -> Self {
        let headers = CORS_HEADERS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let body = json!({ "message": message, "data": data }).to_string();
        Self {
            status_code,
            headers,
            body,
        }
    }

    pub fn ok(message: &str, data: Option<Value>) -> Self {
        Self::new(200, message, data)
    }

    pub fn from_error(err: &ApiError) -> Self {
        Self::new(err.status(), &err.public_message(), None)
    }

    /// The decoded `body`. Mostly for tests and clients.
    pub fn body_json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }

    pub fn message(&self) -> String {
        self.body_json()["message"].as_str().unwrap_or_default().to_string()
    }

    pub fn data(&self) -> Value {
        self.body_json()["data"].clone()
    }
}
