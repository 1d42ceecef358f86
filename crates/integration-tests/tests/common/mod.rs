//! Shared harness: in-memory stores, static tokens, and the production
//! dispatchers with the default allow-lists.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use api_adapters::handlers::{dispatchers, ServiceSet};
use api_adapters::{ApiResponse, Dispatcher, Metrics};
use auth_adapters::StaticTokenVerifier;
use configs::ServicesSettings;
use domains::{Document, DocumentStore, FollowCounts, ItemKey};
use serde_json::{json, Value};
use services::tables::{BADGE_STATS, CONTENT};
use storage_adapters::{InMemoryDocumentStore, InMemoryObjectStore};

pub const ALICE: &str = "alice@x.com";
pub const BOB: &str = "bob@x.com";
pub const CAROL: &str = "carol@x.com";

pub const ALICE_TOKEN: &str = "alice-token";
pub const BOB_TOKEN: &str = "bob-token";
pub const CAROL_TOKEN: &str = "carol-token";

pub struct Harness {
    pub store: Arc<InMemoryDocumentStore>,
    pub objects: Arc<InMemoryObjectStore>,
    pub services: ServiceSet,
    pub metrics: Arc<Metrics>,
    dispatchers: HashMap<String, Dispatcher>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryDocumentStore::new());
        let objects = Arc::new(InMemoryObjectStore::new());
        let services = ServiceSet::new(store.clone(), objects.clone());
        let metrics = Arc::new(Metrics::new());
        let allow_lists = ServicesSettings::default();
        let dispatchers = dispatchers(&services, verifier(), metrics.clone(), |service| {
            allow_lists.public_operations(service)
        })
        .into_iter()
        .map(|d| (d.service().to_string(), d))
        .collect();

        Self {
            store,
            objects,
            services,
            metrics,
            dispatchers,
        }
    }

    pub fn dispatcher(&self, service: &str) -> &Dispatcher {
        &self.dispatchers[service]
    }

    /// Sends `body` to `service` the way a transport would: as a JSON
    /// string with the token in the `Authorization` header.
    pub async fn call(&self, service: &str, body: Value, token: Option<&str>) -> ApiResponse {
        let mut event = json!({ "body": body.to_string(), "headers": {} });
        if let Some(token) = token {
            event["headers"]["Authorization"] = json!(format!("Bearer {token}"));
        }
        self.dispatcher(service).dispatch(&event).await
    }

    pub async fn follow(&self, follower: &str, followee: &str, token: &str) -> ApiResponse {
        self.call(
            "follow",
            json!({ "operation": "addFollow", "followerId": follower, "followeeId": followee }),
            Some(token),
        )
        .await
    }

    pub async fn unfollow(&self, follower: &str, followee: &str, token: &str) -> ApiResponse {
        self.call(
            "follow",
            json!({ "operation": "removeFollow", "followerId": follower, "followeeId": followee }),
            Some(token),
        )
        .await
    }

    pub async fn react(&self, content: &str, user: &str, token: &str, flags: Value) -> ApiResponse {
        let mut body = json!({ "operation": "updateMemeReaction", "memeID": content, "email": user });
        if let (Some(body), Some(flags)) = (body.as_object_mut(), flags.as_object()) {
            body.extend(flags.clone());
        }
        self.call("engagement", body, Some(token)).await
    }

    pub async fn counts(&self, user: &str) -> FollowCounts {
        self.services.relationships.profile_counts(user).await.unwrap()
    }

    /// The stored content item, `None` when nothing has touched it yet.
    pub async fn content(&self, content_id: &str) -> Option<Document> {
        self.store.get(CONTENT, &ItemKey::new(content_id)).await.unwrap()
    }

    pub async fn like_count(&self, content_id: &str) -> i64 {
        self.content(content_id)
            .await
            .and_then(|d| d.get("likeCount").and_then(Value::as_i64))
            .unwrap_or(0)
    }

    pub async fn download_count(&self, content_id: &str) -> i64 {
        self.content(content_id)
            .await
            .and_then(|d| d.get("downloadCount").and_then(Value::as_i64))
            .unwrap_or(0)
    }

    pub async fn comment_count(&self, content_id: &str) -> i64 {
        self.content(content_id)
            .await
            .and_then(|d| d.get("commentCount").and_then(Value::as_i64))
            .unwrap_or(0)
    }

    /// Posts a comment, or a reply under `parent`, as `user`.
    pub async fn comment(&self, content: &str, user: &str, token: &str, text: &str, parent: Option<&str>) -> ApiResponse {
        let mut body = json!({
            "operation": "postComment",
            "memeID": content,
            "email": user,
            "username": user.split('@').next().unwrap_or(user),
            "text": text,
        });
        if let Some(parent) = parent {
            body["operation"] = json!("replyToComment");
            body["parentCommentID"] = json!(parent);
        }
        self.call("engagement", body, Some(token)).await
    }

    pub async fn holders(&self, badge_type: &str) -> i64 {
        self.store
            .get(BADGE_STATS, &ItemKey::new(badge_type))
            .await
            .unwrap()
            .and_then(|d| d.get("holdersCount").and_then(Value::as_i64))
            .unwrap_or(0)
    }

    pub async fn seed_content(&self, content_id: &str, owner: &str, media_key: Option<&str>) {
        let mut item = json!({ "contentId": content_id, "ownerEmail": owner, "likeCount": 0, "downloadCount": 0 });
        if let Some(key) = media_key {
            item["mediaKey"] = json!(key);
            self.objects.insert(key, b"jpeg bytes".to_vec());
        }
        self.store
            .put(CONTENT, item.as_object().cloned().unwrap(), None)
            .await
            .unwrap();
    }
}

fn verifier() -> Arc<StaticTokenVerifier> {
    Arc::new(
        StaticTokenVerifier::new()
            .with_user(ALICE_TOKEN, ALICE)
            .with_user(BOB_TOKEN, BOB)
            .with_user(CAROL_TOKEN, CAROL),
    )
}
