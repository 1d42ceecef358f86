//! # Operation handlers
//!
//! Thin adapters from a [`RequestContext`](crate::dispatcher::RequestContext)
//! to a service call. Each submodule owns one logical service's operation
//! table and registers it on a [`Dispatcher`](crate::dispatcher::Dispatcher).

pub mod badges;
pub mod engagement;
pub mod follow;

use std::sync::Arc;

use domains::{DocumentStore, IdentityVerifier, ObjectStore};
use services::{BadgeService, CommentService, ContentService, EngagementService, RelationshipService};

use crate::dispatcher::Dispatcher;
use crate::metrics::Metrics;

/// Logical service names, also used as the HTTP path segment.
pub const FOLLOW: &str = "follow";
pub const ENGAGEMENT: &str = "engagement";
pub const BADGES: &str = "badges";

/// The services behind the three dispatchers, sharing one store.
#[derive(Clone)]
pub struct ServiceSet {
    pub relationships: Arc<RelationshipService>,
    pub engagement: Arc<EngagementService>,
    pub content: Arc<ContentService>,
    pub comments: Arc<CommentService>,
    pub badges: Arc<BadgeService>,
}

impl ServiceSet {
    pub fn new(store: Arc<dyn DocumentStore>, objects: Arc<dyn ObjectStore>) -> Self {
        let badges = Arc::new(BadgeService::new(store.clone()));
        Self {
            relationships: Arc::new(RelationshipService::new(store.clone())),
            engagement: Arc::new(EngagementService::new(store.clone(), badges.clone())),
            comments: Arc::new(CommentService::new(store.clone())),
            content: Arc::new(ContentService::new(store, objects)),
            badges,
        }
    }
}

/// One dispatcher per logical service. `public_operations` yields each
/// service's allow-list by name.
pub fn dispatchers<P, I>(
    services: &ServiceSet,
    verifier: Arc<dyn IdentityVerifier>,
    metrics: Arc<Metrics>,
    public_operations: P,
) -> Vec<Dispatcher>
where
    P: Fn(&str) -> I,
    I: IntoIterator<Item = String>,
{
    let base = |service: &str| {
        Dispatcher::new(service, verifier.clone())
            .public_operations(public_operations(service))
            .with_metrics(metrics.clone())
    };
    vec![
        follow::routes(base(FOLLOW), services.relationships.clone()),
        engagement::routes(
            base(ENGAGEMENT),
            services.engagement.clone(),
            services.content.clone(),
            services.comments.clone(),
        ),
        badges::routes(base(BADGES), services.badges.clone()),
    ]
}
