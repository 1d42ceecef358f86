//! # Badge Service
//!
//! Threshold rules that decide badge eligibility, idempotent awards, and
//! the per-badge holder counts.

use std::sync::Arc;

use chrono::Utc;
use domains::{
    BadgeAward, Condition, DocumentStore, DomainError, HeldBadge, Index, ItemKey, Query, Result,
    StoreError, Table, UpdateAction, WriteOp,
};
use tracing::{debug, info, instrument, warn};

use crate::tables::{
    counter, from_document, to_document, BADGE_STATS, CONTENT, CONTENT_BY_OWNER, HOLDERS_COUNT,
    LIKE_COUNT, LIKE_STATE, RELATIONSHIPS, USER_BADGES, USER_DOWNLOADS, USER_LIKES,
};

pub const MEME_LIKER: &str = "memeLiker";
pub const SOCIAL_BUTTERFLY: &str = "socialButterfly";
pub const MEME_MASTER: &str = "memeMaster";
pub const TREND_SETTER: &str = "trendSetter";
pub const MEME_COLLECTOR: &str = "memeCollector";

/// Display metadata stamped onto an award.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeDefinition {
    pub badge_type: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const CATALOGUE: [BadgeDefinition; 5] = [
    BadgeDefinition {
        badge_type: MEME_LIKER,
        name: "Meme Liker",
        description: "Liked 10 memes.",
    },
    BadgeDefinition {
        badge_type: SOCIAL_BUTTERFLY,
        name: "Social Butterfly",
        description: "Followed 10 users.",
    },
    BadgeDefinition {
        badge_type: MEME_MASTER,
        name: "Meme Master",
        description: "Uploaded 5 memes.",
    },
    BadgeDefinition {
        badge_type: TREND_SETTER,
        name: "Trend Setter",
        description: "Received 100 likes across your memes.",
    },
    BadgeDefinition {
        badge_type: MEME_COLLECTOR,
        name: "Meme Collector",
        description: "Downloaded 50 memes.",
    },
];

pub fn definition(badge_type: &str) -> Option<&'static BadgeDefinition> {
    CATALOGUE.iter().find(|d| d.badge_type == badge_type)
}

/// What a rule measures over the rows it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    /// Number of matching rows.
    Rows,
    /// Sum of a numeric attribute across the rows.
    Sum(&'static str),
}

/// Eligibility rule for one badge: read the user's partition of `table`
/// (or of `index`), optionally keep only rows where `filter` holds, and
/// compare the measure against `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeRule {
    pub badge_type: &'static str,
    pub table: Table,
    pub index: Option<Index>,
    pub filter: Option<(&'static str, &'static str)>,
    pub measure: Measure,
    pub threshold: u64,
}

impl BadgeRule {
    fn query(&self, user: &str) -> Query {
        let mut query = Query::partition(self.table, user);
        if let Some(index) = self.index {
            query = query.on_index(index);
        }
        if let Some((attribute, value)) = self.filter {
            query = query.filtered(Condition::equals(attribute, value));
        }
        query
    }

    fn measure(&self, rows: &[domains::Document]) -> u64 {
        match self.measure {
            Measure::Rows => rows.len() as u64,
            Measure::Sum(attribute) => rows.iter().map(|row| counter(Some(row), attribute)).sum(),
        }
    }
}

pub const DEFAULT_RULES: [BadgeRule; 5] = [
    BadgeRule {
        badge_type: MEME_LIKER,
        table: USER_LIKES,
        index: None,
        filter: Some((LIKE_STATE, "liked")),
        measure: Measure::Rows,
        threshold: 10,
    },
    BadgeRule {
        badge_type: SOCIAL_BUTTERFLY,
        table: RELATIONSHIPS,
        index: None,
        filter: None,
        measure: Measure::Rows,
        threshold: 10,
    },
    BadgeRule {
        badge_type: MEME_MASTER,
        table: CONTENT,
        index: Some(CONTENT_BY_OWNER),
        filter: None,
        measure: Measure::Rows,
        threshold: 5,
    },
    BadgeRule {
        badge_type: TREND_SETTER,
        table: CONTENT,
        index: Some(CONTENT_BY_OWNER),
        filter: None,
        measure: Measure::Sum(LIKE_COUNT),
        threshold: 100,
    },
    BadgeRule {
        badge_type: MEME_COLLECTOR,
        table: USER_DOWNLOADS,
        index: None,
        filter: None,
        measure: Measure::Rows,
        threshold: 50,
    },
];

pub struct BadgeService {
    store: Arc<dyn DocumentStore>,
    rules: Vec<BadgeRule>,
}

impl BadgeService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_rules(store, DEFAULT_RULES.to_vec())
    }

    pub fn with_rules(store: Arc<dyn DocumentStore>, rules: Vec<BadgeRule>) -> Self {
        Self { store, rules }
    }

    /// Returns the badge type when `user` meets the rule for `action`.
    /// An action with no rule yields `None`.
    #[instrument(skip(self))]
    pub async fn check_eligibility(&self, user: &str, action: &str) -> Result<Option<String>> {
        let Some(rule) = self.rules.iter().find(|r| r.badge_type == action) else {
            warn!("no badge rule for action");
            return Ok(None);
        };

        let rows = self
            .store
            .query(rule.query(user))
            .await
            .map_err(|e| DomainError::dependency(format!("evaluate {action}"), e))?;
        let measured = rule.measure(&rows);
        debug!(measured, threshold = rule.threshold, "badge rule evaluated");

        Ok((measured >= rule.threshold).then(|| rule.badge_type.to_string()))
    }

    /// Records the award and bumps the holder count in one transaction.
    /// Returns `false` when the user already held the badge.
    #[instrument(skip(self))]
    pub async fn award(&self, user: &str, badge_type: &str) -> Result<bool> {
        let Some(def) = definition(badge_type) else {
            return Err(DomainError::validation(format!("Unknown badge type: {badge_type}")));
        };

        // 1. Cheap read first; the put below is still guarded.
        let key = ItemKey::with_sort(user, badge_type);
        let existing = self
            .store
            .get(USER_BADGES, &key)
            .await
            .map_err(|e| DomainError::dependency("read badge award", e))?;
        if existing.is_some() {
            debug!("badge already held");
            return Ok(false);
        }

        // 2. Award + holder count, all or nothing
        let award = BadgeAward {
            user_email: user.to_string(),
            badge_type: def.badge_type.to_string(),
            name: def.name.to_string(),
            description: def.description.to_string(),
            awarded_date: Utc::now(),
        };
        let ops = vec![
            WriteOp::Put {
                table: USER_BADGES,
                item: to_document(USER_BADGES, &award)?,
                condition: Some(Condition::ItemNotExists),
            },
            WriteOp::Update {
                table: BADGE_STATS,
                key: ItemKey::new(badge_type),
                actions: vec![UpdateAction::increment(HOLDERS_COUNT, 1)],
                condition: None,
            },
        ];
        match self.store.transact_write(ops).await {
            Ok(()) => {
                info!("badge awarded");
                Ok(true)
            }
            Err(StoreError::ConditionFailed) => Ok(false),
            Err(e) => Err(DomainError::dependency("award badge", e)),
        }
    }

    /// Checks the rule for `action` and awards on success. Returns the
    /// badge type only when it was newly awarded by this call.
    pub async fn evaluate_and_award(&self, user: &str, action: &str) -> Result<Option<String>> {
        match self.check_eligibility(user, action).await? {
            Some(badge) if self.award(user, &badge).await? => Ok(Some(badge)),
            _ => Ok(None),
        }
    }

    /// Every award of `user`, each with the badge's current holder count.
    /// A failed count read reports zero rather than failing the listing.
    #[instrument(skip(self))]
    pub async fn held_badges(&self, user: &str) -> Result<Vec<HeldBadge>> {
        let rows = self
            .store
            .query(Query::partition(USER_BADGES, user))
            .await
            .map_err(|e| DomainError::dependency("list badges", e))?;

        let mut held = Vec::with_capacity(rows.len());
        for row in rows {
            let award: BadgeAward = from_document(USER_BADGES, row)?;
            let holders_count = self.holders_count(&award.badge_type).await;
            held.push(HeldBadge {
                award,
                holders_count,
            });
        }
        Ok(held)
    }

    async fn holders_count(&self, badge_type: &str) -> u64 {
        match self.store.get(BADGE_STATS, &ItemKey::new(badge_type)).await {
            Ok(doc) => counter(doc.as_ref(), HOLDERS_COUNT),
            Err(e) => {
                warn!(badge_type, error = %e, "holder count read failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{Document, MockDocumentStore};
    use serde_json::{json, Value};

    fn rows(values: Vec<Value>) -> Vec<Document> {
        values.into_iter().filter_map(|v| v.as_object().cloned()).collect()
    }

    #[tokio::test]
    async fn unknown_action_is_not_eligible() {
        let svc = BadgeService::new(Arc::new(MockDocumentStore::new()));
        assert_eq!(svc.check_eligibility("a@x.com", "nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn row_count_rule_uses_its_filter() {
        let mut store = MockDocumentStore::new();
        store
            .expect_query()
            .withf(|q| {
                q.table == USER_LIKES
                    && q.filter == Some(Condition::equals(LIKE_STATE, "liked"))
            })
            .returning(|_| Ok(rows((0..10).map(|i| json!({ "contentId": i.to_string() })).collect())));

        let svc = BadgeService::new(Arc::new(store));
        let badge = svc.check_eligibility("a@x.com", MEME_LIKER).await.unwrap();
        assert_eq!(badge.as_deref(), Some(MEME_LIKER));
    }

    #[tokio::test]
    async fn sum_rule_adds_like_counts_across_owned_content() {
        let mut store = MockDocumentStore::new();
        store
            .expect_query()
            .withf(|q| q.index == Some(CONTENT_BY_OWNER))
            .returning(|_| Ok(rows(vec![json!({ "likeCount": 60 }), json!({ "likeCount": 39 })])));

        let svc = BadgeService::new(Arc::new(store));
        assert_eq!(svc.check_eligibility("a@x.com", TREND_SETTER).await.unwrap(), None);
    }

    #[tokio::test]
    async fn award_is_a_noop_when_already_held() {
        let mut store = MockDocumentStore::new();
        store
            .expect_get()
            .returning(|_, _| Ok(json!({ "userEmail": "a@x.com" }).as_object().cloned()));
        store.expect_transact_write().never();

        let svc = BadgeService::new(Arc::new(store));
        assert!(!svc.award("a@x.com", MEME_MASTER).await.unwrap());
    }

    #[tokio::test]
    async fn award_writes_award_and_holder_count_together() {
        let mut store = MockDocumentStore::new();
        store.expect_get().returning(|_, _| Ok(None));
        store
            .expect_transact_write()
            .withf(|ops| {
                matches!(&ops[..], [
                    WriteOp::Put { table: put_table, item, .. },
                    WriteOp::Update { table: update_table, .. },
                ] if *put_table == USER_BADGES
                    && *update_table == BADGE_STATS
                    && item["name"] == json!("Meme Master"))
            })
            .times(1)
            .returning(|_| Ok(()));

        let svc = BadgeService::new(Arc::new(store));
        assert!(svc.award("a@x.com", MEME_MASTER).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_badge_type_cannot_be_awarded() {
        let svc = BadgeService::new(Arc::new(MockDocumentStore::new()));
        let err = svc.award("a@x.com", "goldStar").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn held_badges_report_zero_holders_when_stats_unreadable() {
        let mut store = MockDocumentStore::new();
        store.expect_query().returning(|_| {
            Ok(rows(vec![json!({
                "userEmail": "a@x.com",
                "badgeType": "memeMaster",
                "name": "Meme Master",
                "description": "Uploaded 5 memes.",
                "awardedDate": "2024-05-01T12:00:00Z",
            })]))
        });
        store
            .expect_get()
            .returning(|_, _| Err(StoreError::Unavailable("down".into())));

        let svc = BadgeService::new(Arc::new(store));
        let held = svc.held_badges("a@x.com").await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].holders_count, 0);
        assert_eq!(held[0].award.badge_type, MEME_MASTER);
    }
}
