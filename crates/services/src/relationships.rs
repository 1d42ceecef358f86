//! # Relationship Service
//!
//! Follow edges and the follower/following counters on both profiles.
//!
//! # Developer Note
//! Creating an edge and bumping both counters happen in one store
//! transaction guarded on the edge not existing, so a duplicate follow can
//! never double-count. Removal is the other way round: the edge delete is
//! conditional and each decrement is a separate floor-guarded update, so
//! a counter may lag behind the edges but never goes negative.

use std::collections::BTreeMap;
use std::sync::Arc;

use domains::{
    Condition, DocumentStore, DomainError, FollowCounts, FollowStatus, ItemKey, Query,
    Relationship, Result, StoreError, UpdateAction, WriteOp, FOLLOWS,
};
use tracing::{debug, info, instrument, warn};

use crate::tables::{
    counter, string_attr, to_document, FOLLOWEE_ID, FOLLOWERS_COUNT, FOLLOWER_ID, FOLLOWING_COUNT,
    PROFILES, RELATIONSHIPS, RELATIONSHIP_TYPE,
};

pub struct RelationshipService {
    store: Arc<dyn DocumentStore>,
}

impl RelationshipService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Creates the edge `follower -> followee` and bumps both counters.
    ///
    /// Returns the followee's `followersCount` and the follower's
    /// `followingCount` as read after the write.
    #[instrument(skip(self))]
    pub async fn add_follow(&self, follower_id: &str, followee_id: &str) -> Result<FollowCounts> {
        if follower_id == followee_id {
            return Err(DomainError::InvalidOperation(
                "Users cannot follow themselves".into(),
            ));
        }

        let edge = to_document(RELATIONSHIPS, &Relationship::follows(follower_id, followee_id))?;
        let ops = vec![
            WriteOp::Put {
                table: RELATIONSHIPS,
                item: edge,
                condition: Some(Condition::ItemNotExists),
            },
            WriteOp::Update {
                table: PROFILES,
                key: ItemKey::new(followee_id),
                actions: vec![UpdateAction::increment(FOLLOWERS_COUNT, 1)],
                condition: None,
            },
            WriteOp::Update {
                table: PROFILES,
                key: ItemKey::new(follower_id),
                actions: vec![UpdateAction::increment(FOLLOWING_COUNT, 1)],
                condition: None,
            },
        ];

        match self.store.transact_write(ops).await {
            Ok(()) => {}
            Err(StoreError::ConditionFailed) => {
                return Err(DomainError::Conflict("Already following this user".into()));
            }
            Err(e) => return Err(DomainError::dependency("add follow", e)),
        }
        info!("follow created");

        let followers_count = self.profile_counts(followee_id).await?.followers_count;
        let following_count = self.profile_counts(follower_id).await?.following_count;
        Ok(FollowCounts {
            followers_count,
            following_count,
        })
    }

    /// Deletes the edge if present. Returns `false` when there was nothing
    /// to remove, in which case no counter moves.
    #[instrument(skip(self))]
    pub async fn remove_follow(&self, follower_id: &str, followee_id: &str) -> Result<bool> {
        let key = ItemKey::with_sort(follower_id, followee_id);
        match self
            .store
            .delete(RELATIONSHIPS, &key, Some(Condition::ItemExists))
            .await
        {
            Ok(()) => {}
            Err(StoreError::ConditionFailed) => {
                debug!("no follow edge to remove");
                return Ok(false);
            }
            Err(e) => return Err(DomainError::dependency("remove follow", e)),
        }

        self.decrement(followee_id, FOLLOWERS_COUNT).await?;
        self.decrement(follower_id, FOLLOWING_COUNT).await?;
        info!("follow removed");
        Ok(true)
    }

    async fn decrement(&self, user: &str, attribute: &'static str) -> Result<()> {
        let result = self
            .store
            .update(
                PROFILES,
                &ItemKey::new(user),
                vec![UpdateAction::increment(attribute, -1)],
                Some(Condition::greater_than(attribute, 0)),
            )
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(StoreError::ConditionFailed) => {
                warn!(user, attribute, "counter already at zero, decrement skipped");
                Ok(())
            }
            Err(e) => Err(DomainError::dependency(format!("decrement {attribute}"), e)),
        }
    }

    /// Counters on one profile; zero for a profile that was never touched.
    pub async fn profile_counts(&self, user: &str) -> Result<FollowCounts> {
        let doc = self
            .store
            .get(PROFILES, &ItemKey::new(user))
            .await
            .map_err(|e| DomainError::dependency("read profile counters", e))?;
        Ok(FollowCounts {
            followers_count: counter(doc.as_ref(), FOLLOWERS_COUNT),
            following_count: counter(doc.as_ref(), FOLLOWING_COUNT),
        })
    }

    /// Everyone following `user`. Edges are keyed by follower, so this is
    /// a full scan.
    #[instrument(skip(self))]
    pub async fn followers(&self, user: &str) -> Result<Vec<String>> {
        let rows = self
            .store
            .scan(RELATIONSHIPS, Some(Condition::equals(FOLLOWEE_ID, user)))
            .await
            .map_err(|e| DomainError::dependency("list followers", e))?;
        Ok(rows
            .iter()
            .filter(|row| string_attr(row, RELATIONSHIP_TYPE).as_deref() == Some(FOLLOWS))
            .filter_map(|row| string_attr(row, FOLLOWER_ID))
            .collect())
    }

    /// Everyone `user` follows.
    #[instrument(skip(self))]
    pub async fn following(&self, user: &str) -> Result<Vec<String>> {
        let query = Query::partition(RELATIONSHIPS, user)
            .filtered(Condition::equals(RELATIONSHIP_TYPE, FOLLOWS));
        let rows = self
            .store
            .query(query)
            .await
            .map_err(|e| DomainError::dependency("list following", e))?;
        Ok(rows
            .iter()
            .filter_map(|row| string_attr(row, FOLLOWEE_ID))
            .collect())
    }

    /// Never fails: a missing id or a store error degrades to
    /// [`FollowStatus::UNKNOWN`].
    pub async fn follow_status(&self, follower_id: Option<&str>, followee_id: Option<&str>) -> FollowStatus {
        let (Some(follower_id), Some(followee_id)) = (
            follower_id.filter(|s| !s.is_empty()),
            followee_id.filter(|s| !s.is_empty()),
        ) else {
            return FollowStatus::UNKNOWN;
        };

        if follower_id == followee_id {
            return FollowStatus {
                is_following: false,
                can_follow: false,
            };
        }

        match self
            .store
            .get(RELATIONSHIPS, &ItemKey::with_sort(follower_id, followee_id))
            .await
        {
            Ok(edge) => FollowStatus {
                is_following: edge.is_some(),
                can_follow: true,
            },
            Err(e) => {
                warn!(follower_id, followee_id, error = %e, "follow status lookup failed");
                FollowStatus::UNKNOWN
            }
        }
    }

    /// `isFollowing` for each candidate, keyed by candidate.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn batch_follow_status(
        &self,
        user: &str,
        candidates: &[String],
    ) -> BTreeMap<String, bool> {
        let mut statuses = BTreeMap::new();
        for candidate in candidates {
            let status = self.follow_status(Some(user), Some(candidate)).await;
            statuses.insert(candidate.clone(), status.is_following);
        }
        statuses
    }
}
