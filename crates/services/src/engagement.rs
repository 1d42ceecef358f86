//! # Engagement Service
//!
//! Per-user reaction state on content (like / double-like / download) and
//! the aggregate counters on the content item.
//!
//! # Developer Note
//! Each like transition is computed from the record as read, then written
//! back in a transaction guarded on that same prior state together with
//! the `likeCount` adjustment. A concurrent reaction in between makes the
//! guard fail, and the caller sees a conflict instead of a counter that
//! has drifted from the per-user states.
//!
//! Aggregate writes require the content item to exist, so reacting to
//! deleted content never recreates it. A decrement is also guarded on the
//! counter staying at or above zero.

use std::sync::Arc;

use chrono::Utc;
use domains::{
    Condition, ContentItem, Document, DocumentStore, DomainError, DownloadRecord, EngagementRecord,
    ItemKey, LikeAction, LikeState, LikeStatus, ReactionOutcome, Result, StoreError, Transition,
    UpdateAction, WriteOp,
};
use tracing::{debug, info, instrument, warn};

use crate::badges::{BadgeService, MEME_COLLECTOR, MEME_LIKER};
use crate::tables::{
    from_document, to_document, CONTENT, DOWNLOAD_COUNT, LIKE_COUNT, LIKE_STATE, USER_DOWNLOADS,
    USER_LIKES,
};

/// One `updateMemeReaction` request. `double_like` wins over `like` when
/// both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reaction {
    pub content_id: String,
    pub user_email: String,
    pub like: bool,
    pub double_like: bool,
    pub download: bool,
}

impl Reaction {
    pub fn like_action(&self) -> Option<LikeAction> {
        if self.double_like {
            Some(LikeAction::DoubleLike)
        } else if self.like {
            Some(LikeAction::Like)
        } else {
            None
        }
    }
}

pub struct EngagementService {
    store: Arc<dyn DocumentStore>,
    badges: Arc<BadgeService>,
}

impl EngagementService {
    pub fn new(store: Arc<dyn DocumentStore>, badges: Arc<BadgeService>) -> Self {
        Self { store, badges }
    }

    /// Applies the like transition and/or the download, then checks the
    /// matching badge rule for anything that moved.
    #[instrument(skip(self, reaction), fields(content_id = %reaction.content_id, user = %reaction.user_email))]
    pub async fn react(&self, reaction: &Reaction) -> Result<ReactionOutcome> {
        let user = reaction.user_email.as_str();
        let content = reaction.content_id.as_str();

        let mut outcome = ReactionOutcome {
            like_state: LikeState::None,
            like_delta: 0,
            downloaded: false,
            badge_earned: None,
        };

        match reaction.like_action() {
            Some(action) => {
                let transition = self.apply_like(user, content, action).await?;
                outcome.like_state = transition.to;
                outcome.like_delta = transition.delta;
                if transition.delta > 0 {
                    outcome.badge_earned = self.try_award(user, MEME_LIKER).await;
                }
            }
            None => outcome.like_state = self.like_state(user, content).await?,
        }

        if reaction.download {
            outcome.downloaded = self.record_download(user, content).await?;
            if outcome.downloaded {
                if let Some(badge) = self.try_award(user, MEME_COLLECTOR).await {
                    outcome.badge_earned = Some(badge);
                }
            }
        }

        Ok(outcome)
    }

    /// Runs one step of the like state machine for `(user, content)`.
    pub async fn apply_like(&self, user: &str, content: &str, action: LikeAction) -> Result<Transition> {
        let key = ItemKey::with_sort(user, content);
        let current = self
            .store
            .get(USER_LIKES, &key)
            .await
            .map_err(|e| DomainError::dependency("read engagement record", e))?;

        let existed = current.is_some();
        let from = match current {
            Some(doc) => from_document::<EngagementRecord>(USER_LIKES, doc)?.like_state,
            None => LikeState::None,
        };
        let transition = from.apply(action);
        if transition.is_noop() {
            debug!(state = %from, "reaction ignored in current state");
            return Ok(transition);
        }

        // Compare-and-swap on the state the transition was computed from.
        // A record left at `none` by an earlier toggle still exists.
        let guard = if existed {
            Condition::equals(LIKE_STATE, from.as_str())
        } else {
            Condition::ItemNotExists
        };

        let record = EngagementRecord {
            user_email: user.to_string(),
            content_id: content.to_string(),
            like_state: transition.to,
            updated_at: Utc::now(),
        };
        let record = to_document(USER_LIKES, &record)?;
        let ops = vec![
            WriteOp::Put {
                table: USER_LIKES,
                item: record.clone(),
                condition: Some(guard.clone()),
            },
            WriteOp::Update {
                table: CONTENT,
                key: ItemKey::new(content),
                actions: vec![UpdateAction::increment(LIKE_COUNT, transition.delta)],
                condition: Some(aggregate_guard(LIKE_COUNT, transition.delta)),
            },
        ];

        match self.store.transact_write(ops).await {
            Ok(()) => {
                info!(from = %transition.from, to = %transition.to, delta = transition.delta, "reaction applied");
                Ok(transition)
            }
            Err(StoreError::ConditionFailed) => self.settle_like(&key, content, transition, record, guard).await,
            Err(e) => Err(DomainError::dependency("apply reaction", e)),
        }
    }

    /// Finds out which guard stopped a like transaction. Missing content is
    /// not found and a moved like record is a conflict. Otherwise the
    /// decrement hit the floor: the record is written alone and the
    /// aggregate stays at zero.
    async fn settle_like(
        &self,
        key: &ItemKey,
        content: &str,
        transition: Transition,
        record: Document,
        guard: Condition,
    ) -> Result<Transition> {
        self.require_content(content).await?;
        let now = self
            .store
            .get(USER_LIKES, key)
            .await
            .map_err(|e| DomainError::dependency("read engagement record", e))?;
        if transition.delta >= 0 || !guard.holds(now.as_ref()) {
            return Err(raced());
        }

        match self.store.put(USER_LIKES, record, Some(guard)).await {
            Ok(()) => {
                warn!(content, from = %transition.from, to = %transition.to, "likeCount already at zero");
                Ok(Transition { delta: 0, ..transition })
            }
            Err(StoreError::ConditionFailed) => Err(raced()),
            Err(e) => Err(DomainError::dependency("apply reaction", e)),
        }
    }

    /// `NotFound` unless the content item exists.
    async fn require_content(&self, content: &str) -> Result<()> {
        match self.store.get(CONTENT, &ItemKey::new(content)).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(DomainError::not_found("content", content)),
            Err(e) => Err(DomainError::dependency("read content", e)),
        }
    }

    /// First download of `content` by `user` adds one to `downloadCount`.
    /// Returns `false` for a repeat, which changes nothing.
    pub async fn record_download(&self, user: &str, content: &str) -> Result<bool> {
        let record = DownloadRecord {
            user_email: user.to_string(),
            content_id: content.to_string(),
            downloaded_at: Utc::now(),
        };
        let ops = vec![
            WriteOp::Put {
                table: USER_DOWNLOADS,
                item: to_document(USER_DOWNLOADS, &record)?,
                condition: Some(Condition::ItemNotExists),
            },
            WriteOp::Update {
                table: CONTENT,
                key: ItemKey::new(content),
                actions: vec![UpdateAction::increment(DOWNLOAD_COUNT, 1)],
                condition: Some(Condition::ItemExists),
            },
        ];

        match self.store.transact_write(ops).await {
            Ok(()) => {
                info!(content, "download recorded");
                Ok(true)
            }
            Err(StoreError::ConditionFailed) => {
                self.require_content(content).await?;
                debug!(content, "already downloaded");
                Ok(false)
            }
            Err(e) => Err(DomainError::dependency("record download", e)),
        }
    }

    /// Drops the user's download record. `downloadCount` is a lifetime
    /// total and stays as it is.
    #[instrument(skip(self))]
    pub async fn remove_download(&self, user: &str, content: &str) -> Result<bool> {
        match self
            .store
            .delete(
                USER_DOWNLOADS,
                &ItemKey::with_sort(user, content),
                Some(Condition::ItemExists),
            )
            .await
        {
            Ok(()) => Ok(true),
            Err(StoreError::ConditionFailed) => Ok(false),
            Err(e) => Err(DomainError::dependency("remove download", e)),
        }
    }

    pub async fn like_state(&self, user: &str, content: &str) -> Result<LikeState> {
        let doc = self
            .store
            .get(USER_LIKES, &ItemKey::with_sort(user, content))
            .await
            .map_err(|e| DomainError::dependency("read engagement record", e))?;
        match doc {
            Some(doc) => Ok(from_document::<EngagementRecord>(USER_LIKES, doc)?.like_state),
            None => Ok(LikeState::None),
        }
    }

    /// The content aggregate joined with `user`'s reaction flags. Content
    /// nobody has reacted to yet reports zero counters.
    #[instrument(skip(self))]
    pub async fn like_status(&self, content: &str, user: &str) -> Result<LikeStatus> {
        let doc = self
            .store
            .get(CONTENT, &ItemKey::new(content))
            .await
            .map_err(|e| DomainError::dependency("read content", e))?;
        let item = match doc {
            Some(doc) => from_document::<ContentItem>(CONTENT, doc)?,
            None => ContentItem {
                content_id: content.to_string(),
                ..ContentItem::default()
            },
        };
        let state = self.like_state(user, content).await?;

        Ok(LikeStatus {
            content: item,
            liked: state.is_liked(),
            double_liked: state.is_double_liked(),
        })
    }

    async fn try_award(&self, user: &str, action: &str) -> Option<String> {
        match self.badges.evaluate_and_award(user, action).await {
            Ok(badge) => badge,
            Err(e) => {
                warn!(user, action, error = %e, "badge evaluation failed");
                None
            }
        }
    }
}

/// Guard for an aggregate adjustment: the item must exist, and a decrement
/// may not take the counter below zero.
pub(crate) fn aggregate_guard(attribute: &str, delta: i64) -> Condition {
    if delta < 0 {
        Condition::greater_than(attribute, -delta - 1)
    } else {
        Condition::ItemExists
    }
}

fn raced() -> DomainError {
    DomainError::Conflict("Reaction changed concurrently, retry".into())
}
