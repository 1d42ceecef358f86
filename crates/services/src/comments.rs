//! # Comment Service
//!
//! Comments and replies on content, with the counters that hang off them:
//! `commentCount` on the content item, `replyCount` on a parent comment,
//! and the like / dislike tallies of each comment.
//!
//! # Developer Note
//! A comment and the counters it moves are written in one transaction, so
//! a comment either lands with its counts or not at all. Deletion guards
//! `commentCount` at zero; when that guard (or a missing content item)
//! stops the transaction, the comment is still removed on its own.

use std::cmp::Reverse;
use std::sync::Arc;

use chrono::Utc;
use domains::{
    Comment, CommentCounts, CommentPage, Condition, DocumentStore, DomainError, ItemKey, Query,
    Result, StoreError, Table, UpdateAction, WriteOp,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::engagement::aggregate_guard;
use crate::tables::{
    counter, from_document, to_document, COMMENTS, COMMENT_COUNT, CONTENT, DISLIKES_COUNT, EMAIL,
    LIKES_COUNT, REPLY_COUNT,
};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Fields of a comment or reply as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewComment {
    pub content_id: String,
    pub email: String,
    pub username: String,
    pub text: String,
    pub profile_pic: Option<String>,
}

pub struct CommentService {
    store: Arc<dyn DocumentStore>,
}

impl CommentService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Posts a top-level comment, or a reply when `parent` is set.
    #[instrument(skip(self, new), fields(content_id = %new.content_id))]
    pub async fn post(&self, new: NewComment, parent: Option<&str>) -> Result<Comment> {
        if new.text.trim().is_empty() {
            return Err(DomainError::validation("Comment text must not be empty."));
        }
        let comment = Comment {
            comment_id: Uuid::new_v4().to_string(),
            content_id: new.content_id,
            email: new.email,
            username: new.username,
            text: new.text,
            profile_pic: new.profile_pic,
            parent_comment_id: parent.map(str::to_string),
            created_at: Utc::now(),
            likes_count: 0,
            dislikes_count: 0,
            reply_count: 0,
        };

        let mut ops = vec![
            WriteOp::Put {
                table: COMMENTS,
                item: to_document(COMMENTS, &comment)?,
                condition: Some(Condition::ItemNotExists),
            },
            WriteOp::Update {
                table: CONTENT,
                key: ItemKey::new(&comment.content_id),
                actions: vec![UpdateAction::increment(COMMENT_COUNT, 1)],
                condition: Some(Condition::ItemExists),
            },
        ];
        if let Some(parent) = parent {
            ops.push(WriteOp::Update {
                table: COMMENTS,
                key: ItemKey::with_sort(&comment.content_id, parent),
                actions: vec![UpdateAction::increment(REPLY_COUNT, 1)],
                condition: Some(Condition::ItemExists),
            });
        }

        match self.store.transact_write(ops).await {
            Ok(()) => {
                info!(comment_id = %comment.comment_id, "comment posted");
                Ok(comment)
            }
            Err(StoreError::ConditionFailed) => {
                self.require(CONTENT, ItemKey::new(&comment.content_id), "content", &comment.content_id)
                    .await?;
                if let Some(parent) = parent {
                    self.require(
                        COMMENTS,
                        ItemKey::with_sort(&comment.content_id, parent),
                        "comment",
                        parent,
                    )
                    .await?;
                }
                Err(DomainError::Conflict("Comment could not be stored, retry".into()))
            }
            Err(e) => Err(DomainError::dependency("post comment", e)),
        }
    }

    /// Bumps the like and/or dislike tally of one comment and returns both.
    #[instrument(skip(self))]
    pub async fn react(&self, content: &str, comment: &str, like: bool, dislike: bool) -> Result<CommentCounts> {
        let mut actions = Vec::new();
        if like {
            actions.push(UpdateAction::increment(LIKES_COUNT, 1));
        }
        if dislike {
            actions.push(UpdateAction::increment(DISLIKES_COUNT, 1));
        }
        if actions.is_empty() {
            return Err(DomainError::validation("incrementLikes or incrementDislikes is required."));
        }

        let key = ItemKey::with_sort(content, comment);
        match self
            .store
            .update(COMMENTS, &key, actions, Some(Condition::ItemExists))
            .await
        {
            Ok(()) => {}
            Err(StoreError::ConditionFailed) => return Err(DomainError::not_found("comment", comment)),
            Err(e) => return Err(DomainError::dependency("update comment reaction", e)),
        }

        let doc = self
            .store
            .get(COMMENTS, &key)
            .await
            .map_err(|e| DomainError::dependency("read comment", e))?;
        Ok(CommentCounts {
            likes_count: counter(doc.as_ref(), LIKES_COUNT),
            dislikes_count: counter(doc.as_ref(), DISLIKES_COUNT),
        })
    }

    /// Comments on `content`, newest first, `limit` at a time. `after` is
    /// the `last_evaluated_key` of the previous page.
    pub async fn list(&self, content: &str, limit: Option<usize>, after: Option<&str>) -> Result<CommentPage> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let docs = self
            .store
            .query(Query::partition(COMMENTS, content))
            .await
            .map_err(|e| DomainError::dependency("query comments", e))?;
        let mut comments = docs
            .into_iter()
            .map(|doc| from_document::<Comment>(COMMENTS, doc))
            .collect::<Result<Vec<_>>>()?;
        comments.sort_by_key(|c| Reverse((c.created_at, c.comment_id.clone())));

        let start = match after {
            None => 0,
            Some(cursor) => match comments.iter().position(|c| c.comment_id == cursor) {
                Some(at) => at + 1,
                None => return Err(DomainError::validation("Invalid lastEvaluatedKey.")),
            },
        };
        let rest = comments.split_off(start.min(comments.len()));
        let more = rest.len() > limit;
        let page: Vec<Comment> = rest.into_iter().take(limit).collect();
        let last_evaluated_key = if more {
            page.last().map(|c| c.comment_id.clone())
        } else {
            None
        };
        debug!(content, returned = page.len(), more, "comments listed");

        Ok(CommentPage {
            comments: page,
            last_evaluated_key,
        })
    }

    /// Removes a comment written by `acting_user` and lowers the counters
    /// it raised.
    #[instrument(skip(self))]
    pub async fn delete(&self, content: &str, comment_id: &str, acting_user: &str) -> Result<()> {
        let key = ItemKey::with_sort(content, comment_id);
        let doc = self
            .store
            .get(COMMENTS, &key)
            .await
            .map_err(|e| DomainError::dependency("read comment", e))?
            .ok_or_else(|| DomainError::not_found("comment", comment_id))?;
        let comment: Comment = from_document(COMMENTS, doc)?;
        if comment.email != acting_user {
            return Err(DomainError::Forbidden(
                "You are not authorized to delete this comment.".into(),
            ));
        }

        let owned = Condition::equals(EMAIL, acting_user);
        let ops = vec![
            WriteOp::Delete {
                table: COMMENTS,
                key: key.clone(),
                condition: Some(owned.clone()),
            },
            WriteOp::Update {
                table: CONTENT,
                key: ItemKey::new(content),
                actions: vec![UpdateAction::increment(COMMENT_COUNT, -1)],
                condition: Some(aggregate_guard(COMMENT_COUNT, -1)),
            },
        ];
        match self.store.transact_write(ops).await {
            Ok(()) => {}
            Err(StoreError::ConditionFailed) => {
                // The comment is gone, or the content side refused the
                // decrement. Only the first is worth reporting.
                match self.store.delete(COMMENTS, &key, Some(owned)).await {
                    Ok(()) => warn!(content, "commentCount not decremented, comment removed alone"),
                    Err(StoreError::ConditionFailed) => {
                        return Err(DomainError::not_found("comment", comment_id));
                    }
                    Err(e) => return Err(DomainError::dependency("delete comment", e)),
                }
            }
            Err(e) => return Err(DomainError::dependency("delete comment", e)),
        }

        if let Some(parent) = comment.parent_comment_id.as_deref() {
            if let Err(e) = self.decrement_replies(content, parent).await {
                warn!(parent, error = %e, "replyCount not decremented");
            }
        }
        info!("comment deleted");
        Ok(())
    }

    async fn decrement_replies(&self, content: &str, parent: &str) -> Result<()> {
        let result = self
            .store
            .update(
                COMMENTS,
                &ItemKey::with_sort(content, parent),
                vec![UpdateAction::increment(REPLY_COUNT, -1)],
                Some(Condition::greater_than(REPLY_COUNT, 0)),
            )
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(StoreError::ConditionFailed) => {
                debug!(parent, "parent gone or replyCount at zero, decrement skipped");
                Ok(())
            }
            Err(e) => Err(DomainError::dependency("decrement replyCount", e)),
        }
    }

    async fn require(&self, table: Table, key: ItemKey, entity: &'static str, id: &str) -> Result<()> {
        match self.store.get(table, &key).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(DomainError::not_found(entity, id)),
            Err(e) => Err(DomainError::dependency(format!("read {entity}"), e)),
        }
    }
}
