//! # Domain Models
//!
//! Entities of the social graph and the engagement counters. Users are
//! identified by email, content items by the id assigned at upload.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relationship type stored on every follow edge.
pub const FOLLOWS: &str = "follows";

/// A directed follow edge. `(follower_id, followee_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub follower_id: String,
    pub followee_id: String,
    pub relationship_type: String,
}

impl Relationship {
    pub fn follows(follower_id: &str, followee_id: &str) -> Self {
        Self {
            follower_id: follower_id.to_string(),
            followee_id: followee_id.to_string(),
            relationship_type: FOLLOWS.to_string(),
        }
    }
}

/// Denormalized counters on a profile. Never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowCounts {
    pub followers_count: u64,
    pub following_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowStatus {
    pub is_following: bool,
    pub can_follow: bool,
}

impl FollowStatus {
    /// What callers see when either side is unknown or the lookup failed.
    pub const UNKNOWN: FollowStatus = FollowStatus {
        is_following: false,
        can_follow: true,
    };
}

/// Per-user reaction state on one content item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeState {
    #[default]
    None,
    Liked,
    DoubleLiked,
}

/// The two reaction toggles a user can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeAction {
    Like,
    DoubleLike,
}

/// Result of applying a [`LikeAction`] to a [`LikeState`].
///
/// `delta` is the amount the content's `likeCount` moves by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: LikeState,
    pub to: LikeState,
    pub delta: i64,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.delta == 0
    }
}

impl LikeState {
    /// Weight of this state in the content's `likeCount`.
    pub fn weight(self) -> i64 {
        match self {
            LikeState::None => 0,
            LikeState::Liked => 1,
            LikeState::DoubleLiked => 2,
        }
    }

    /// The full transition table. The delta is always the change in
    /// [`weight`](Self::weight), so `likeCount` equals the sum of weights.
    ///
    /// | from \ action | Like          | DoubleLike      |
    /// |---------------|---------------|-----------------|
    /// | None          | Liked, +1     | DoubleLiked, +2 |
    /// | Liked         | None, -1      | DoubleLiked, +1 |
    /// | DoubleLiked   | unchanged, 0  | None, -2        |
    pub fn apply(self, action: LikeAction) -> Transition {
        let to = match (self, action) {
            (LikeState::None, LikeAction::Like) => LikeState::Liked,
            (LikeState::Liked, LikeAction::Like) => LikeState::None,
            (LikeState::DoubleLiked, LikeAction::Like) => LikeState::DoubleLiked,
            (LikeState::DoubleLiked, LikeAction::DoubleLike) => LikeState::None,
            (_, LikeAction::DoubleLike) => LikeState::DoubleLiked,
        };
        Transition {
            from: self,
            to,
            delta: to.weight() - self.weight(),
        }
    }

    pub fn is_liked(self) -> bool {
        self == LikeState::Liked
    }

    pub fn is_double_liked(self) -> bool {
        self == LikeState::DoubleLiked
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LikeState::None => "none",
            LikeState::Liked => "liked",
            LikeState::DoubleLiked => "double_liked",
        }
    }
}

impl fmt::Display for LikeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LikeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(LikeState::None),
            "liked" => Ok(LikeState::Liked),
            "double_liked" => Ok(LikeState::DoubleLiked),
            other => Err(format!("unknown like state '{other}'")),
        }
    }
}

/// At most one per (user, content) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementRecord {
    pub user_email: String,
    pub content_id: String,
    pub like_state: LikeState,
    pub updated_at: DateTime<Utc>,
}

/// Presence of the record is the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub user_email: String,
    pub content_id: String,
    pub downloaded_at: DateTime<Utc>,
}

/// A content item with its aggregate counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub content_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    /// Object-store key of the uploaded media, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_key: Option<String>,
}

/// A comment on a content item. Replies carry their parent's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub content_id: String,
    pub comment_id: String,
    pub email: String,
    pub username: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub dislikes_count: u64,
    #[serde(default)]
    pub reply_count: u64,
}

/// Reaction counters of one comment after an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentCounts {
    pub likes_count: u64,
    pub dislikes_count: u64,
}

/// Newest-first page of comments. `last_evaluated_key` is the cursor for
/// the next page, absent on the last one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    pub comments: Vec<Comment>,
    pub last_evaluated_key: Option<String>,
}

/// Content aggregate joined with one user's reaction flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeStatus {
    #[serde(flatten)]
    pub content: ContentItem,
    pub liked: bool,
    pub double_liked: bool,
}

/// Outcome of one `updateMemeReaction` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionOutcome {
    pub like_state: LikeState,
    pub like_delta: i64,
    pub downloaded: bool,
    pub badge_earned: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeAward {
    pub user_email: String,
    pub badge_type: String,
    pub name: String,
    pub description: String,
    pub awarded_date: DateTime<Utc>,
}

/// An award annotated with the badge's global holder count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeldBadge {
    #[serde(flatten)]
    pub award: BadgeAward,
    pub holders_count: u64,
}

/// The authenticated caller, as reported by the identity verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl Principal {
    /// True when this principal may act as `user`.
    pub fn acts_as(&self, user: &str) -> bool {
        self.email.as_deref() == Some(user)
            || self.username.as_deref() == Some(user)
            || self.subject == user
    }
}
