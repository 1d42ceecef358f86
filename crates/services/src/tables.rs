//! Table catalogue and the typed accessors over raw store documents.
//!
//! Attribute names match the camelCase serde names of the models in
//! `domains`, so a model serializes straight into its table's item shape.

use domains::{Document, DomainError, Index, Table};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub const RELATIONSHIPS: Table = Table {
    name: "relationships",
    partition_key: "followerId",
    sort_key: Some("followeeId"),
};

pub const PROFILES: Table = Table {
    name: "profiles",
    partition_key: "email",
    sort_key: None,
};

pub const USER_LIKES: Table = Table {
    name: "user_likes",
    partition_key: "userEmail",
    sort_key: Some("contentId"),
};

pub const USER_DOWNLOADS: Table = Table {
    name: "user_downloads",
    partition_key: "userEmail",
    sort_key: Some("contentId"),
};

pub const CONTENT: Table = Table {
    name: "content",
    partition_key: "contentId",
    sort_key: None,
};

pub const COMMENTS: Table = Table {
    name: "comments",
    partition_key: "contentId",
    sort_key: Some("commentId"),
};

pub const CONTENT_BY_OWNER: Index = Index {
    name: "ownerEmail-index",
    partition_key: "ownerEmail",
};

pub const USER_BADGES: Table = Table {
    name: "user_badges",
    partition_key: "userEmail",
    sort_key: Some("badgeType"),
};

pub const BADGE_STATS: Table = Table {
    name: "badge_stats",
    partition_key: "badgeType",
    sort_key: None,
};

/// Every table the services touch, for adapters that provision storage.
pub const ALL_TABLES: [Table; 8] = [
    RELATIONSHIPS,
    PROFILES,
    USER_LIKES,
    USER_DOWNLOADS,
    CONTENT,
    COMMENTS,
    USER_BADGES,
    BADGE_STATS,
];

// Attributes
pub const FOLLOWER_ID: &str = "followerId";
pub const FOLLOWEE_ID: &str = "followeeId";
pub const RELATIONSHIP_TYPE: &str = "relationshipType";
pub const FOLLOWERS_COUNT: &str = "followersCount";
pub const FOLLOWING_COUNT: &str = "followingCount";
pub const LIKE_STATE: &str = "likeState";
pub const LIKE_COUNT: &str = "likeCount";
pub const DOWNLOAD_COUNT: &str = "downloadCount";
pub const COMMENT_COUNT: &str = "commentCount";
pub const LIKES_COUNT: &str = "likesCount";
pub const DISLIKES_COUNT: &str = "dislikesCount";
pub const REPLY_COUNT: &str = "replyCount";
pub const EMAIL: &str = "email";
pub const OWNER_EMAIL: &str = "ownerEmail";
pub const HOLDERS_COUNT: &str = "holdersCount";

pub(crate) fn to_document<T: Serialize>(table: Table, value: &T) -> Result<Document, DomainError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DomainError::dependency(
            format!("encode item for {}", table.name),
            domains::StoreError::malformed(table.name, format!("expected an object, got {other}")),
        )),
        Err(e) => Err(DomainError::dependency(
            format!("encode item for {}", table.name),
            domains::StoreError::malformed(table.name, e.to_string()),
        )),
    }
}

pub(crate) fn from_document<T: DeserializeOwned>(table: Table, doc: Document) -> Result<T, DomainError> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| {
        DomainError::dependency(
            format!("decode item from {}", table.name),
            domains::StoreError::malformed(table.name, e.to_string()),
        )
    })
}

/// Reads a non-negative counter, treating absent or non-numeric as zero.
pub(crate) fn counter(doc: Option<&Document>, attribute: &str) -> u64 {
    doc.and_then(|d| d.get(attribute))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

pub(crate) fn string_attr(doc: &Document, attribute: &str) -> Option<String> {
    doc.get(attribute).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::{EngagementRecord, LikeState, Relationship};
    use serde_json::json;

    #[test]
    fn relationship_serializes_into_its_table_key() {
        let doc = to_document(RELATIONSHIPS, &Relationship::follows("a@x.com", "b@x.com")).unwrap();
        let key = RELATIONSHIPS.key_of(&doc).unwrap();
        assert_eq!(key.partition, "a@x.com");
        assert_eq!(key.sort.as_deref(), Some("b@x.com"));
        assert_eq!(doc[RELATIONSHIP_TYPE], json!("follows"));
    }

    #[test]
    fn engagement_record_round_trips_through_a_document() {
        let record = EngagementRecord {
            user_email: "a@x.com".into(),
            content_id: "m1".into(),
            like_state: LikeState::DoubleLiked,
            updated_at: Utc::now(),
        };
        let doc = to_document(USER_LIKES, &record).unwrap();
        assert_eq!(doc[LIKE_STATE], json!("double_liked"));
        assert_eq!(USER_LIKES.key_of(&doc).unwrap().sort.as_deref(), Some("m1"));

        let back: EngagementRecord = from_document(USER_LIKES, doc).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn counter_defaults_to_zero() {
        let doc = json!({ "likeCount": 3, "bad": "x" }).as_object().cloned().unwrap();
        assert_eq!(counter(Some(&doc), LIKE_COUNT), 3);
        assert_eq!(counter(Some(&doc), "bad"), 0);
        assert_eq!(counter(None, LIKE_COUNT), 0);
    }
}
