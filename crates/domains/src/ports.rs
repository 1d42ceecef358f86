//! # Ports
//!
//! Contracts the adapters implement. Services only ever see these traits,
//! so any store, blob backend, or token verifier can be swapped in.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::{AuthError, StoreError};
use crate::models::Principal;

/// A stored item: a flat JSON object of attributes.
pub type Document = Map<String, Value>;

/// Shape of a table: its name and key attribute names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Table {
    pub name: &'static str,
    pub partition_key: &'static str,
    pub sort_key: Option<&'static str>,
}

/// A secondary index, queried by its own partition attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Index {
    pub name: &'static str,
    pub partition_key: &'static str,
}

/// Primary key of one item. All key attributes are strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub partition: String,
    pub sort: Option<String>,
}

impl ItemKey {
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
        }
    }

    pub fn with_sort(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: Some(sort.into()),
        }
    }
}

impl Table {
    /// Extracts the primary key from an item of this table.
    pub fn key_of(&self, item: &Document) -> Result<ItemKey, StoreError> {
        let attr = |name: &str| {
            item.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| StoreError::malformed(self.name, format!("missing key attribute '{name}'")))
        };
        let partition = attr(self.partition_key)?;
        let sort = match self.sort_key {
            Some(name) => Some(attr(name)?),
            None => None,
        };
        Ok(ItemKey { partition, sort })
    }

    /// The key attributes of `key`, laid out as an item.
    pub fn key_document(&self, key: &ItemKey) -> Document {
        let mut doc = Document::new();
        doc.insert(self.partition_key.to_string(), Value::String(key.partition.clone()));
        if let (Some(name), Some(sort)) = (self.sort_key, &key.sort) {
            doc.insert(name.to_string(), Value::String(sort.clone()));
        }
        doc
    }
}

/// Store-side guard evaluated against the current item before a write,
/// or against each candidate item when used as a query/scan filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    ItemExists,
    ItemNotExists,
    Equals { attribute: String, value: Value },
    /// Numeric comparison. A missing attribute never satisfies it.
    GreaterThan { attribute: String, value: i64 },
}

impl Condition {
    pub fn equals(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn greater_than(attribute: impl Into<String>, value: i64) -> Self {
        Condition::GreaterThan {
            attribute: attribute.into(),
            value,
        }
    }

    /// Evaluates the guard against the current version of an item.
    pub fn holds(&self, item: Option<&Document>) -> bool {
        match self {
            Condition::ItemExists => item.is_some(),
            Condition::ItemNotExists => item.is_none(),
            Condition::Equals { attribute, value } => {
                item.and_then(|i| i.get(attribute)) == Some(value)
            }
            Condition::GreaterThan { attribute, value } => item
                .and_then(|i| i.get(attribute))
                .and_then(Value::as_i64)
                .is_some_and(|current| current > *value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    Set { attribute: String, value: Value },
    /// `attribute = if_not_exists(attribute, 0) + by`
    Increment { attribute: String, by: i64 },
}

impl UpdateAction {
    pub fn set(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        UpdateAction::Set {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn increment(attribute: impl Into<String>, by: i64) -> Self {
        UpdateAction::Increment {
            attribute: attribute.into(),
            by,
        }
    }
}

/// One write inside [`DocumentStore::transact_write`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put {
        table: Table,
        item: Document,
        condition: Option<Condition>,
    },
    Update {
        table: Table,
        key: ItemKey,
        actions: Vec<UpdateAction>,
        condition: Option<Condition>,
    },
    Delete {
        table: Table,
        key: ItemKey,
        condition: Option<Condition>,
    },
}

/// Every item whose partition attribute (on the table or on `index`)
/// equals `partition`, optionally narrowed by `filter`.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    pub index: Option<Index>,
    pub partition: String,
    pub filter: Option<Condition>,
}

impl Query {
    pub fn partition(table: Table, partition: impl Into<String>) -> Self {
        Self {
            table,
            index: None,
            partition: partition.into(),
            filter: None,
        }
    }

    pub fn on_index(mut self, index: Index) -> Self {
        self.index = Some(index);
        self
    }

    pub fn filtered(mut self, filter: Condition) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Key/document database contract: single-item reads and writes with
/// store-side conditions, partition queries, scans, and all-or-nothing
/// multi-item transactions.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, table: Table, key: &ItemKey) -> Result<Option<Document>, StoreError>;

    async fn put(
        &self,
        table: Table,
        item: Document,
        condition: Option<Condition>,
    ) -> Result<(), StoreError>;

    /// Applies `actions` to the item, creating it from its key if absent.
    async fn update(
        &self,
        table: Table,
        key: &ItemKey,
        actions: Vec<UpdateAction>,
        condition: Option<Condition>,
    ) -> Result<(), StoreError>;

    async fn delete(
        &self,
        table: Table,
        key: &ItemKey,
        condition: Option<Condition>,
    ) -> Result<(), StoreError>;

    /// Drains every page; callers get the full result set.
    async fn query(&self, query: Query) -> Result<Vec<Document>, StoreError>;

    /// Reads the whole table. O(n) in the table size.
    async fn scan(&self, table: Table, filter: Option<Condition>) -> Result<Vec<Document>, StoreError>;

    /// Checks every condition first; if any fails, returns
    /// [`StoreError::ConditionFailed`] and writes nothing.
    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;
}

/// Binary blob storage for uploaded media.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Deleting a missing object is not an error.
    async fn delete_object(&self, key: &str) -> Result<(), StoreError>;
}

/// External identity-token verification (signature, issuer, audience).
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}
