//! # In-memory adapters
//!
//! Process-local implementations of [`DocumentStore`] and [`ObjectStore`]
//! backed by `DashMap`. Used by the test suites and by the `memory` store
//! backend for local runs.
//!
//! # Developer Note
//! Reads go straight to the map. Every write, single or transactional,
//! takes one store-wide gate so that evaluating a condition and applying
//! the write cannot interleave with another writer, which gives the same
//! per-item compare-and-swap guarantee a real document database does.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use domains::{
    Condition, Document, DocumentStore, ItemKey, ObjectStore, Query, StoreError, Table,
    UpdateAction, WriteOp,
};
use serde_json::Value;
use tracing::trace;

type Slot = (&'static str, ItemKey);

#[derive(Default)]
pub struct InMemoryDocumentStore {
    items: DashMap<Slot, Document>,
    gate: Mutex<()>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items currently held in `table`.
    pub fn count(&self, table: Table) -> usize {
        self.items.iter().filter(|e| e.key().0 == table.name).count()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The gate protects no data of its own.
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self, table: Table, key: &ItemKey) -> Option<Document> {
        self.items.get(&(table.name, key.clone())).map(|e| e.value().clone())
    }

    fn check(&self, table: Table, key: &ItemKey, condition: Option<&Condition>) -> Result<(), StoreError> {
        match condition {
            Some(c) if !c.holds(self.current(table, key).as_ref()) => Err(StoreError::ConditionFailed),
            _ => Ok(()),
        }
    }

    fn target(op: &WriteOp) -> Result<(Table, ItemKey, Option<&Condition>), StoreError> {
        Ok(match op {
            WriteOp::Put { table, item, condition } => (*table, table.key_of(item)?, condition.as_ref()),
            WriteOp::Update { table, key, condition, .. } => (*table, key.clone(), condition.as_ref()),
            WriteOp::Delete { table, key, condition } => (*table, key.clone(), condition.as_ref()),
        })
    }

    fn apply(&self, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::Put { table, item, .. } => {
                let key = table.key_of(&item)?;
                self.items.insert((table.name, key), item);
            }
            WriteOp::Update { table, key, actions, .. } => {
                let mut item = self
                    .current(table, &key)
                    .unwrap_or_else(|| table.key_document(&key));
                for action in actions {
                    apply_action(&mut item, action);
                }
                self.items.insert((table.name, key), item);
            }
            WriteOp::Delete { table, key, .. } => {
                self.items.remove(&(table.name, key));
            }
        }
        Ok(())
    }

    fn write(&self, op: WriteOp) -> Result<(), StoreError> {
        let _gate = self.lock();
        let (table, key, condition) = Self::target(&op)?;
        self.check(table, &key, condition)?;
        self.apply(op)
    }

    fn matching(&self, table: Table, filter: Option<&Condition>, keep: impl Fn(&ItemKey, &Document) -> bool) -> Vec<Document> {
        let sorted: BTreeMap<ItemKey, Document> = self
            .items
            .iter()
            .filter(|e| e.key().0 == table.name)
            .filter(|e| keep(&e.key().1, e.value()))
            .filter(|e| filter.map_or(true, |c| c.holds(Some(e.value()))))
            .map(|e| (e.key().1.clone(), e.value().clone()))
            .collect();
        sorted.into_values().collect()
    }
}

fn apply_action(item: &mut Document, action: UpdateAction) {
    match action {
        UpdateAction::Set { attribute, value } => {
            item.insert(attribute, value);
        }
        UpdateAction::Increment { attribute, by } => {
            let current = item.get(&attribute).and_then(Value::as_i64).unwrap_or(0);
            item.insert(attribute, Value::from(current + by));
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, table: Table, key: &ItemKey) -> Result<Option<Document>, StoreError> {
        Ok(self.current(table, key))
    }

    async fn put(&self, table: Table, item: Document, condition: Option<Condition>) -> Result<(), StoreError> {
        self.write(WriteOp::Put { table, item, condition })
    }

    async fn update(
        &self,
        table: Table,
        key: &ItemKey,
        actions: Vec<UpdateAction>,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        self.write(WriteOp::Update {
            table,
            key: key.clone(),
            actions,
            condition,
        })
    }

    async fn delete(&self, table: Table, key: &ItemKey, condition: Option<Condition>) -> Result<(), StoreError> {
        self.write(WriteOp::Delete {
            table,
            key: key.clone(),
            condition,
        })
    }

    async fn query(&self, query: Query) -> Result<Vec<Document>, StoreError> {
        let Query { table, index, partition, filter } = query;
        let rows = self.matching(table, filter.as_ref(), |key, doc| match index {
            Some(index) => doc.get(index.partition_key).and_then(Value::as_str) == Some(partition.as_str()),
            None => key.partition == partition,
        });
        trace!(table = table.name, rows = rows.len(), "query");
        Ok(rows)
    }

    async fn scan(&self, table: Table, filter: Option<Condition>) -> Result<Vec<Document>, StoreError> {
        Ok(self.matching(table, filter.as_ref(), |_, _| true))
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let _gate = self.lock();
        for op in &ops {
            let (table, key, condition) = Self::target(op)?;
            self.check(table, &key, condition)?;
        }
        for op in ops {
            self.apply(op)?;
        }
        Ok(())
    }
}

/// Blob store kept in a map; mainly for tests that assert on deletions.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<String, Bytes>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, body: impl Into<Bytes>) {
        self.objects.insert(key.into(), body.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.objects.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COUNTERS: Table = Table {
        name: "counters",
        partition_key: "id",
        sort_key: None,
    };

    const EDGES: Table = Table {
        name: "edges",
        partition_key: "from",
        sort_key: Some("to"),
    };

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn update_creates_missing_item_from_its_key() {
        let store = InMemoryDocumentStore::new();
        let key = ItemKey::new("c1");
        store
            .update(COUNTERS, &key, vec![UpdateAction::increment("n", 2)], None)
            .await
            .unwrap();

        let item = store.get(COUNTERS, &key).await.unwrap().unwrap();
        assert_eq!(item, doc(json!({ "id": "c1", "n": 2 })));
    }

    #[tokio::test]
    async fn conditional_put_refuses_to_overwrite() {
        let store = InMemoryDocumentStore::new();
        let item = doc(json!({ "from": "a", "to": "b" }));
        store.put(EDGES, item.clone(), Some(Condition::ItemNotExists)).await.unwrap();

        let again = store.put(EDGES, item, Some(Condition::ItemNotExists)).await;
        assert_eq!(again, Err(StoreError::ConditionFailed));
    }

    #[tokio::test]
    async fn guarded_decrement_stops_at_zero() {
        let store = InMemoryDocumentStore::new();
        let key = ItemKey::new("c1");
        let dec = || vec![UpdateAction::increment("n", -1)];

        store.update(COUNTERS, &key, vec![UpdateAction::increment("n", 1)], None).await.unwrap();
        store.update(COUNTERS, &key, dec(), Some(Condition::greater_than("n", 0))).await.unwrap();
        let floor = store.update(COUNTERS, &key, dec(), Some(Condition::greater_than("n", 0))).await;

        assert_eq!(floor, Err(StoreError::ConditionFailed));
        let item = store.get(COUNTERS, &key).await.unwrap().unwrap();
        assert_eq!(item["n"], json!(0));
    }

    #[tokio::test]
    async fn failed_transaction_writes_nothing() {
        let store = InMemoryDocumentStore::new();
        store.put(EDGES, doc(json!({ "from": "a", "to": "b" })), None).await.unwrap();

        let result = store
            .transact_write(vec![
                WriteOp::Update {
                    table: COUNTERS,
                    key: ItemKey::new("c1"),
                    actions: vec![UpdateAction::increment("n", 1)],
                    condition: None,
                },
                WriteOp::Put {
                    table: EDGES,
                    item: doc(json!({ "from": "a", "to": "b" })),
                    condition: Some(Condition::ItemNotExists),
                },
            ])
            .await;

        assert_eq!(result, Err(StoreError::ConditionFailed));
        assert_eq!(store.get(COUNTERS, &ItemKey::new("c1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn query_by_partition_and_by_index() {
        let store = InMemoryDocumentStore::new();
        for (from, to, owner) in [("a", "b", "x"), ("a", "c", "y"), ("d", "a", "x")] {
            store
                .put(EDGES, doc(json!({ "from": from, "to": to, "owner": owner })), None)
                .await
                .unwrap();
        }

        let by_partition = store.query(Query::partition(EDGES, "a")).await.unwrap();
        assert_eq!(by_partition.len(), 2);

        let index = domains::Index { name: "owner-index", partition_key: "owner" };
        let by_owner = store.query(Query::partition(EDGES, "x").on_index(index)).await.unwrap();
        assert_eq!(by_owner.len(), 2);

        let filtered = store
            .scan(EDGES, Some(Condition::equals("to", "a")))
            .await
            .unwrap();
        assert_eq!(filtered, vec![doc(json!({ "from": "d", "to": "a", "owner": "x" }))]);
    }

    #[tokio::test]
    async fn deleting_a_missing_object_is_fine() {
        let objects = InMemoryObjectStore::new();
        objects.insert("k", Bytes::from_static(b"img"));
        objects.delete_object("k").await.unwrap();
        objects.delete_object("k").await.unwrap();
        assert!(!objects.contains("k"));
    }
}
