//! # DynamoDB document store
//!
//! [`DocumentStore`] over `aws-sdk-dynamodb`. Items are converted with
//! `serde_dynamo`, conditions and updates are rendered into expressions
//! with `#aN` / `:vN` placeholders, and multi-page reads are drained.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{AttributeValue, Delete, Put, TransactWriteItem, Update};
use aws_sdk_dynamodb::Client;
use domains::{
    Condition, Document, DocumentStore, ItemKey, Query, StoreError, Table, UpdateAction, WriteOp,
};
use serde_json::Value;
use tracing::{debug, instrument};

type Item = HashMap<String, AttributeValue>;

pub struct DynamoDocumentStore {
    client: Client,
    table_prefix: String,
}

impl DynamoDocumentStore {
    pub fn new(client: Client, table_prefix: impl Into<String>) -> Self {
        Self {
            client,
            table_prefix: table_prefix.into(),
        }
    }

    /// Builds a client from the default AWS provider chain.
    pub async fn connect(region: Option<String>, table_prefix: impl Into<String>) -> Self {
        let sdk = crate::aws::load_sdk_config(region).await;
        Self::new(Client::new(&sdk), table_prefix)
    }

    fn table_name(&self, table: Table) -> String {
        format!("{}{}", self.table_prefix, table.name)
    }

    fn key(&self, table: Table, key: &ItemKey) -> Result<Item, StoreError> {
        to_item(table, &table.key_document(key))
    }

    fn put_op(&self, table: Table, item: Document, condition: Option<Condition>) -> Result<Put, StoreError> {
        let mut expr = Expression::default();
        let condition = condition.map(|c| expr.condition(table, &c)).transpose()?;
        Put::builder()
            .table_name(self.table_name(table))
            .set_item(Some(to_item(table, &item)?))
            .set_condition_expression(condition)
            .set_expression_attribute_names(expr.names())
            .set_expression_attribute_values(expr.values())
            .build()
            .map_err(|e| StoreError::malformed(table.name, e.to_string()))
    }

    fn update_op(
        &self,
        table: Table,
        key: &ItemKey,
        actions: &[UpdateAction],
        condition: Option<Condition>,
    ) -> Result<Update, StoreError> {
        let mut expr = Expression::default();
        let update = expr.update(table, actions)?;
        let condition = condition.map(|c| expr.condition(table, &c)).transpose()?;
        Update::builder()
            .table_name(self.table_name(table))
            .set_key(Some(self.key(table, key)?))
            .update_expression(update)
            .set_condition_expression(condition)
            .set_expression_attribute_names(expr.names())
            .set_expression_attribute_values(expr.values())
            .build()
            .map_err(|e| StoreError::malformed(table.name, e.to_string()))
    }

    fn delete_op(&self, table: Table, key: &ItemKey, condition: Option<Condition>) -> Result<Delete, StoreError> {
        let mut expr = Expression::default();
        let condition = condition.map(|c| expr.condition(table, &c)).transpose()?;
        Delete::builder()
            .table_name(self.table_name(table))
            .set_key(Some(self.key(table, key)?))
            .set_condition_expression(condition)
            .set_expression_attribute_names(expr.names())
            .set_expression_attribute_values(expr.values())
            .build()
            .map_err(|e| StoreError::malformed(table.name, e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for DynamoDocumentStore {
    async fn get(&self, table: Table, key: &ItemKey) -> Result<Option<Document>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(self.table_name(table))
            .set_key(Some(self.key(table, key)?))
            .consistent_read(true)
            .send()
            .await
            .map_err(unavailable)?;
        output.item.map(|item| from_item(table, item)).transpose()
    }

    async fn put(&self, table: Table, item: Document, condition: Option<Condition>) -> Result<(), StoreError> {
        let op = self.put_op(table, item, condition)?;
        self.client
            .put_item()
            .table_name(op.table_name)
            .set_item(Some(op.item))
            .set_condition_expression(op.condition_expression)
            .set_expression_attribute_names(op.expression_attribute_names)
            .set_expression_attribute_values(op.expression_attribute_values)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                err if err.is_conditional_check_failed_exception() => StoreError::ConditionFailed,
                err => StoreError::Unavailable(DisplayErrorContext(err).to_string()),
            })?;
        Ok(())
    }

    async fn update(
        &self,
        table: Table,
        key: &ItemKey,
        actions: Vec<UpdateAction>,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        let op = self.update_op(table, key, &actions, condition)?;
        self.client
            .update_item()
            .table_name(op.table_name)
            .set_key(Some(op.key))
            .update_expression(op.update_expression)
            .set_condition_expression(op.condition_expression)
            .set_expression_attribute_names(op.expression_attribute_names)
            .set_expression_attribute_values(op.expression_attribute_values)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                err if err.is_conditional_check_failed_exception() => StoreError::ConditionFailed,
                err => StoreError::Unavailable(DisplayErrorContext(err).to_string()),
            })?;
        Ok(())
    }

    async fn delete(&self, table: Table, key: &ItemKey, condition: Option<Condition>) -> Result<(), StoreError> {
        let op = self.delete_op(table, key, condition)?;
        self.client
            .delete_item()
            .table_name(op.table_name)
            .set_key(Some(op.key))
            .set_condition_expression(op.condition_expression)
            .set_expression_attribute_names(op.expression_attribute_names)
            .set_expression_attribute_values(op.expression_attribute_values)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                err if err.is_conditional_check_failed_exception() => StoreError::ConditionFailed,
                err => StoreError::Unavailable(DisplayErrorContext(err).to_string()),
            })?;
        Ok(())
    }

    #[instrument(skip(self, query), fields(table = query.table.name))]
    async fn query(&self, query: Query) -> Result<Vec<Document>, StoreError> {
        let table = query.table;
        let mut expr = Expression::default();
        let partition_attr = query.index.map_or(table.partition_key, |i| i.partition_key);
        let key_condition = format!(
            "{} = {}",
            expr.name(partition_attr),
            expr.value(table, &Value::String(query.partition.clone()))?
        );
        let filter = query.filter.as_ref().map(|c| expr.condition(table, c)).transpose()?;

        let mut rows = Vec::new();
        let mut start: Option<Item> = None;
        loop {
            let output = self
                .client
                .query()
                .table_name(self.table_name(table))
                .set_index_name(query.index.map(|i| i.name.to_string()))
                .key_condition_expression(&key_condition)
                .set_filter_expression(filter.clone())
                .set_expression_attribute_names(expr.names())
                .set_expression_attribute_values(expr.values())
                .set_exclusive_start_key(start.take())
                .send()
                .await
                .map_err(unavailable)?;
            for item in output.items.unwrap_or_default() {
                rows.push(from_item(table, item)?);
            }
            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start = Some(key),
                _ => break,
            }
        }
        debug!(rows = rows.len(), "query drained");
        Ok(rows)
    }

    #[instrument(skip(self, filter), fields(table = table.name))]
    async fn scan(&self, table: Table, filter: Option<Condition>) -> Result<Vec<Document>, StoreError> {
        let mut expr = Expression::default();
        let filter = filter.as_ref().map(|c| expr.condition(table, c)).transpose()?;

        let mut rows = Vec::new();
        let mut start: Option<Item> = None;
        loop {
            let output = self
                .client
                .scan()
                .table_name(self.table_name(table))
                .set_filter_expression(filter.clone())
                .set_expression_attribute_names(expr.names())
                .set_expression_attribute_values(expr.values())
                .set_exclusive_start_key(start.take())
                .send()
                .await
                .map_err(unavailable)?;
            for item in output.items.unwrap_or_default() {
                rows.push(from_item(table, item)?);
            }
            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start = Some(key),
                _ => break,
            }
        }
        debug!(rows = rows.len(), "scan drained");
        Ok(rows)
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut items = Vec::with_capacity(ops.len());
        for op in ops {
            let item = match op {
                WriteOp::Put { table, item, condition } => {
                    TransactWriteItem::builder().put(self.put_op(table, item, condition)?)
                }
                WriteOp::Update { table, key, actions, condition } => {
                    TransactWriteItem::builder().update(self.update_op(table, &key, &actions, condition)?)
                }
                WriteOp::Delete { table, key, condition } => {
                    TransactWriteItem::builder().delete(self.delete_op(table, &key, condition)?)
                }
            };
            items.push(item.build());
        }

        self.client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                let condition_failed = match &err {
                    TransactWriteItemsError::TransactionCanceledException(cancel) => cancel
                        .cancellation_reasons()
                        .iter()
                        .any(|r| r.code() == Some("ConditionalCheckFailed")),
                    _ => false,
                };
                if condition_failed {
                    StoreError::ConditionFailed
                } else {
                    StoreError::Unavailable(DisplayErrorContext(err).to_string())
                }
            })?;
        Ok(())
    }
}

fn unavailable<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    StoreError::Unavailable(DisplayErrorContext(err).to_string())
}

fn to_item(table: Table, doc: &Document) -> Result<Item, StoreError> {
    serde_dynamo::to_item(doc).map_err(|e| StoreError::malformed(table.name, e.to_string()))
}

fn from_item(table: Table, item: Item) -> Result<Document, StoreError> {
    serde_dynamo::from_item(item).map_err(|e| StoreError::malformed(table.name, e.to_string()))
}

/// Placeholder bookkeeping for one request's expressions.
#[derive(Default)]
struct Expression {
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl Expression {
    fn name(&mut self, attribute: &str) -> String {
        if let Some((placeholder, _)) = self.names.iter().find(|(_, a)| a.as_str() == attribute) {
            return placeholder.clone();
        }
        let placeholder = format!("#a{}", self.names.len());
        self.names.insert(placeholder.clone(), attribute.to_string());
        placeholder
    }

    fn value(&mut self, table: Table, value: &Value) -> Result<String, StoreError> {
        let placeholder = format!(":v{}", self.values.len());
        let value = serde_dynamo::to_attribute_value(value)
            .map_err(|e| StoreError::malformed(table.name, e.to_string()))?;
        self.values.insert(placeholder.clone(), value);
        Ok(placeholder)
    }

    fn condition(&mut self, table: Table, condition: &Condition) -> Result<String, StoreError> {
        Ok(match condition {
            Condition::ItemExists => format!("attribute_exists({})", self.name(table.partition_key)),
            Condition::ItemNotExists => format!("attribute_not_exists({})", self.name(table.partition_key)),
            Condition::Equals { attribute, value } => {
                format!("{} = {}", self.name(attribute), self.value(table, value)?)
            }
            Condition::GreaterThan { attribute, value } => {
                format!("{} > {}", self.name(attribute), self.value(table, &Value::from(*value))?)
            }
        })
    }

    fn update(&mut self, table: Table, actions: &[UpdateAction]) -> Result<String, StoreError> {
        let mut clauses = Vec::with_capacity(actions.len());
        for action in actions {
            clauses.push(match action {
                UpdateAction::Set { attribute, value } => {
                    format!("{} = {}", self.name(attribute), self.value(table, value)?)
                }
                UpdateAction::Increment { attribute, by } => {
                    let name = self.name(attribute);
                    let zero = self.value(table, &Value::from(0))?;
                    let by = self.value(table, &Value::from(*by))?;
                    format!("{name} = if_not_exists({name}, {zero}) + {by}")
                }
            });
        }
        Ok(format!("SET {}", clauses.join(", ")))
    }

    /// DynamoDB rejects empty placeholder maps, so empty means absent.
    fn names(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }

    fn values(&self) -> Option<HashMap<String, AttributeValue>> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }
}
