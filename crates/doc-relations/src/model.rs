//! Host model contract
//!
//! The relation layer never constructs or destroys records. It reads and
//! mutates fields on records handed to it, persists them through `save`, and
//! assigns eagerly loaded results into relation slots.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelationResult;
use crate::identifier::{from_value, reduce_to_key, Identifier};

/// Default key field of document models
pub const DEFAULT_KEY_NAME: &str = "_id";

/// Record handle into the host model
#[async_trait]
pub trait Record: Send + Sync + Debug {
    /// Model name used in errors and logs
    fn model_name(&self) -> &str;

    /// Name of the key field
    fn key_name(&self) -> &str {
        DEFAULT_KEY_NAME
    }

    /// The record's key, if it has one yet
    fn key(&self) -> Option<Identifier>;

    /// Read a field value
    fn get(&self, field: &str) -> Option<Value>;

    /// Write a field value in memory; nothing is persisted until `save`
    fn set(&mut self, field: &str, value: Value);

    /// Remove a field in memory, so `get` reports it absent
    fn unset(&mut self, field: &str);

    /// Persist the record
    async fn save(&mut self) -> RelationResult<()>;

    /// Update the modification marker and refresh loaded relations
    async fn touch(&mut self) -> RelationResult<()>;
}

/// Which kind of store a model lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKind {
    Document,
    Relational,
}

/// Static metadata of a record type
pub trait Model: Record + Sized {
    /// Type name, e.g. `BlogPost`; default key names derive from it
    const NAME: &'static str;

    const KEY_NAME: &'static str = DEFAULT_KEY_NAME;

    /// Capability checked once when a relation is declared
    const STORE: StoreKind = StoreKind::Document;

    /// Default name of a field referencing this model, e.g. `blog_post_id`
    fn foreign_key() -> String {
        format!("{}_id", crate::relationships::inference::to_snake_case(Self::NAME))
    }
}

/// Loaded contents of a relation slot
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded<R> {
    /// Singular relation; `None` means absent
    One(Option<R>),
    /// Plural relation; never absent, possibly empty
    Many(Vec<R>),
}

impl<R> Loaded<R> {
    pub fn as_one(&self) -> Option<&R> {
        match self {
            Loaded::One(record) => record.as_ref(),
            Loaded::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> &[R] {
        match self {
            Loaded::One(_) => &[],
            Loaded::Many(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Loaded::One(record) => usize::from(record.is_some()),
            Loaded::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<R> {
        match self {
            Loaded::One(record) => record.into_iter().collect(),
            Loaded::Many(records) => records,
        }
    }
}

/// Relation slots an owner type exposes for related type `R`
pub trait HasRelation<R>: Record {
    fn set_relation(&mut self, slot: &str, value: Loaded<R>);

    fn relation(&self, slot: &str) -> Option<&Loaded<R>>;
}

/// Value of `field`, reading the key through `key()` when `field` is the key
/// field.
pub fn key_or_field<R: Record + ?Sized>(record: &R, field: &str) -> Option<Value> {
    if field == record.key_name() {
        record.key().map(|key| key.to_value())
    } else {
        record.get(field).filter(|value| !value.is_null())
    }
}

/// Elements of an array field. Missing or null is empty, a scalar is a
/// one-element array.
pub fn array_values<R: Record + ?Sized>(record: &R, field: &str) -> Vec<Value> {
    match record.get(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    }
}

/// Identifiers held by an array field, reducing embedded documents that carry
/// `embedded_key` to that key.
pub fn field_ids<R: Record + ?Sized>(
    record: &R,
    field: &str,
    embedded_key: &str,
) -> RelationResult<Vec<Identifier>> {
    array_values(record, field)
        .iter()
        .map(|value| from_value(reduce_to_key(value, embedded_key), false))
        .collect()
}
