//! Relation Traits - Core trait shared by every relation descriptor

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;

use crate::dictionary::init_slots;
use crate::error::RelationResult;
use crate::identifier::{canonical_of, from_value, reduce_to_key, Identifier};
use crate::model::{key_or_field, HasRelation, Loaded, Record};
use crate::query::DocumentQuery;

use super::metadata::RelationMetadata;

/// Record type a relation's query resolves to
pub type RelatedOf<Q> = <Q as DocumentQuery>::Record;

/// A relation descriptor from owner type `O`
///
/// Descriptors are built per relation access and hold no state besides their
/// query, owner, key names and configuration.
#[async_trait]
pub trait Relation<O: Record>: Send + Sync {
    type Query: DocumentQuery;

    fn metadata(&self) -> &RelationMetadata;

    fn query(&self) -> &Self::Query;

    fn query_mut(&mut self) -> &mut Self::Query;

    /// Restrict the query to records related to the descriptor's owner
    fn add_constraints(&mut self);

    /// Restrict the query to records related to any of `owners`
    fn add_eager_constraints(&mut self, owners: &[O]);

    /// Pre-populate `slot` on every owner: absent for singular relations,
    /// empty for plural ones
    fn init_relation(&self, owners: &mut [O], slot: &str)
    where
        O: HasRelation<RelatedOf<Self::Query>>,
    {
        init_slots::<O, RelatedOf<Self::Query>>(owners, slot, self.metadata().kind.cardinality());
    }

    /// Assign eagerly loaded `results` onto their owners
    fn match_related(&self, owners: &mut [O], results: &[RelatedOf<Self::Query>], slot: &str)
    where
        O: HasRelation<RelatedOf<Self::Query>>;

    /// Resolve the relation for the descriptor's owner
    async fn get_results(&self) -> RelationResult<Loaded<RelatedOf<Self::Query>>> {
        if self.metadata().kind.is_collection() {
            Ok(Loaded::Many(self.query().get().await?))
        } else {
            Ok(Loaded::One(self.query().first().await?))
        }
    }
}

/// Reference values held by `field`, flattened and reduced to plain keys.
/// Values with no identifier form are dropped.
pub(crate) fn reference_values<R: Record + ?Sized>(
    record: &R,
    field: &str,
    embedded_key: &str,
) -> Vec<Value> {
    let items = match key_or_field(record, field) {
        None => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(value) => vec![value],
    };

    items
        .iter()
        .filter_map(|item| from_value(reduce_to_key(item, embedded_key), false).ok())
        .map(|id| id.to_value())
        .collect()
}

/// Canonical renderings of [`reference_values`], for dictionary lookups
pub(crate) fn reference_keys<R: Record + ?Sized>(
    record: &R,
    field: &str,
    embedded_key: &str,
) -> Vec<String> {
    reference_values(record, field, embedded_key)
        .iter()
        .filter_map(canonical_of)
        .collect()
}

/// Union of the reference values of `field` over `owners`, first occurrence
/// order
pub(crate) fn collect_keys<O: Record>(owners: &[O], field: &str, embedded_key: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();

    for owner in owners {
        for value in reference_values(owner, field, embedded_key) {
            if let Some(canonical) = canonical_of(&value) {
                if seen.insert(canonical) {
                    keys.push(value);
                }
            }
        }
    }
    keys
}

/// The single identifier held by `field` (or the record key)
pub(crate) fn single_key<R: Record + ?Sized>(record: &R, field: &str) -> Option<Identifier> {
    key_or_field(record, field).and_then(|value| from_value(&value, false).ok())
}

/// Constrain `query` on `field` equal to `value`, or to nothing when the owner
/// holds no value
pub(crate) fn constrain_eq<Q: DocumentQuery>(query: &mut Q, field: &str, value: Option<Value>) {
    match value {
        Some(value) => query.where_eq(field, value),
        None => query.where_in(field, Vec::new()),
    };
}
