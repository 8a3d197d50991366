//! Query collaborator contract
//!
//! Predicate construction and store access belong to the host. Relations only
//! shape queries through this trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{RelationError, RelationResult};
use crate::identifier::Identifier;
use crate::model::Model;

/// Query handle over one related model type
#[async_trait]
pub trait DocumentQuery: Send + Sync + Sized {
    type Record: Model + Clone;

    /// A fresh, unconstrained query over the same model
    fn new_query(&self) -> Self;

    /// Field equals `value`; on array fields, the array contains `value`
    fn where_eq(&mut self, field: &str, value: Value) -> &mut Self;

    /// Field equals any of `values`; on array fields, the arrays intersect
    fn where_in(&mut self, field: &str, values: Vec<Value>) -> &mut Self;

    async fn first(&self) -> RelationResult<Option<Self::Record>>;

    async fn get(&self) -> RelationResult<Vec<Self::Record>>;

    /// Append `value` to `field` on every matched record, skipping records
    /// that already hold it when `distinct`. Returns the number of records
    /// matched.
    async fn push(&self, field: &str, value: Value, distinct: bool) -> RelationResult<u64>;

    /// Remove every element of `field` equal to one of `values` on every
    /// matched record. Returns the number of records matched.
    async fn pull(&self, field: &str, values: Vec<Value>) -> RelationResult<u64>;
}

/// Look up a related record by key
pub async fn find<Q: DocumentQuery>(
    query: &Q,
    id: &Identifier,
) -> RelationResult<Option<Q::Record>> {
    let mut query = query.new_query();
    query.where_eq(<Q::Record as Model>::KEY_NAME, id.to_value());
    query.first().await
}

/// Look up a related record by key, failing when it does not exist
pub async fn find_or_fail<Q: DocumentQuery>(query: &Q, id: &Identifier) -> RelationResult<Q::Record> {
    find(query, id)
        .await?
        .ok_or_else(|| RelationError::unresolved(<Q::Record as Model>::NAME, id))
}
