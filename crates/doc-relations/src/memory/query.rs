//! Query over one in-memory collection

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::RelationResult;
use crate::identifier::canonical_of;
use crate::query::DocumentQuery;

use super::{MemoryDocument, MemoryStore, Schema};

#[derive(Debug, Clone)]
struct Filter {
    field: String,
    /// Canonical renderings the field must hit
    accepted: HashSet<String>,
}

impl Filter {
    fn new(field: &str, values: &[Value]) -> Self {
        Self {
            field: field.to_string(),
            accepted: values.iter().filter_map(canonical_of).collect(),
        }
    }

    /// Scalar fields must equal an accepted value; array fields must contain one
    fn matches(&self, fields: &Map<String, Value>) -> bool {
        match fields.get(&self.field) {
            None | Some(Value::Null) => false,
            Some(Value::Array(items)) => items.iter().any(|item| self.accepts(item)),
            Some(value) => self.accepts(value),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        canonical_of(value).map_or(false, |canonical| self.accepted.contains(&canonical))
    }
}

fn array_of(fields: &mut Map<String, Value>, field: &str) -> Vec<Value> {
    match fields.remove(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    }
}

/// Conjunction of equality/membership filters over collection `S`
pub struct MemoryQuery<S: Schema> {
    store: MemoryStore,
    filters: Vec<Filter>,
    _schema: PhantomData<fn() -> S>,
}

impl<S: Schema> MemoryQuery<S> {
    pub(crate) fn new(store: MemoryStore) -> Self {
        Self {
            store,
            filters: Vec::new(),
            _schema: PhantomData,
        }
    }

    fn matches(&self, fields: &Map<String, Value>) -> bool {
        self.filters.iter().all(|filter| filter.matches(fields))
    }

    async fn matched(&self) -> Vec<Map<String, Value>> {
        let state = self.store.state().read().await;
        state
            .collection(S::COLLECTION)
            .iter()
            .filter(|fields| self.matches(fields))
            .cloned()
            .collect()
    }

    /// Rewrite the array at `field` on every matched document as one write.
    /// Returns the number of documents matched.
    async fn update_arrays<F>(&self, field: &str, update: F) -> RelationResult<u64>
    where
        F: Fn(Vec<Value>) -> Vec<Value> + Send,
    {
        let mut state = self.store.state().write().await;
        state.begin_write(S::COLLECTION)?;

        let mut matched = 0u64;
        for fields in state.collection_mut(S::COLLECTION).iter_mut() {
            if !self.matches(fields) {
                continue;
            }
            matched += 1;
            let items = array_of(fields, field);
            fields.insert(field.to_string(), Value::Array(update(items)));
        }
        Ok(matched)
    }
}

#[async_trait]
impl<S: Schema> DocumentQuery for MemoryQuery<S> {
    type Record = MemoryDocument<S>;

    fn new_query(&self) -> Self {
        Self::new(self.store.clone())
    }

    fn where_eq(&mut self, field: &str, value: Value) -> &mut Self {
        self.filters.push(Filter::new(field, std::slice::from_ref(&value)));
        self
    }

    fn where_in(&mut self, field: &str, values: Vec<Value>) -> &mut Self {
        self.filters.push(Filter::new(field, &values));
        self
    }

    async fn first(&self) -> RelationResult<Option<MemoryDocument<S>>> {
        Ok(self
            .matched()
            .await
            .into_iter()
            .next()
            .map(|fields| MemoryDocument::from_fields(&self.store, fields)))
    }

    async fn get(&self) -> RelationResult<Vec<MemoryDocument<S>>> {
        let documents: Vec<MemoryDocument<S>> = self
            .matched()
            .await
            .into_iter()
            .map(|fields| MemoryDocument::from_fields(&self.store, fields))
            .collect();
        debug!(collection = S::COLLECTION, count = documents.len(), "query returned documents");
        Ok(documents)
    }

    async fn push(&self, field: &str, value: Value, distinct: bool) -> RelationResult<u64> {
        let canonical = canonical_of(&value);
        let matched = self
            .update_arrays(field, |mut items| {
                let present = canonical.is_some()
                    && items
                        .iter()
                        .any(|item| canonical_of(item) == canonical);
                if !(distinct && present) {
                    items.push(value.clone());
                }
                items
            })
            .await?;
        debug!(collection = S::COLLECTION, field, matched, "pushed value");
        Ok(matched)
    }

    async fn pull(&self, field: &str, values: Vec<Value>) -> RelationResult<u64> {
        let targets: HashSet<String> = values.iter().filter_map(canonical_of).collect();
        let matched = self
            .update_arrays(field, |items| {
                items
                    .into_iter()
                    .filter(|item| canonical_of(item).map_or(true, |c| !targets.contains(&c)))
                    .collect()
            })
            .await?;
        debug!(collection = S::COLLECTION, field, matched, "pulled values");
        Ok(matched)
    }
}

impl<S: Schema> Clone for MemoryQuery<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            filters: self.filters.clone(),
            _schema: PhantomData,
        }
    }
}

impl<S: Schema> fmt::Debug for MemoryQuery<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryQuery")
            .field("collection", &S::COLLECTION)
            .field("filters", &self.filters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use serde_json::json;

    struct Post;

    impl Schema for Post {
        const NAME: &'static str = "Post";
        const COLLECTION: &'static str = "posts";
    }

    async fn seed(store: &MemoryStore) {
        for fields in [
            json!({ "_id": 1, "user_ids": [10, 11], "status": "draft" }),
            json!({ "_id": 2, "user_ids": [11], "status": "live" }),
            json!({ "_id": 3, "status": "live" }),
        ] {
            MemoryDocument::<Post>::create(store, fields).await.unwrap();
        }
    }

    fn keys(documents: &[MemoryDocument<Post>]) -> Vec<String> {
        documents
            .iter()
            .map(|doc| doc.key().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_filters_match_arrays_by_containment() {
        let store = MemoryStore::new();
        seed(&store).await;

        let mut query = store.query::<Post>();
        query.where_eq("user_ids", json!(11));
        assert_eq!(keys(&query.get().await.unwrap()), vec!["1", "2"]);

        let mut query = store.query::<Post>();
        query.where_in("user_ids", vec![json!(10)]).where_eq("status", json!("draft"));
        assert_eq!(keys(&query.get().await.unwrap()), vec!["1"]);

        let mut query = store.query::<Post>();
        query.where_in("_id", Vec::new());
        assert!(query.first().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_push_and_pull_report_matched_documents() {
        let store = MemoryStore::new();
        seed(&store).await;

        let mut query = store.query::<Post>();
        query.where_eq("status", json!("live"));
        assert_eq!(query.push("user_ids", json!(11), true).await.unwrap(), 2);

        let live = query.get().await.unwrap();
        assert_eq!(live[0].get("user_ids"), Some(json!([11])));
        assert_eq!(live[1].get("user_ids"), Some(json!([11])));

        let mut query = store.query::<Post>();
        query.where_eq("user_ids", json!(11));
        assert_eq!(query.pull("user_ids", vec![json!(11)]).await.unwrap(), 3);

        let all = store.documents::<Post>().await;
        assert_eq!(all[0].get("user_ids"), Some(json!([10])));
        assert_eq!(all[2].get("user_ids"), Some(json!([])));
    }
}
