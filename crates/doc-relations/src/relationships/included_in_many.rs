//! IncludedInMany Relation - Many related records hold the owner's key

use async_trait::async_trait;
use tracing::debug;

use crate::config::RelationConfig;
use crate::error::RelationResult;
use crate::identifier::IdInput;
use crate::model::{HasRelation, Record};
use crate::mutator;
use crate::query::DocumentQuery;

use super::included_in::IncludedIn;
use super::metadata::{RelationKind, RelationMetadata};
use super::traits::{RelatedOf, Relation};

/// Every related record whose `other_key` array holds the owner's key
pub struct IncludedInMany<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    inner: IncludedIn<'a, O, Q>,
}

impl<'a, O, Q> IncludedInMany<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    pub fn new(
        query: Q,
        parent: &'a O,
        other_key: impl Into<String>,
        local_key: impl Into<String>,
        config: RelationConfig,
    ) -> Self {
        Self {
            inner: IncludedIn::with_kind(
                RelationKind::IncludedInMany,
                query,
                parent,
                other_key,
                local_key,
                config,
            ),
        }
    }

    pub fn parent(&self) -> &O {
        self.inner.parent()
    }

    /// Add the owner's key to `target` without leaving other containers.
    /// Returns `false` when `target` already holds it.
    pub async fn attach_to(&self, target: &mut RelatedOf<Q>) -> RelationResult<bool> {
        let owner_key = self.inner.owner_key()?;
        let owner_key_name = self.parent().key_name();
        let pushed =
            mutator::push_reference(target, self.inner.other_key(), owner_key_name, IdInput::Id(owner_key))
                .await?;
        if pushed {
            target.touch().await?;
        }
        Ok(pushed)
    }

    pub async fn attach_to_id<'i>(&self, id: impl Into<IdInput<'i>>) -> RelationResult<bool> {
        let mut target = self.inner.find_related(id).await?;
        self.attach_to(&mut target).await
    }

    /// Remove the owner's key from `target` only; other containers keep it
    pub async fn detach(&self, target: &mut RelatedOf<Q>) -> RelationResult<usize> {
        let removed = self.inner.detach_from(target).await?;
        debug!(relation = %self.inner.metadata().display_name(), removed, "detached from one container");
        Ok(removed)
    }

    /// Locate the related record by id, then detach from it
    pub async fn detach_id<'i>(&self, id: impl Into<IdInput<'i>>) -> RelationResult<usize> {
        let mut target = self.inner.find_related(id).await?;
        self.detach(&mut target).await
    }
}

#[async_trait]
impl<'a, O, Q> Relation<O> for IncludedInMany<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    type Query = Q;

    fn metadata(&self) -> &RelationMetadata {
        self.inner.metadata()
    }

    fn query(&self) -> &Q {
        self.inner.query()
    }

    fn query_mut(&mut self) -> &mut Q {
        self.inner.query_mut()
    }

    fn add_constraints(&mut self) {
        self.inner.add_constraints();
    }

    fn add_eager_constraints(&mut self, owners: &[O]) {
        self.inner.add_eager_constraints(owners);
    }

    fn match_related(&self, owners: &mut [O], results: &[RelatedOf<Q>], slot: &str)
    where
        O: HasRelation<RelatedOf<Q>>,
    {
        self.inner.match_related(owners, results, slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDocument, MemoryStore};
    use crate::relationships::fixtures::{Group, User};
    use serde_json::json;

    fn opaque() -> RelationConfig {
        RelationConfig::default().with_convert_ids(false)
    }

    #[tokio::test]
    async fn test_detach_pulls_from_one_container_only() {
        let store = MemoryStore::new();
        MemoryDocument::<Group>::create(&store, json!({ "_id": "g1", "users": ["P", "Q"] }))
            .await
            .unwrap();
        MemoryDocument::<Group>::create(&store, json!({ "_id": "g2", "users": ["P"] }))
            .await
            .unwrap();
        let user = MemoryDocument::<User>::create(&store, json!({ "_id": "P" })).await.unwrap();

        let relation = IncludedInMany::new(store.query::<Group>(), &user, "users", "_id", opaque());
        assert_eq!(relation.get_results().await.unwrap().len(), 2);

        assert_eq!(relation.detach_id("g1").await.unwrap(), 1);

        let g1 = store.find::<Group>(&"g1".into()).await.unwrap();
        let g2 = store.find::<Group>(&"g2".into()).await.unwrap();
        assert_eq!(g1.get("users"), Some(json!(["Q"])));
        assert_eq!(g2.get("users"), Some(json!(["P"])));
    }

    #[tokio::test]
    async fn test_attach_to_keeps_other_containers() {
        let store = MemoryStore::new();
        MemoryDocument::<Group>::create(&store, json!({ "_id": "g1", "users": ["P"] }))
            .await
            .unwrap();
        let mut g2 = MemoryDocument::<Group>::create(&store, json!({ "_id": "g2" }))
            .await
            .unwrap();
        let user = MemoryDocument::<User>::create(&store, json!({ "_id": "P" })).await.unwrap();

        let relation = IncludedInMany::new(store.query::<Group>(), &user, "users", "_id", opaque());
        assert!(relation.attach_to(&mut g2).await.unwrap());
        assert!(!relation.attach_to(&mut g2).await.unwrap());
        assert_eq!(g2.touches(), 1);

        let groups = relation.get_results().await.unwrap();
        assert_eq!(groups.len(), 2);
    }
}
