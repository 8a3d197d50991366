//! IncludedIn Relation - A related record holds the owner's key
//!
//! The reference lives on the related side: the container record keeps the
//! owner's key in its `other_key` array. Mutations therefore write to related
//! records, never to the owner.

use async_trait::async_trait;
use tracing::debug;

use crate::config::RelationConfig;
use crate::dictionary::{build_dictionary, by_field, match_owners, Cardinality};
use crate::error::{RelationError, RelationResult};
use crate::identifier::{normalize, IdInput, Identifier};
use crate::model::{HasRelation, Model, Record};
use crate::mutator;
use crate::query::{find_or_fail, DocumentQuery};

use super::metadata::{RelationKind, RelationMetadata};
use super::traits::{collect_keys, constrain_eq, single_key, RelatedOf, Relation};

/// Related field `other_key` holds the owner's `local_key`
pub struct IncludedIn<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    query: Q,
    parent: &'a O,
    metadata: RelationMetadata,
    config: RelationConfig,
}

impl<'a, O, Q> IncludedIn<'a, O, Q>
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
        Self::with_kind(RelationKind::IncludedIn, query, parent, other_key, local_key, config)
    }

    pub(crate) fn with_kind(
        kind: RelationKind,
        query: Q,
        parent: &'a O,
        other_key: impl Into<String>,
        local_key: impl Into<String>,
        config: RelationConfig,
    ) -> Self {
        let metadata =
            RelationMetadata::new(kind, <Q::Record as Model>::NAME, other_key, local_key);
        let mut relation = Self {
            query,
            parent,
            metadata,
            config,
        };
        if config.apply_constraints {
            relation.add_constraints();
        }
        relation
    }

    pub fn parent(&self) -> &O {
        self.parent
    }

    /// Field on the related records holding owner keys
    pub fn other_key(&self) -> &str {
        &self.metadata.foreign_key
    }

    /// The owner's key as stored in related records
    pub fn owner_key(&self) -> RelationResult<Identifier> {
        single_key(self.parent, &self.metadata.local_key)
            .ok_or_else(|| RelationError::missing_key(self.parent.model_name()))
    }

    /// Locate a related record by id, failing when it does not exist
    pub async fn find_related<'i>(&self, id: impl Into<IdInput<'i>>) -> RelationResult<RelatedOf<Q>> {
        let id = normalize(id.into(), self.config.convert_ids)?;
        find_or_fail(&self.query, &id).await
    }

    /// The related record currently holding the owner's key
    pub async fn current_container(&self) -> RelationResult<Option<RelatedOf<Q>>> {
        let mut query = self.query.new_query();
        query.where_eq(self.other_key(), self.owner_key()?.to_value());
        query.first().await
    }

    /// Move the owner into `target`: leave the current container, add the
    /// owner's key to `target` and touch it. Returns `false` when `target`
    /// already is the container.
    pub async fn attach_to(&self, target: &mut RelatedOf<Q>) -> RelationResult<bool> {
        let owner_key = self.owner_key()?;

        if let Some(mut current) = self.current_container().await? {
            if target.key().is_some() && current.key() == target.key() {
                debug!(relation = %self.metadata.display_name(), "attach skipped, already contained");
                return Ok(false);
            }
            mutator::pull_references(
                &mut current,
                self.other_key(),
                self.parent.key_name(),
                [IdInput::Id(owner_key.clone())],
            )
            .await?;
        }

        mutator::push_reference(target, self.other_key(), self.parent.key_name(), IdInput::Id(owner_key))
            .await?;
        target.touch().await?;
        Ok(true)
    }

    pub async fn attach_to_id<'i>(&self, id: impl Into<IdInput<'i>>) -> RelationResult<bool> {
        let mut target = self.find_related(id).await?;
        self.attach_to(&mut target).await
    }

    /// Remove the owner's key from `target`. Returns the number of elements
    /// removed.
    pub async fn detach_from(&self, target: &mut RelatedOf<Q>) -> RelationResult<usize> {
        let owner_key = self.owner_key()?;
        mutator::pull_references(target, self.other_key(), self.parent.key_name(), [IdInput::Id(owner_key)])
            .await
    }

    pub async fn detach_from_id<'i>(&self, id: impl Into<IdInput<'i>>) -> RelationResult<usize> {
        let mut target = self.find_related(id).await?;
        self.detach_from(&mut target).await
    }
}

#[async_trait]
impl<'a, O, Q> Relation<O> for IncludedIn<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    type Query = Q;

    fn metadata(&self) -> &RelationMetadata {
        &self.metadata
    }

    fn query(&self) -> &Q {
        &self.query
    }

    fn query_mut(&mut self) -> &mut Q {
        &mut self.query
    }

    fn add_constraints(&mut self) {
        let value = single_key(self.parent, &self.metadata.local_key).map(|id| id.to_value());
        constrain_eq(&mut self.query, &self.metadata.foreign_key, value);
    }

    fn add_eager_constraints(&mut self, owners: &[O]) {
        let keys = collect_keys(owners, &self.metadata.local_key, &self.metadata.local_key);
        self.query.where_in(&self.metadata.foreign_key, keys);
    }

    fn match_related(&self, owners: &mut [O], results: &[RelatedOf<Q>], slot: &str)
    where
        O: HasRelation<RelatedOf<Q>>,
    {
        let cardinality = self.metadata.kind.cardinality();
        let mut dictionary = build_dictionary(results, by_field(&self.metadata.foreign_key));
        // a single container slot takes the last container listing the owner
        if cardinality == Cardinality::One {
            dictionary = dictionary.keep_last();
        }
        match_owners(
            owners,
            &dictionary,
            by_field(&self.metadata.local_key),
            slot,
            cardinality,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDocument, MemoryStore};
    use crate::model::Loaded;
    use crate::relationships::eager_loading::eager_load;
    use crate::relationships::fixtures::{Category, Post};
    use serde_json::json;

    fn opaque() -> RelationConfig {
        RelationConfig::default().with_convert_ids(false)
    }

    async fn seed(store: &MemoryStore) -> MemoryDocument<Post> {
        MemoryDocument::<Category>::create(store, json!({ "_id": "news", "post_ids": [1, 2] }))
            .await
            .unwrap();
        MemoryDocument::<Category>::create(store, json!({ "_id": "tech", "post_ids": [3] }))
            .await
            .unwrap();
        MemoryDocument::<Post>::create(store, json!({ "_id": 1 })).await.unwrap()
    }

    #[tokio::test]
    async fn test_eager_match_keeps_last_container() {
        let store = MemoryStore::new();
        let post = seed(&store).await;
        MemoryDocument::<Category>::create(&store, json!({ "_id": "archive", "post_ids": [1] }))
            .await
            .unwrap();

        let mut owners = vec![post.clone()];
        let config = RelationConfig::eager().with_convert_ids(false);
        let mut relation = IncludedIn::new(store.query::<Category>(), &post, "post_ids", "_id", config);
        eager_load(&mut relation, &mut owners, "category").await.unwrap();

        let loaded: &Loaded<MemoryDocument<Category>> = owners[0].relation("category").unwrap();
        assert_eq!(loaded.as_one().and_then(|c| c.key()), Some(Identifier::from("archive")));
    }

    #[tokio::test]
    async fn test_lazy_result_is_the_container() {
        let store = MemoryStore::new();
        let post = seed(&store).await;

        let relation = IncludedIn::new(store.query::<Category>(), &post, "post_ids", "_id", opaque());
        let loaded = relation.get_results().await.unwrap();
        assert_eq!(
            loaded.as_one().and_then(|category| category.key()),
            Some(Identifier::from("news"))
        );
    }

    #[tokio::test]
    async fn test_attach_to_moves_between_containers() {
        let store = MemoryStore::new();
        let post = seed(&store).await;

        let relation = IncludedIn::new(store.query::<Category>(), &post, "post_ids", "_id", opaque());
        assert!(relation.attach_to_id("tech").await.unwrap());
        assert!(!relation.attach_to_id("tech").await.unwrap());

        let news = store.find::<Category>(&"news".into()).await.unwrap();
        let tech = store.find::<Category>(&"tech".into()).await.unwrap();
        assert_eq!(news.get("post_ids"), Some(json!([2])));
        assert_eq!(tech.get("post_ids"), Some(json!([3, 1])));
        assert!(tech.get("updated_at").is_some());
    }

    #[tokio::test]
    async fn test_detach_from_unknown_target_is_unresolved() {
        let store = MemoryStore::new();
        let post = seed(&store).await;

        let relation = IncludedIn::new(store.query::<Category>(), &post, "post_ids", "_id", opaque());
        let err = relation.detach_from_id("sports").await.unwrap_err();
        assert!(matches!(err, RelationError::UnresolvedRelation { .. }));

        assert_eq!(relation.detach_from_id("news").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_owner_without_key_is_rejected() {
        let store = MemoryStore::new();
        let post = MemoryDocument::<Post>::new(&store);

        let relation = IncludedIn::new(store.query::<Category>(), &post, "post_ids", "_id", opaque());
        let err = relation.current_container().await.unwrap_err();
        assert!(matches!(err, RelationError::MissingKey { .. }));
    }
}
