//! ContainsFew Relation - Owner holds an array of references

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::RelationConfig;
use crate::dictionary::{build_dictionary, by_field, match_owners, Cardinality};
use crate::error::RelationResult;
use crate::identifier::{normalize, normalize_many, IdInput, Identifier};
use crate::model::{array_values, field_ids, HasRelation, Model, Record};
use crate::mutator;
use crate::query::DocumentQuery;
use crate::reconcile::{self, ChangeReport, Reconcile, SyncList};

use super::metadata::{RelationKind, RelationMetadata};
use super::traits::{collect_keys, reference_keys, reference_values, RelatedOf, Relation};

/// Owner field `local_key` holds the keys of many related records
pub struct ContainsFew<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    query: Q,
    parent: &'a mut O,
    metadata: RelationMetadata,
    config: RelationConfig,
}

impl<'a, O, Q> ContainsFew<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    pub fn new(
        query: Q,
        parent: &'a mut O,
        foreign_key: impl Into<String>,
        local_key: impl Into<String>,
        config: RelationConfig,
    ) -> Self {
        let metadata = RelationMetadata::new(
            RelationKind::ContainsFew,
            <Q::Record as Model>::NAME,
            foreign_key,
            local_key,
        );
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

    /// Keys currently referenced by the owner
    pub fn parent_keys(&self) -> RelationResult<Vec<Identifier>> {
        field_ids(&*self.parent, &self.metadata.local_key, &self.metadata.foreign_key)
    }

    /// Add a reference (once) and touch the owner. Returns whether the array
    /// changed.
    pub async fn attach<'i>(&mut self, id: impl Into<IdInput<'i>>) -> RelationResult<bool> {
        let id = normalize(id.into(), self.config.convert_ids)?;
        let pushed = mutator::push_reference(
            &mut *self.parent,
            &self.metadata.local_key,
            &self.metadata.foreign_key,
            IdInput::Id(id),
        )
        .await?;
        self.parent.touch().await?;
        Ok(pushed)
    }

    /// Remove the given references, or every reference when `ids` is empty,
    /// then touch the owner. Returns the number of references removed.
    pub async fn detach<'i, I, T>(&mut self, ids: I) -> RelationResult<usize>
    where
        I: IntoIterator<Item = T>,
        T: Into<IdInput<'i>>,
    {
        let ids = normalize_many(ids.into_iter().map(Into::into), self.config.convert_ids)?;
        let local_key = &self.metadata.local_key;

        let removed = if ids.is_empty() {
            let count = array_values(&*self.parent, local_key).len();
            mutator::clear(&mut *self.parent, local_key).await?;
            count
        } else {
            mutator::pull_references(
                &mut *self.parent,
                local_key,
                &self.metadata.foreign_key,
                ids.iter().map(IdInput::from),
            )
            .await?
        };

        self.parent.touch().await?;
        Ok(removed)
    }

    /// Remove every reference
    pub async fn detach_all(&mut self) -> RelationResult<usize> {
        self.detach(Vec::<Identifier>::new()).await
    }

    /// Make the owner reference exactly `desired` (or at least `desired` when
    /// not `detaching`)
    pub async fn sync(
        &mut self,
        desired: SyncList<'_>,
        detaching: bool,
    ) -> RelationResult<ChangeReport> {
        self.flatten_references()?;
        reconcile::sync(self, desired, detaching).await
    }

    /// Persist `related`, then reference it
    pub async fn save(&mut self, related: &mut RelatedOf<Q>) -> RelationResult<bool> {
        related.save().await?;
        self.attach(IdInput::Record(&*related)).await
    }

    /// Persist every record in `related`, then add them without detaching
    /// anything
    pub async fn save_many(&mut self, related: &mut [RelatedOf<Q>]) -> RelationResult<ChangeReport> {
        for record in related.iter_mut() {
            record.save().await?;
        }
        self.sync(SyncList::records(&*related), false).await
    }

    /// Rewrite embedded documents in the reference array as plain keys, in
    /// memory only. The next mutation persists the flattened form.
    fn flatten_references(&mut self) -> RelationResult<()> {
        let local_key = &self.metadata.local_key;
        let items = array_values(&*self.parent, local_key);
        let embedded = items
            .iter()
            .any(|item| matches!(item, Value::Object(map) if map.contains_key(&self.metadata.foreign_key)));

        if embedded {
            let ids = self.parent_keys()?;
            debug!(relation = %self.metadata.display_name(), count = ids.len(), "flattened embedded references");
            self.parent
                .set(local_key, Value::Array(ids.iter().map(Identifier::to_value).collect()));
        }
        Ok(())
    }
}

#[async_trait]
impl<'a, O, Q> Reconcile for ContainsFew<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    fn current_ids(&self) -> RelationResult<Vec<Identifier>> {
        self.parent_keys()
    }

    fn convert_ids(&self) -> bool {
        self.config.convert_ids
    }

    async fn detach_ids(&mut self, ids: &[Identifier]) -> RelationResult<()> {
        mutator::pull_references(
            &mut *self.parent,
            &self.metadata.local_key,
            &self.metadata.foreign_key,
            ids.iter().map(IdInput::from),
        )
        .await?;
        Ok(())
    }

    async fn attach_id(&mut self, id: &Identifier, _attributes: &Map<String, Value>) -> RelationResult<bool> {
        mutator::push_reference(
            &mut *self.parent,
            &self.metadata.local_key,
            &self.metadata.foreign_key,
            IdInput::from(id),
        )
        .await
    }

    async fn touch_owner(&mut self) -> RelationResult<()> {
        self.parent.touch().await
    }
}

#[async_trait]
impl<'a, O, Q> Relation<O> for ContainsFew<'a, O, Q>
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
        let keys = reference_values(&*self.parent, &self.metadata.local_key, &self.metadata.foreign_key);
        self.query.where_in(&self.metadata.foreign_key, keys);
    }

    fn add_eager_constraints(&mut self, owners: &[O]) {
        let keys = collect_keys(owners, &self.metadata.local_key, &self.metadata.foreign_key);
        self.query.where_in(&self.metadata.foreign_key, keys);
    }

    fn match_related(&self, owners: &mut [O], results: &[RelatedOf<Q>], slot: &str)
    where
        O: HasRelation<RelatedOf<Q>>,
    {
        let local_key = &self.metadata.local_key;
        let foreign_key = &self.metadata.foreign_key;
        let dictionary = build_dictionary(results, by_field(foreign_key));
        match_owners(
            owners,
            &dictionary,
            |owner: &O| reference_keys(owner, local_key, foreign_key),
            slot,
            Cardinality::Many,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDocument, MemoryStore};
    use crate::relationships::fixtures::{Post, Tag};
    use serde_json::json;

    fn opaque() -> RelationConfig {
        RelationConfig::default().with_convert_ids(false)
    }

    async fn post(store: &MemoryStore, tag_ids: Value) -> MemoryDocument<Post> {
        MemoryDocument::<Post>::create(store, json!({ "_id": 1, "tag_ids": tag_ids }))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_attach_is_distinct_and_touches() {
        let store = MemoryStore::new();
        let mut owner = post(&store, json!([])).await;

        let mut relation = ContainsFew::new(store.query::<Tag>(), &mut owner, "_id", "tag_ids", opaque());
        assert!(relation.attach(IdInput::from(1i64)).await.unwrap());
        assert!(!relation.attach(IdInput::from(1i64)).await.unwrap());

        assert_eq!(owner.get("tag_ids"), Some(json!([1])));
        assert_eq!(owner.touches(), 2);
    }

    #[tokio::test]
    async fn test_detach_selected_and_all() {
        let store = MemoryStore::new();
        let mut owner = post(&store, json!([1, 2, 3])).await;

        let mut relation = ContainsFew::new(store.query::<Tag>(), &mut owner, "_id", "tag_ids", opaque());
        assert_eq!(relation.detach([2i64]).await.unwrap(), 1);
        assert_eq!(relation.parent().get("tag_ids"), Some(json!([1, 3])));

        assert_eq!(relation.detach_all().await.unwrap(), 2);
        assert_eq!(relation.parent().get("tag_ids"), Some(json!([])));
    }

    #[tokio::test]
    async fn test_attach_sees_embedded_reference() {
        let store = MemoryStore::new();
        let mut owner = post(&store, json!([{ "_id": 1, "name": "rust" }])).await;

        let mut relation = ContainsFew::new(store.query::<Tag>(), &mut owner, "_id", "tag_ids", opaque());
        assert!(!relation.attach(IdInput::from(1i64)).await.unwrap());
        assert_eq!(relation.parent_keys().unwrap(), vec![Identifier::Int(1)]);

        assert_eq!(relation.detach([1i64]).await.unwrap(), 1);
        assert!(relation.parent_keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_replaces_references() {
        let store = MemoryStore::new();
        let mut owner = post(&store, json!([1, 2, 3])).await;

        let mut relation = ContainsFew::new(store.query::<Tag>(), &mut owner, "_id", "tag_ids", opaque());
        let report = relation.sync(SyncList::ids([2i64, 3, 4]), true).await.unwrap();

        assert_eq!(report.detached, vec![Identifier::Int(1)]);
        assert_eq!(report.attached, vec![Identifier::Int(4)]);
        assert_eq!(owner.get("tag_ids"), Some(json!([2, 3, 4])));
        assert_eq!(owner.touches(), 1);
    }

    #[tokio::test]
    async fn test_lazy_results_follow_owner_references() {
        let store = MemoryStore::new();
        for id in 1..=3i64 {
            MemoryDocument::<Tag>::create(&store, json!({ "_id": id })).await.unwrap();
        }
        let mut owner = post(&store, json!([3, 1])).await;

        let relation = ContainsFew::new(store.query::<Tag>(), &mut owner, "_id", "tag_ids", opaque());
        let loaded = relation.get_results().await.unwrap();
        let keys: Vec<String> = loaded.as_many().iter().map(|tag| tag.key().unwrap().to_string()).collect();
        assert_eq!(keys, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_save_many_adds_without_detaching() {
        let store = MemoryStore::new();
        let mut owner = post(&store, json!([7])).await;
        let mut tags = vec![
            MemoryDocument::<Tag>::from_value(&store, json!({ "_id": 8 })),
            MemoryDocument::<Tag>::from_value(&store, json!({ "_id": 9 })),
        ];

        let mut relation = ContainsFew::new(store.query::<Tag>(), &mut owner, "_id", "tag_ids", opaque());
        let report = relation.save_many(&mut tags).await.unwrap();

        assert_eq!(report.attached.len(), 2);
        assert_eq!(owner.get("tag_ids"), Some(json!([7, 8, 9])));
        assert_eq!(store.documents::<Tag>().await.len(), 2);
    }
}
