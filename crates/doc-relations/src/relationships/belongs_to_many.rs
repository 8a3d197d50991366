//! BelongsToMany Relation - Mirrored key arrays on both sides
//!
//! The owner keeps related keys in `other_key`, every related record keeps
//! owner keys in `foreign_key`. Attach and detach write both sides as separate
//! persists; a failure between them leaves the first side written.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::RelationConfig;
use crate::dictionary::{build_dictionary, by_field, match_owners, Cardinality};
use crate::error::{RelationError, RelationResult};
use crate::identifier::{normalize, normalize_many, IdInput, Identifier};
use crate::model::{array_values, field_ids, HasRelation, Model, Record};
use crate::mutator;
use crate::query::DocumentQuery;
use crate::reconcile::{self, ChangeReport, Reconcile, SyncList};

use super::metadata::{RelationKind, RelationMetadata};
use super::traits::{collect_keys, constrain_eq, RelatedOf, Relation};

pub struct BelongsToMany<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    query: Q,
    parent: &'a mut O,
    metadata: RelationMetadata,
    config: RelationConfig,
}

impl<'a, O, Q> BelongsToMany<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    /// `foreign_key` is the related array of owner keys, `other_key` the
    /// owner array of related keys
    pub fn new(
        query: Q,
        parent: &'a mut O,
        foreign_key: impl Into<String>,
        other_key: impl Into<String>,
        name: impl Into<String>,
        config: RelationConfig,
    ) -> Self {
        let metadata = RelationMetadata::new(
            RelationKind::BelongsToMany,
            <Q::Record as Model>::NAME,
            foreign_key,
            other_key,
        )
        .with_name(name);
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

    pub fn other_key(&self) -> &str {
        &self.metadata.local_key
    }

    fn owner_key(&self) -> RelationResult<Identifier> {
        self.parent
            .key()
            .ok_or_else(|| RelationError::missing_key(self.parent.model_name()))
    }

    /// Related keys currently held by the owner
    pub fn parent_keys(&self) -> RelationResult<Vec<Identifier>> {
        field_ids(
            &*self.parent,
            &self.metadata.local_key,
            <Q::Record as Model>::KEY_NAME,
        )
    }

    /// Attach the related record `id` on both sides, then touch the owner.
    /// Returns the number of related records updated.
    pub async fn attach<'i>(&mut self, id: impl Into<IdInput<'i>>) -> RelationResult<u64> {
        let id = normalize(id.into(), self.config.convert_ids)?;
        let matched = self.attach_both(&id).await?;
        self.touch_if_touching().await?;
        Ok(matched)
    }

    /// Attach an already loaded related record, writing through its handle
    pub async fn attach_record(&mut self, related: &mut RelatedOf<Q>) -> RelationResult<()> {
        let id = related
            .key()
            .ok_or_else(|| RelationError::missing_key(related.model_name()))?;
        let owner_key = self.owner_key()?;

        let owner_key_name = self.parent.key_name().to_string();

        mutator::push_reference(
            related,
            &self.metadata.foreign_key,
            &owner_key_name,
            IdInput::Id(owner_key),
        )
        .await?;
        mutator::push_reference(
            &mut *self.parent,
            &self.metadata.local_key,
            <Q::Record as Model>::KEY_NAME,
            IdInput::Id(id),
        )
        .await?;
        self.touch_if_touching().await
    }

    /// Detach the given related ids on both sides, or every association when
    /// `ids` is empty. Returns the number of related records updated.
    pub async fn detach<'i, I, T>(&mut self, ids: I) -> RelationResult<u64>
    where
        I: IntoIterator<Item = T>,
        T: Into<IdInput<'i>>,
    {
        let ids = normalize_many(ids.into_iter().map(Into::into), self.config.convert_ids)?;
        let affected = self.detach_both(&ids).await?;
        self.touch_if_touching().await?;
        Ok(affected)
    }

    pub async fn detach_all(&mut self) -> RelationResult<u64> {
        self.detach(Vec::<Identifier>::new()).await
    }

    pub async fn sync(
        &mut self,
        desired: SyncList<'_>,
        detaching: bool,
    ) -> RelationResult<ChangeReport> {
        self.flatten_references()?;
        reconcile::sync(self, desired, detaching).await
    }

    async fn attach_both(&mut self, id: &Identifier) -> RelationResult<u64> {
        let owner_key = self.owner_key()?;

        let mut query = self.query.new_query();
        query.where_in(<Q::Record as Model>::KEY_NAME, vec![id.to_value()]);
        let matched = query
            .push(&self.metadata.foreign_key, owner_key.to_value(), true)
            .await?;
        if matched == 0 {
            return Err(RelationError::unresolved(<Q::Record as Model>::NAME, id));
        }

        mutator::push_reference(
            &mut *self.parent,
            &self.metadata.local_key,
            <Q::Record as Model>::KEY_NAME,
            IdInput::from(id),
        )
        .await?;
        debug!(relation = %self.metadata.display_name(), id = %id, "attached on both sides");
        Ok(matched)
    }

    async fn detach_both(&mut self, ids: &[Identifier]) -> RelationResult<u64> {
        let owner_key = self.owner_key()?;
        let mut query = self.query.new_query();

        if ids.is_empty() {
            mutator::clear(&mut *self.parent, &self.metadata.local_key).await?;
            query.where_eq(&self.metadata.foreign_key, owner_key.to_value());
        } else {
            mutator::pull_references(
                &mut *self.parent,
                &self.metadata.local_key,
                <Q::Record as Model>::KEY_NAME,
                ids.iter().map(IdInput::from),
            )
            .await?;
            query.where_in(
                <Q::Record as Model>::KEY_NAME,
                ids.iter().map(Identifier::to_value).collect(),
            );
        }

        let affected = query
            .pull(&self.metadata.foreign_key, vec![owner_key.to_value()])
            .await?;
        debug!(relation = %self.metadata.display_name(), affected, "detached on both sides");
        Ok(affected)
    }

    async fn touch_if_touching(&mut self) -> RelationResult<()> {
        if self.config.touch_owner {
            self.parent.touch().await?;
        }
        Ok(())
    }

    fn flatten_references(&mut self) -> RelationResult<()> {
        let key_name = <Q::Record as Model>::KEY_NAME;
        let embedded = array_values(&*self.parent, &self.metadata.local_key)
            .iter()
            .any(|item| matches!(item, Value::Object(map) if map.contains_key(key_name)));

        if embedded {
            let ids = self.parent_keys()?;
            self.parent.set(
                &self.metadata.local_key,
                Value::Array(ids.iter().map(Identifier::to_value).collect()),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl<'a, O, Q> Reconcile for BelongsToMany<'a, O, Q>
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
        self.detach_both(ids).await?;
        Ok(())
    }

    async fn attach_id(&mut self, id: &Identifier, _attributes: &Map<String, Value>) -> RelationResult<bool> {
        self.attach_both(id).await?;
        Ok(true)
    }

    async fn touch_owner(&mut self) -> RelationResult<()> {
        self.touch_if_touching().await
    }
}

#[async_trait]
impl<'a, O, Q> Relation<O> for BelongsToMany<'a, O, Q>
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
        let owner_key = self.parent.key().map(|key| key.to_value());
        constrain_eq(&mut self.query, &self.metadata.foreign_key, owner_key);
    }

    fn add_eager_constraints(&mut self, owners: &[O]) {
        let key_name = self.parent.key_name().to_string();
        let keys = collect_keys(owners, &key_name, &key_name);
        self.query.where_in(&self.metadata.foreign_key, keys);
    }

    fn match_related(&self, owners: &mut [O], results: &[RelatedOf<Q>], slot: &str)
    where
        O: HasRelation<RelatedOf<Q>>,
    {
        let dictionary = build_dictionary(results, by_field(&self.metadata.foreign_key));
        match_owners(
            owners,
            &dictionary,
            by_field(self.parent.key_name()),
            slot,
            Cardinality::Many,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDocument, MemoryStore};
    use crate::relationships::fixtures::{Role, User};
    use serde_json::json;

    fn opaque() -> RelationConfig {
        RelationConfig::default().with_convert_ids(false)
    }

    async fn seed(store: &MemoryStore) -> MemoryDocument<User> {
        for id in ["admin", "editor"] {
            MemoryDocument::<Role>::create(store, json!({ "_id": id, "user_ids": [] }))
                .await
                .unwrap();
        }
        MemoryDocument::<User>::create(store, json!({ "_id": 1, "role_ids": [] }))
            .await
            .unwrap()
    }

    async fn role_users(store: &MemoryStore, role: &str) -> Option<Value> {
        store.find::<Role>(&role.into()).await.unwrap().get("user_ids")
    }

    #[tokio::test]
    async fn test_attach_writes_both_sides() {
        let store = MemoryStore::new();
        let mut user = seed(&store).await;

        let mut relation = BelongsToMany::new(store.query::<Role>(), &mut user, "user_ids", "role_ids", "roles", opaque());
        assert_eq!(relation.attach("admin").await.unwrap(), 1);

        assert_eq!(user.get("role_ids"), Some(json!(["admin"])));
        assert_eq!(role_users(&store, "admin").await, Some(json!([1])));
        assert_eq!(user.touches(), 1);
    }

    #[tokio::test]
    async fn test_attach_unknown_related_is_unresolved() {
        let store = MemoryStore::new();
        let mut user = seed(&store).await;

        let mut relation = BelongsToMany::new(store.query::<Role>(), &mut user, "user_ids", "role_ids", "roles", opaque());
        let err = relation.attach("owner").await.unwrap_err();
        assert!(matches!(err, RelationError::UnresolvedRelation { .. }));
        assert_eq!(user.get("role_ids"), Some(json!([])));
    }

    #[tokio::test]
    async fn test_detach_all_clears_both_sides() {
        let store = MemoryStore::new();
        let mut user = seed(&store).await;

        let mut relation = BelongsToMany::new(store.query::<Role>(), &mut user, "user_ids", "role_ids", "roles", opaque());
        relation.attach("admin").await.unwrap();
        relation.attach("editor").await.unwrap();

        assert_eq!(relation.detach(["editor"]).await.unwrap(), 1);
        assert_eq!(role_users(&store, "editor").await, Some(json!([])));
        assert_eq!(relation.parent().get("role_ids"), Some(json!(["admin"])));

        assert_eq!(relation.detach_all().await.unwrap(), 1);
        assert_eq!(role_users(&store, "admin").await, Some(json!([])));
        assert_eq!(user.get("role_ids"), Some(json!([])));
    }

    #[tokio::test]
    async fn test_sync_touches_once_and_mirrors() {
        let store = MemoryStore::new();
        let mut user = seed(&store).await;

        let mut relation = BelongsToMany::new(store.query::<Role>(), &mut user, "user_ids", "role_ids", "roles", opaque());
        relation.attach("admin").await.unwrap();

        let report = relation.sync(SyncList::ids(["editor"]), true).await.unwrap();
        assert_eq!(report.detached, vec![Identifier::from("admin")]);
        assert_eq!(report.attached, vec![Identifier::from("editor")]);

        assert_eq!(user.get("role_ids"), Some(json!(["editor"])));
        assert_eq!(user.touches(), 2);
        assert_eq!(role_users(&store, "admin").await, Some(json!([])));
        assert_eq!(role_users(&store, "editor").await, Some(json!([1])));
    }

    #[tokio::test]
    async fn test_touch_can_be_disabled() {
        let store = MemoryStore::new();
        let mut user = seed(&store).await;

        let config = opaque().with_touch_owner(false);
        let mut relation = BelongsToMany::new(store.query::<Role>(), &mut user, "user_ids", "role_ids", "roles", config);
        relation.attach("admin").await.unwrap();
        assert_eq!(user.touches(), 0);
    }
}
