//! HasOne / HasMany Relations - Related records name the owner in a scalar field

use async_trait::async_trait;

use crate::config::RelationConfig;
use crate::dictionary::{build_dictionary, by_field, match_owners};
use crate::model::{HasRelation, Model, Record};
use crate::query::DocumentQuery;

use super::metadata::{RelationKind, RelationMetadata};
use super::traits::{collect_keys, constrain_eq, single_key, RelatedOf, Relation};

/// Related field `foreign_key` holds the owner's `local_key`. Read-only.
pub struct HasOneOrMany<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    query: Q,
    parent: &'a O,
    metadata: RelationMetadata,
}

impl<'a, O, Q> HasOneOrMany<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    pub fn has_one(
        query: Q,
        parent: &'a O,
        foreign_key: impl Into<String>,
        local_key: impl Into<String>,
        config: RelationConfig,
    ) -> Self {
        Self::new(RelationKind::HasOne, query, parent, foreign_key, local_key, config)
    }

    pub fn has_many(
        query: Q,
        parent: &'a O,
        foreign_key: impl Into<String>,
        local_key: impl Into<String>,
        config: RelationConfig,
    ) -> Self {
        Self::new(RelationKind::HasMany, query, parent, foreign_key, local_key, config)
    }

    fn new(
        kind: RelationKind,
        query: Q,
        parent: &'a O,
        foreign_key: impl Into<String>,
        local_key: impl Into<String>,
        config: RelationConfig,
    ) -> Self {
        let metadata =
            RelationMetadata::new(kind, <Q::Record as Model>::NAME, foreign_key, local_key);
        let mut relation = Self {
            query,
            parent,
            metadata,
        };
        if config.apply_constraints {
            relation.add_constraints();
        }
        relation
    }

    pub fn parent(&self) -> &O {
        self.parent
    }
}

#[async_trait]
impl<'a, O, Q> Relation<O> for HasOneOrMany<'a, O, Q>
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
        let dictionary = build_dictionary(results, by_field(&self.metadata.foreign_key));
        match_owners(
            owners,
            &dictionary,
            by_field(&self.metadata.local_key),
            slot,
            self.metadata.kind.cardinality(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDocument, MemoryStore};
    use crate::model::Loaded;
    use crate::relationships::fixtures::{Comment, Post, Profile, User};
    use serde_json::json;

    #[tokio::test]
    async fn test_has_many_lazy_results() {
        let store = MemoryStore::new();
        for (id, post) in [(1, 10), (2, 11), (3, 10)] {
            MemoryDocument::<Comment>::create(&store, json!({ "_id": id, "post_id": post }))
                .await
                .unwrap();
        }
        let post = MemoryDocument::<Post>::from_value(&store, json!({ "_id": 10 }));

        let relation = HasOneOrMany::has_many(store.query::<Comment>(), &post, "post_id", "_id", RelationConfig::default());
        assert_eq!(relation.get_results().await.unwrap().len(), 2);
    }

    #[test]
    fn test_has_one_match_takes_first_record() {
        let store = MemoryStore::new();
        let template = MemoryDocument::<User>::new(&store);
        let relation = HasOneOrMany::has_one(store.query::<Profile>(), &template, "user_id", "_id", RelationConfig::eager());

        let mut users = vec![
            MemoryDocument::<User>::from_value(&store, json!({ "_id": 1 })),
            MemoryDocument::<User>::from_value(&store, json!({ "_id": 2 })),
        ];
        let profiles = vec![
            MemoryDocument::<Profile>::from_value(&store, json!({ "_id": "p1", "user_id": 1 })),
            MemoryDocument::<Profile>::from_value(&store, json!({ "_id": "p2", "user_id": 1 })),
        ];

        relation.init_relation(&mut users, "profile");
        relation.match_related(&mut users, &profiles, "profile");

        let first: &Loaded<MemoryDocument<Profile>> = users[0].relation("profile").unwrap();
        assert_eq!(first.as_one(), Some(&profiles[0]));
        let second: &Loaded<MemoryDocument<Profile>> = users[1].relation("profile").unwrap();
        assert_eq!(second, &Loaded::One(None));
    }
}
