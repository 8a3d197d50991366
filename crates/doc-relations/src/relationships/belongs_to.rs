//! BelongsTo Relation - Owner names the related record in a scalar field

use async_trait::async_trait;

use crate::config::RelationConfig;
use crate::dictionary::{build_dictionary, by_field, match_owners, Cardinality};
use crate::model::{HasRelation, Model, Record};
use crate::query::DocumentQuery;

use super::metadata::{RelationKind, RelationMetadata};
use super::traits::{collect_keys, constrain_eq, single_key, RelatedOf, Relation};

/// Owner field `foreign_key` holds the related `other_key`. Read-only.
pub struct BelongsTo<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    query: Q,
    parent: &'a O,
    metadata: RelationMetadata,
}

impl<'a, O, Q> BelongsTo<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    pub fn new(
        query: Q,
        parent: &'a O,
        foreign_key: impl Into<String>,
        other_key: impl Into<String>,
        name: impl Into<String>,
        config: RelationConfig,
    ) -> Self {
        let metadata = RelationMetadata::new(
            RelationKind::BelongsTo,
            <Q::Record as Model>::NAME,
            foreign_key,
            other_key,
        )
        .with_name(name);
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

    pub fn other_key(&self) -> &str {
        &self.metadata.local_key
    }
}

#[async_trait]
impl<'a, O, Q> Relation<O> for BelongsTo<'a, O, Q>
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
        let value = single_key(self.parent, &self.metadata.foreign_key).map(|id| id.to_value());
        constrain_eq(&mut self.query, &self.metadata.local_key, value);
    }

    fn add_eager_constraints(&mut self, owners: &[O]) {
        let keys = collect_keys(owners, &self.metadata.foreign_key, &self.metadata.local_key);
        self.query.where_in(&self.metadata.local_key, keys);
    }

    fn match_related(&self, owners: &mut [O], results: &[RelatedOf<Q>], slot: &str)
    where
        O: HasRelation<RelatedOf<Q>>,
    {
        let dictionary = build_dictionary(results, by_field(&self.metadata.local_key));
        match_owners(
            owners,
            &dictionary,
            by_field(&self.metadata.foreign_key),
            slot,
            Cardinality::One,
        );
    }
}
