//! ContainsOne Relation - Owner holds a single reference field

use async_trait::async_trait;
use tracing::debug;

use crate::config::RelationConfig;
use crate::dictionary::{build_dictionary, by_field, match_owners, Cardinality};
use crate::error::RelationResult;
use crate::identifier::{normalize, IdInput};
use crate::model::{HasRelation, Model, Record};
use crate::mutator;
use crate::query::DocumentQuery;

use super::metadata::{RelationKind, RelationMetadata};
use super::traits::{collect_keys, constrain_eq, single_key, RelatedOf, Relation};

/// Owner field `local_key` holds the key of one related record
pub struct ContainsOne<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    query: Q,
    parent: &'a mut O,
    metadata: RelationMetadata,
    config: RelationConfig,
}

impl<'a, O, Q> ContainsOne<'a, O, Q>
where
    O: Record,
    Q: DocumentQuery,
{
    /// `foreign_key` is the related key field, `local_key` the owner's
    /// reference field
    pub fn new(
        query: Q,
        parent: &'a mut O,
        foreign_key: impl Into<String>,
        local_key: impl Into<String>,
        config: RelationConfig,
    ) -> Self {
        let metadata = RelationMetadata::new(
            RelationKind::ContainsOne,
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

    /// Point the owner's reference field at `id` and persist the owner
    pub async fn attach<'i>(&mut self, id: impl Into<IdInput<'i>>) -> RelationResult<()> {
        let id = normalize(id.into(), self.config.convert_ids)?;
        mutator::assign(&mut *self.parent, &self.metadata.local_key, id.to_value()).await?;
        debug!(relation = %self.metadata.display_name(), id = %id, "attached");
        Ok(())
    }

    /// Clear the reference if it points at `id`, or unconditionally when no
    /// id is given. Returns whether the field was cleared.
    pub async fn detach<'i>(&mut self, id: Option<IdInput<'i>>) -> RelationResult<bool> {
        let local_key = &self.metadata.local_key;

        if let Some(id) = id {
            let id = normalize(id, self.config.convert_ids)?;
            if single_key(&*self.parent, local_key).as_ref() != Some(&id) {
                debug!(relation = %self.metadata.display_name(), id = %id, "detach skipped, not referenced");
                return Ok(false);
            }
        }

        mutator::assign(&mut *self.parent, local_key, serde_json::Value::Null).await?;
        Ok(true)
    }

    /// Persist `related`, then reference it from the owner
    pub async fn save(&mut self, related: &mut RelatedOf<Q>) -> RelationResult<()> {
        related.save().await?;
        self.attach(IdInput::Record(&*related)).await
    }
}

#[async_trait]
impl<'a, O, Q> Relation<O> for ContainsOne<'a, O, Q>
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
        let value = single_key(&*self.parent, &self.metadata.local_key).map(|id| id.to_value());
        constrain_eq(&mut self.query, &self.metadata.foreign_key, value);
    }

    fn add_eager_constraints(&mut self, owners: &[O]) {
        let keys = collect_keys(owners, &self.metadata.local_key, &self.metadata.foreign_key);
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
            Cardinality::One,
        );
    }
}
