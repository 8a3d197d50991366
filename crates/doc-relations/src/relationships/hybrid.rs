//! Relation declaration surface
//!
//! Model methods that build relation descriptors with conventional key names.
//! The store capability of the related model is checked once here: kinds with
//! a relational counterpart hand their resolved metadata to the host's
//! relational layer instead of building a document descriptor.

use tracing::debug;

use crate::config::RelationConfig;
use crate::model::{Model, StoreKind};
use crate::query::DocumentQuery;

use super::belongs_to::BelongsTo;
use super::belongs_to_many::BelongsToMany;
use super::contains_few::ContainsFew;
use super::contains_one::ContainsOne;
use super::has_one_or_many::HasOneOrMany;
use super::included_in::IncludedIn;
use super::included_in_many::IncludedInMany;
use super::inference::default_keys;
use super::metadata::{RelationKind, RelationMetadata};

/// Outcome of a declaration
#[derive(Debug)]
pub enum Declared<T> {
    /// The related model lives in the document store
    Document(T),
    /// The related model lives in a relational store; resolve it there
    Relational(RelationMetadata),
}

impl<T> Declared<T> {
    pub fn document(self) -> Option<T> {
        match self {
            Declared::Document(relation) => Some(relation),
            Declared::Relational(_) => None,
        }
    }

    pub fn relational(&self) -> Option<&RelationMetadata> {
        match self {
            Declared::Document(_) => None,
            Declared::Relational(metadata) => Some(metadata),
        }
    }

    pub fn is_relational(&self) -> bool {
        matches!(self, Declared::Relational(_))
    }
}

/// Resolve key names, falling back to the conventional defaults
fn resolve_keys<O: Model, R: Model>(
    kind: RelationKind,
    foreign_key: Option<&str>,
    local_key: Option<&str>,
) -> (String, String) {
    let (default_foreign, default_local) = default_keys::<O, R>(kind);
    (
        foreign_key.map(str::to_string).unwrap_or(default_foreign),
        local_key.map(str::to_string).unwrap_or(default_local),
    )
}

/// Hand-off metadata when `R` is stored relationally
fn relational<O: Model, R: Model>(
    kind: RelationKind,
    foreign_key: &str,
    local_key: &str,
    name: Option<&str>,
) -> Option<RelationMetadata> {
    if R::STORE != StoreKind::Relational {
        return None;
    }

    let mut metadata = RelationMetadata::new(kind, R::NAME, foreign_key, local_key);
    if let Some(name) = name {
        metadata = metadata.with_name(name);
    }
    debug!(owner = O::NAME, related = R::NAME, kind = ?kind, "relation handed to relational store");
    Some(metadata)
}

/// Relation declarations available on every model
pub trait HybridRelations: Model {
    /// One related record whose `foreign_key` (default `snake(Self)_id`) holds
    /// this model's `local_key` (default key field)
    fn has_one<Q: DocumentQuery>(
        &self,
        query: Q,
        foreign_key: Option<&str>,
        local_key: Option<&str>,
        config: RelationConfig,
    ) -> Declared<HasOneOrMany<'_, Self, Q>> {
        let kind = RelationKind::HasOne;
        let (foreign_key, local_key) = resolve_keys::<Self, Q::Record>(kind, foreign_key, local_key);
        match relational::<Self, Q::Record>(kind, &foreign_key, &local_key, None) {
            Some(metadata) => Declared::Relational(metadata),
            None => Declared::Document(HasOneOrMany::has_one(query, self, foreign_key, local_key, config)),
        }
    }

    fn has_many<Q: DocumentQuery>(
        &self,
        query: Q,
        foreign_key: Option<&str>,
        local_key: Option<&str>,
        config: RelationConfig,
    ) -> Declared<HasOneOrMany<'_, Self, Q>> {
        let kind = RelationKind::HasMany;
        let (foreign_key, local_key) = resolve_keys::<Self, Q::Record>(kind, foreign_key, local_key);
        match relational::<Self, Q::Record>(kind, &foreign_key, &local_key, None) {
            Some(metadata) => Declared::Relational(metadata),
            None => Declared::Document(HasOneOrMany::has_many(query, self, foreign_key, local_key, config)),
        }
    }

    /// This model's `foreign_key` (default `snake(Related)_id`) holds the
    /// related `other_key` (default related key field)
    fn belongs_to<Q: DocumentQuery>(
        &self,
        query: Q,
        name: &str,
        foreign_key: Option<&str>,
        other_key: Option<&str>,
        config: RelationConfig,
    ) -> Declared<BelongsTo<'_, Self, Q>> {
        let kind = RelationKind::BelongsTo;
        let (foreign_key, other_key) = resolve_keys::<Self, Q::Record>(kind, foreign_key, other_key);
        match relational::<Self, Q::Record>(kind, &foreign_key, &other_key, Some(name)) {
            Some(metadata) => Declared::Relational(metadata),
            None => Declared::Document(BelongsTo::new(query, self, foreign_key, other_key, name, config)),
        }
    }

    /// Mirrored arrays: related `foreign_key` (default `snake(Self)_ids`) and
    /// this model's `other_key` (default `snake(Related)_ids`)
    fn belongs_to_many<Q: DocumentQuery>(
        &mut self,
        query: Q,
        name: &str,
        foreign_key: Option<&str>,
        other_key: Option<&str>,
        config: RelationConfig,
    ) -> Declared<BelongsToMany<'_, Self, Q>> {
        let kind = RelationKind::BelongsToMany;
        let (foreign_key, other_key) = resolve_keys::<Self, Q::Record>(kind, foreign_key, other_key);
        match relational::<Self, Q::Record>(kind, &foreign_key, &other_key, Some(name)) {
            Some(metadata) => Declared::Relational(metadata),
            None => Declared::Document(BelongsToMany::new(
                query,
                self,
                foreign_key,
                other_key,
                name,
                config,
            )),
        }
    }

    /// This model's `local_key` (default `snake(Related)_id`) references the
    /// related `foreign_key` (default related key field)
    fn contains_one<Q: DocumentQuery>(
        &mut self,
        query: Q,
        local_key: Option<&str>,
        foreign_key: Option<&str>,
        config: RelationConfig,
    ) -> ContainsOne<'_, Self, Q> {
        let (foreign_key, local_key) =
            resolve_keys::<Self, Q::Record>(RelationKind::ContainsOne, foreign_key, local_key);
        ContainsOne::new(query, self, foreign_key, local_key, config)
    }

    /// This model's `local_key` array (default `snake(Related)_ids`)
    fn contains_few<Q: DocumentQuery>(
        &mut self,
        query: Q,
        local_key: Option<&str>,
        foreign_key: Option<&str>,
        config: RelationConfig,
    ) -> ContainsFew<'_, Self, Q> {
        let (foreign_key, local_key) =
            resolve_keys::<Self, Q::Record>(RelationKind::ContainsFew, foreign_key, local_key);
        ContainsFew::new(query, self, foreign_key, local_key, config)
    }

    /// The related record whose `other_key` holds this model's `local_key`
    fn included_in<Q: DocumentQuery>(
        &self,
        query: Q,
        other_key: &str,
        local_key: Option<&str>,
        config: RelationConfig,
    ) -> IncludedIn<'_, Self, Q> {
        let (other_key, local_key) =
            resolve_keys::<Self, Q::Record>(RelationKind::IncludedIn, Some(other_key), local_key);
        IncludedIn::new(query, self, other_key, local_key, config)
    }

    /// Every related record whose `other_key` (default `snake(Self)s`) holds
    /// this model's `local_key`
    fn included_in_many<Q: DocumentQuery>(
        &self,
        query: Q,
        other_key: Option<&str>,
        local_key: Option<&str>,
        config: RelationConfig,
    ) -> IncludedInMany<'_, Self, Q> {
        let (other_key, local_key) =
            resolve_keys::<Self, Q::Record>(RelationKind::IncludedInMany, other_key, local_key);
        IncludedInMany::new(query, self, other_key, local_key, config)
    }
}

impl<M: Model> HybridRelations for M {}
