//! Relation Metadata - Kind and key configuration of a declared relation

use serde::{Deserialize, Serialize};

use crate::dictionary::Cardinality;

/// Declared relation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// Owner holds a single reference field
    ContainsOne,
    /// Owner holds an array of references
    ContainsFew,
    /// One related record holds the owner's key in its field
    IncludedIn,
    /// Many related records hold the owner's key in their array field
    IncludedInMany,
    /// Owner and related hold mirrored arrays of each other's keys
    BelongsToMany,
    /// Related record holds a scalar foreign key naming the owner
    HasOne,
    /// Related records hold a scalar foreign key naming the owner
    HasMany,
    /// Owner holds a scalar foreign key naming the related record
    BelongsTo,
}

/// Behavioral strategy behind a relation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationVariant {
    EmbeddedRef,
    EmbeddedRefs,
    InverseRef,
    InverseRefs,
    PivotArrays,
    ForeignKey,
}

impl RelationKind {
    pub fn variant(self) -> RelationVariant {
        match self {
            Self::ContainsOne => RelationVariant::EmbeddedRef,
            Self::ContainsFew => RelationVariant::EmbeddedRefs,
            Self::IncludedIn => RelationVariant::InverseRef,
            Self::IncludedInMany => RelationVariant::InverseRefs,
            Self::BelongsToMany => RelationVariant::PivotArrays,
            Self::HasOne | Self::HasMany | Self::BelongsTo => RelationVariant::ForeignKey,
        }
    }

    /// Returns true if this relation loads a collection
    pub fn is_collection(self) -> bool {
        matches!(
            self,
            Self::ContainsFew | Self::IncludedInMany | Self::BelongsToMany | Self::HasMany
        )
    }

    pub fn cardinality(self) -> Cardinality {
        if self.is_collection() {
            Cardinality::Many
        } else {
            Cardinality::One
        }
    }

    /// Returns true if a relational-store counterpart exists for this kind
    pub fn has_relational_counterpart(self) -> bool {
        matches!(
            self,
            Self::HasOne | Self::HasMany | Self::BelongsTo | Self::BelongsToMany
        )
    }

    /// Returns true if attach/detach mutate array fields
    pub fn mutates_arrays(self) -> bool {
        matches!(
            self,
            Self::ContainsFew | Self::IncludedIn | Self::IncludedInMany | Self::BelongsToMany
        )
    }
}

/// Resolved configuration of one relation
///
/// `foreign_key` and `local_key` follow each declaration's parameters:
///
/// | kind | `foreign_key` | `local_key` |
/// |---|---|---|
/// | ContainsOne / ContainsFew | related key | owner reference field |
/// | IncludedIn / IncludedInMany | related field holding owner keys | owner key |
/// | BelongsToMany | related array of owner keys | owner array of related keys |
/// | HasOne / HasMany | related field naming the owner | owner key |
/// | BelongsTo | owner field naming the related | related key |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationMetadata {
    pub kind: RelationKind,

    /// Relation name, required for BelongsTo and BelongsToMany
    pub name: Option<String>,

    /// The related model's type name
    pub related_model: String,

    pub foreign_key: String,

    pub local_key: String,
}

impl RelationMetadata {
    pub fn new(
        kind: RelationKind,
        related_model: impl Into<String>,
        foreign_key: impl Into<String>,
        local_key: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: None,
            related_model: related_model.into(),
            foreign_key: foreign_key.into(),
            local_key: local_key.into(),
        }
    }

    /// Set the relation name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name used in logs: the relation name, or the kind and related model
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{:?}<{}>", self.kind, self.related_model),
        }
    }
}
