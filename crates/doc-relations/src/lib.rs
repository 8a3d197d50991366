//! # elif-doc-relations: Document Relations for elif.rs
//!
//! Relation resolution between records kept in a document store: references
//! held as scalar fields, as arrays on the owner, as arrays on the related
//! side, or mirrored on both sides.
//!
//! This crate provides identifier normalization, set-semantics array
//! mutation, dictionary-based eager matching, sync reconciliation, and the
//! relation descriptors built on top of them. Records and queries are reached
//! through the [`Record`], [`Model`] and [`DocumentQuery`] collaborator traits;
//! [`memory`] implements them in memory.

pub mod config;
pub mod dictionary;
pub mod error;
pub mod identifier;
pub mod memory;
pub mod model;
pub mod mutator;
pub mod query;
pub mod reconcile;
pub mod relationships;

// Re-export core traits and types
pub use config::*;
pub use dictionary::{build_dictionary, match_owners, Cardinality, Dictionary};
pub use error::*;
pub use identifier::{normalize, normalize_many, IdInput, Identifier, ObjectId};
pub use model::*;
pub use query::*;
pub use reconcile::{sync, ChangeReport, Reconcile, SyncList};
pub use relationships::*;
