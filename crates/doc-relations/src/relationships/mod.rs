//! Relationships module - relation descriptors for document records
//!
//! Every descriptor composes the identifier normalizer, the array mutator,
//! the dictionary matcher and the sync engine according to where the
//! reference lives:
//!
//! - owner holds the reference: [`ContainsOne`], [`ContainsFew`], [`BelongsTo`]
//! - related holds the reference: [`IncludedIn`], [`IncludedInMany`],
//!   [`HasOneOrMany`]
//! - both sides hold arrays: [`BelongsToMany`]

pub mod belongs_to;
pub mod belongs_to_many;
pub mod contains_few;
pub mod contains_one;
pub mod eager_loading;
pub mod has_one_or_many;
pub mod hybrid;
pub mod included_in;
pub mod included_in_many;
pub mod inference;
pub mod metadata;
pub mod traits;

pub use belongs_to::BelongsTo;
pub use belongs_to_many::BelongsToMany;
pub use contains_few::ContainsFew;
pub use contains_one::ContainsOne;
pub use eager_loading::eager_load;
pub use has_one_or_many::HasOneOrMany;
pub use hybrid::{Declared, HybridRelations};
pub use included_in::IncludedIn;
pub use included_in_many::IncludedInMany;
pub use inference::to_snake_case;
pub use metadata::{RelationKind, RelationMetadata, RelationVariant};
pub use traits::{RelatedOf, Relation};

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::memory::Schema;
    use crate::model::StoreKind;

    macro_rules! schema {
        ($name:ident, $collection:literal) => {
            pub struct $name;

            impl Schema for $name {
                const NAME: &'static str = stringify!($name);
                const COLLECTION: &'static str = $collection;
            }
        };
    }

    schema!(User, "users");
    schema!(Post, "posts");
    schema!(BlogPost, "blog_posts");
    schema!(Tag, "tags");
    schema!(Address, "addresses");
    schema!(Category, "categories");
    schema!(Group, "groups");
    schema!(Role, "roles");
    schema!(Comment, "comments");
    schema!(Profile, "profiles");

    /// Lives in the relational store
    pub struct Account;

    impl Schema for Account {
        const NAME: &'static str = "Account";
        const COLLECTION: &'static str = "accounts";
        const STORE: StoreKind = StoreKind::Relational;
    }
}
