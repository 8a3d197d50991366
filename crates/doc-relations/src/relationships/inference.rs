//! Relation Key Inference - Default key names derived from model names

use crate::model::Model;

use super::metadata::RelationKind;

pub fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            result.push('_');
        }
        result.push(c.to_lowercase().next().unwrap_or(c));
    }
    result
}

/// Default `(foreign_key, local_key)` for a relation from `Owner` to
/// `Related`, in the order `RelationMetadata` stores them.
///
/// `IncludedIn` has no default field on the related side and yields an empty
/// foreign key; its declaration requires one.
pub fn default_keys<Owner: Model, Related: Model>(kind: RelationKind) -> (String, String) {
    let owner = to_snake_case(Owner::NAME);
    let related = to_snake_case(Related::NAME);

    match kind {
        RelationKind::HasOne | RelationKind::HasMany => {
            (Owner::foreign_key(), Owner::KEY_NAME.to_string())
        }
        RelationKind::BelongsTo => (Related::foreign_key(), Related::KEY_NAME.to_string()),
        RelationKind::BelongsToMany => (format!("{}_ids", owner), format!("{}_ids", related)),
        RelationKind::ContainsOne => (Related::KEY_NAME.to_string(), format!("{}_id", related)),
        RelationKind::ContainsFew => (Related::KEY_NAME.to_string(), format!("{}_ids", related)),
        RelationKind::IncludedIn => (String::new(), Owner::KEY_NAME.to_string()),
        RelationKind::IncludedInMany => (format!("{}s", owner), Owner::KEY_NAME.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("Tag"), "tag");
        assert_eq!(to_snake_case("BlogPost"), "blog_post");
        assert_eq!(to_snake_case("user"), "user");
    }
}
