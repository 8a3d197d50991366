//! Eager Loading - Resolve one relation for a batch of owners

use tracing::debug;

use crate::error::RelationResult;
use crate::model::HasRelation;
use crate::query::DocumentQuery;

use super::traits::{RelatedOf, Relation};

/// Load `relation` into `slot` on every owner with a single query.
///
/// The descriptor should be built with constraints disabled
/// (`RelationConfig::eager()`); its own owner only serves as a template.
/// Every slot is initialized first, so owners without matches end up absent
/// (singular) or empty (plural).
pub async fn eager_load<O, Rel>(relation: &mut Rel, owners: &mut [O], slot: &str) -> RelationResult<()>
where
    O: HasRelation<RelatedOf<Rel::Query>>,
    Rel: Relation<O> + ?Sized,
{
    if owners.is_empty() {
        return Ok(());
    }

    relation.add_eager_constraints(owners);
    relation.init_relation(owners, slot);

    let results = relation.query().get().await?;
    relation.match_related(owners, &results, slot);

    debug!(
        relation = %relation.metadata().display_name(),
        owners = owners.len(),
        related = results.len(),
        "eager loaded relation"
    );
    Ok(())
}
