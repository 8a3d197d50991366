//! Array field mutations with set semantics
//!
//! Each operation reads the current array, computes the new value and persists
//! the owning record. A rejected save restores the previous field value, so a
//! change is only visible once it is persisted. There is no optimistic
//! concurrency check: callers serialize writers per record.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::RelationResult;
use crate::identifier::{canonical_of, normalize, normalize_many, reduce_to_key, IdInput};
use crate::model::{array_values, Record};

/// Canonical form of an array element, reading embedded documents through
/// `embedded_key`
fn element_key(item: &Value, embedded_key: Option<&str>) -> Option<String> {
    match embedded_key {
        Some(key_name) => canonical_of(reduce_to_key(item, key_name)),
        None => canonical_of(item),
    }
}

/// Append an id to the array at `field`.
///
/// With `distinct`, an id already present is a no-op returning `false`.
/// Values are expected to be converted by the caller already.
pub async fn push<R: Record + ?Sized>(
    record: &mut R,
    field: &str,
    value: IdInput<'_>,
    distinct: bool,
) -> RelationResult<bool> {
    push_inner(record, field, None, value, distinct).await
}

/// Like [`push`] for reference arrays that may hold embedded documents: an
/// element carrying `embedded_key` counts as that key.
pub async fn push_reference<R: Record + ?Sized>(
    record: &mut R,
    field: &str,
    embedded_key: &str,
    value: IdInput<'_>,
) -> RelationResult<bool> {
    push_inner(record, field, Some(embedded_key), value, true).await
}

async fn push_inner<R: Record + ?Sized>(
    record: &mut R,
    field: &str,
    embedded_key: Option<&str>,
    value: IdInput<'_>,
    distinct: bool,
) -> RelationResult<bool> {
    let id = normalize(value, false)?;
    let canonical = id.canonical();
    let mut items = array_values(record, field);

    if distinct
        && items
            .iter()
            .any(|item| element_key(item, embedded_key).as_deref() == Some(canonical.as_ref()))
    {
        debug!(model = record.model_name(), field, id = %id, "push skipped, id already present");
        return Ok(false);
    }

    items.push(id.to_value());
    assign(record, field, Value::Array(items)).await?;
    debug!(model = record.model_name(), field, id = %id, "pushed id");
    Ok(true)
}

/// Remove every element of the array at `field` matching one of `values`.
/// Returns the number of elements removed.
pub async fn pull<'v, R, I>(record: &mut R, field: &str, values: I) -> RelationResult<usize>
where
    R: Record + ?Sized,
    I: IntoIterator<Item = IdInput<'v>>,
{
    pull_inner(record, field, None, values).await
}

/// Like [`pull`], also removing embedded documents whose `embedded_key`
/// matches.
pub async fn pull_references<'v, R, I>(
    record: &mut R,
    field: &str,
    embedded_key: &str,
    values: I,
) -> RelationResult<usize>
where
    R: Record + ?Sized,
    I: IntoIterator<Item = IdInput<'v>>,
{
    pull_inner(record, field, Some(embedded_key), values).await
}

async fn pull_inner<'v, R, I>(
    record: &mut R,
    field: &str,
    embedded_key: Option<&str>,
    values: I,
) -> RelationResult<usize>
where
    R: Record + ?Sized,
    I: IntoIterator<Item = IdInput<'v>>,
{
    let targets: HashSet<String> = normalize_many(values, false)?
        .iter()
        .map(|id| id.to_string())
        .collect();

    let items = array_values(record, field);
    let before = items.len();
    let kept: Vec<Value> = items
        .into_iter()
        .filter(|item| match element_key(item, embedded_key) {
            Some(canonical) => !targets.contains(&canonical),
            None => true,
        })
        .collect();
    let removed = before - kept.len();

    assign(record, field, Value::Array(kept)).await?;
    debug!(model = record.model_name(), field, removed, "pulled ids");
    Ok(removed)
}

/// Empty the array at `field`
pub async fn clear<R: Record + ?Sized>(record: &mut R, field: &str) -> RelationResult<()> {
    assign(record, field, Value::Array(Vec::new())).await?;
    debug!(model = record.model_name(), field, "cleared array field");
    Ok(())
}

/// Set `field` and persist, restoring the previous value if the save fails
pub async fn assign<R: Record + ?Sized>(
    record: &mut R,
    field: &str,
    value: Value,
) -> RelationResult<()> {
    let previous = record.get(field);
    record.set(field, value);

    if let Err(err) = record.save().await {
        match previous {
            Some(previous) => record.set(field, previous),
            None => record.unset(field),
        }
        warn!(model = record.model_name(), field, error = %err, "save rejected, field restored");
        return Err(err);
    }
    Ok(())
}
