//! Dictionary matching for eager loads
//!
//! Related records are indexed once under the canonical rendering of a key
//! (every element, for array keys). Owners then look their keys up, so a batch
//! match costs O(owners + related) instead of a nested loop.

use std::collections::{HashMap, HashSet};

use crate::identifier::canonical_of;
use crate::model::{key_or_field, HasRelation, Loaded, Record};

/// How many related records a relation slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Canonical key renderings of `field` on `record`, fanning out over arrays.
/// Values with no identifier form are skipped.
pub fn key_values<R: Record + ?Sized>(record: &R, field: &str) -> Vec<String> {
    match key_or_field(record, field) {
        None => Vec::new(),
        Some(serde_json::Value::Array(items)) => items.iter().filter_map(canonical_of).collect(),
        Some(value) => canonical_of(&value).into_iter().collect(),
    }
}

/// Key selector reading `field` (or the record key)
pub fn by_field<'f, R>(field: &'f str) -> impl Fn(&R) -> Vec<String> + 'f
where
    R: Record + ?Sized + 'f,
{
    move |record| key_values(record, field)
}

/// Lookup from canonical key to the records indexed under it
#[derive(Debug)]
pub struct Dictionary<'r, R> {
    entries: HashMap<String, Vec<&'r R>>,
}

impl<'r, R> Dictionary<'r, R> {
    /// Records indexed under `key`, in input order
    pub fn get(&self, key: &str) -> &[&'r R] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the record indexed last under each key
    pub fn keep_last(mut self) -> Self {
        for records in self.entries.values_mut() {
            if let Some(last) = records.pop() {
                records.clear();
                records.push(last);
            }
        }
        self
    }
}

/// Index `records` under every key `selector` yields for them
pub fn build_dictionary<'r, R, F>(records: &'r [R], selector: F) -> Dictionary<'r, R>
where
    F: Fn(&R) -> Vec<String>,
{
    let mut entries: HashMap<String, Vec<&'r R>> = HashMap::new();

    for record in records {
        let mut seen = HashSet::new();
        for key in selector(record) {
            if seen.insert(key.clone()) {
                entries.entry(key).or_default().push(record);
            }
        }
    }

    Dictionary { entries }
}

/// Assign matched related records onto owners.
///
/// Owners without any match are left untouched, keeping whatever slot value
/// was initialized before matching. A singular slot takes the first record
/// found; a plural slot takes every match once, ordered by the owner's keys.
pub fn match_owners<O, R, F>(
    owners: &mut [O],
    dictionary: &Dictionary<'_, R>,
    owner_keys: F,
    slot: &str,
    cardinality: Cardinality,
) where
    O: HasRelation<R>,
    R: Clone,
    F: Fn(&O) -> Vec<String>,
{
    for owner in owners.iter_mut() {
        let mut seen: HashSet<*const R> = HashSet::new();
        let mut matched: Vec<&R> = Vec::new();

        for key in owner_keys(owner) {
            for related in dictionary.get(&key) {
                if seen.insert(*related as *const R) {
                    matched.push(*related);
                }
            }
        }

        if matched.is_empty() {
            continue;
        }

        let loaded = match cardinality {
            Cardinality::One => Loaded::One(matched.first().map(|related| (*related).clone())),
            Cardinality::Many => Loaded::Many(matched.into_iter().cloned().collect()),
        };
        owner.set_relation(slot, loaded);
    }
}

/// Pre-populate `slot` on every owner: absent for singular, empty for plural
pub fn init_slots<O, R>(owners: &mut [O], slot: &str, cardinality: Cardinality)
where
    O: HasRelation<R>,
{
    for owner in owners.iter_mut() {
        let empty = match cardinality {
            Cardinality::One => Loaded::One(None),
            Cardinality::Many => Loaded::Many(Vec::new()),
        };
        owner.set_relation(slot, empty);
    }
}
