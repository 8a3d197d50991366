//! In-memory document store
//!
//! Implements the record and query collaborators over a shared map of
//! collections. Used by the crate's tests and benchmarks; writes can be made to
//! fail after a budget to exercise persistence failures.

mod query;

pub use query::MemoryQuery;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{RelationError, RelationResult};
use crate::identifier::{from_value, Identifier, ObjectId};
use crate::model::{HasRelation, Loaded, Model, Record, StoreKind, DEFAULT_KEY_NAME};

/// Field written by `touch`
pub const UPDATED_AT: &str = "updated_at";

/// Static description of a stored document type
pub trait Schema: 'static {
    const NAME: &'static str;
    const COLLECTION: &'static str;
    const KEY_NAME: &'static str = DEFAULT_KEY_NAME;
    const STORE: StoreKind = StoreKind::Document;
}

#[derive(Debug, Default)]
pub(crate) struct State {
    collections: HashMap<String, Vec<Map<String, Value>>>,
    /// Remaining successful writes; `None` is unlimited
    write_budget: Option<usize>,
    writes: usize,
}

impl State {
    pub(crate) fn collection(&self, name: &str) -> &[Map<String, Value>] {
        self.collections.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn collection_mut(&mut self, name: &str) -> &mut Vec<Map<String, Value>> {
        self.collections.entry(name.to_string()).or_default()
    }

    /// Claim one write from the budget
    pub(crate) fn begin_write(&mut self, collection: &str) -> RelationResult<()> {
        match self.write_budget {
            Some(0) => Err(RelationError::PersistenceFailure(format!(
                "write to '{}' rejected",
                collection
            ))),
            Some(ref mut remaining) => {
                *remaining -= 1;
                self.writes += 1;
                Ok(())
            }
            None => {
                self.writes += 1;
                Ok(())
            }
        }
    }
}

/// Key of a stored document, in canonical form
pub(crate) fn document_key(fields: &Map<String, Value>, key_name: &str) -> Option<String> {
    fields
        .get(key_name)
        .and_then(|value| from_value(value, false).ok())
        .map(|id| id.to_string())
}

/// Shared in-memory document store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the next `n` writes succeed and reject every write after them
    pub async fn fail_writes_after(&self, n: usize) {
        self.state.write().await.write_budget = Some(n);
    }

    pub async fn allow_writes(&self) {
        self.state.write().await.write_budget = None;
    }

    /// Number of successful writes so far
    pub async fn write_count(&self) -> usize {
        self.state.read().await.writes
    }

    /// Load a stored document by key
    pub async fn find<S: Schema>(&self, id: &Identifier) -> Option<MemoryDocument<S>> {
        let state = self.state.read().await;
        let canonical = id.canonical();
        state
            .collection(S::COLLECTION)
            .iter()
            .find(|fields| document_key(fields, S::KEY_NAME).as_deref() == Some(canonical.as_ref()))
            .map(|fields| MemoryDocument::from_fields(self, fields.clone()))
    }

    /// Every stored document of `S`, in insertion order
    pub async fn documents<S: Schema>(&self) -> Vec<MemoryDocument<S>> {
        let state = self.state.read().await;
        state
            .collection(S::COLLECTION)
            .iter()
            .map(|fields| MemoryDocument::from_fields(self, fields.clone()))
            .collect()
    }

    /// A fresh query over `S`
    pub fn query<S: Schema>(&self) -> MemoryQuery<S> {
        MemoryQuery::new(self.clone())
    }

    pub(crate) fn state(&self) -> &Arc<RwLock<State>> {
        &self.state
    }
}

type SlotValue = Arc<dyn Any + Send + Sync>;

/// A loaded relation slot and the function that re-reads it from the store
#[derive(Clone)]
struct Slot {
    value: SlotValue,
    reload: fn(&State, &SlotValue) -> Option<SlotValue>,
}

fn reload_slot<T: Schema>(state: &State, value: &SlotValue) -> Option<SlotValue> {
    let loaded = value.downcast_ref::<Loaded<MemoryDocument<T>>>()?;
    let reload = |document: &MemoryDocument<T>| {
        let mut document = document.clone();
        let key = document_key(&document.fields, T::KEY_NAME);
        if let Some(stored) = state
            .collection(T::COLLECTION)
            .iter()
            .find(|stored| key.is_some() && document_key(stored, T::KEY_NAME) == key)
        {
            document.fields = stored.clone();
        }
        document
    };

    let reloaded = match loaded {
        Loaded::One(record) => Loaded::One(record.as_ref().map(&reload)),
        Loaded::Many(records) => Loaded::Many(records.iter().map(&reload).collect()),
    };
    Some(Arc::new(reloaded))
}

/// One document of type `S`, detached from the store until saved
pub struct MemoryDocument<S: Schema> {
    store: MemoryStore,
    fields: Map<String, Value>,
    relations: HashMap<String, Slot>,
    touches: usize,
    _schema: PhantomData<fn() -> S>,
}

impl<S: Schema> MemoryDocument<S> {
    /// An empty unsaved document
    pub fn new(store: &MemoryStore) -> Self {
        Self::from_fields(store, Map::new())
    }

    /// An unsaved document holding the fields of `value`. Non-object values
    /// yield an empty document.
    pub fn from_value(store: &MemoryStore, value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::from_fields(store, fields),
            _ => Self::new(store),
        }
    }

    /// Build and save a document
    pub async fn create(store: &MemoryStore, value: Value) -> RelationResult<Self> {
        let mut document = Self::from_value(store, value);
        document.save().await?;
        Ok(document)
    }

    fn from_fields(store: &MemoryStore, fields: Map<String, Value>) -> Self {
        Self {
            store: store.clone(),
            fields,
            relations: HashMap::new(),
            touches: 0,
            _schema: PhantomData,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// How many times `touch` succeeded on this handle
    pub fn touches(&self) -> usize {
        self.touches
    }

    /// Reload fields from the store, keeping loaded relations
    pub async fn refresh(&mut self) -> RelationResult<()> {
        let key = self
            .key()
            .ok_or_else(|| RelationError::missing_key(S::NAME))?;
        let stored = self
            .store
            .find::<S>(&key)
            .await
            .ok_or_else(|| RelationError::unresolved(S::NAME, &key))?;
        self.fields = stored.fields;
        Ok(())
    }

    /// Re-read every loaded relation slot from the store
    async fn reload_relations(&mut self) {
        if self.relations.is_empty() {
            return;
        }

        let state = self.store.state().read().await;
        for slot in self.relations.values_mut() {
            if let Some(value) = (slot.reload)(&*state, &slot.value) {
                slot.value = value;
            }
        }
        debug!(model = S::NAME, slots = self.relations.len(), "reloaded relations");
    }
}

impl<S: Schema> Clone for MemoryDocument<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            fields: self.fields.clone(),
            relations: self.relations.clone(),
            touches: self.touches,
            _schema: PhantomData,
        }
    }
}

impl<S: Schema> fmt::Debug for MemoryDocument<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(S::NAME)
            .field("fields", &self.fields)
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<S: Schema> PartialEq for MemoryDocument<S> {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

#[async_trait]
impl<S: Schema> Record for MemoryDocument<S> {
    fn model_name(&self) -> &str {
        S::NAME
    }

    fn key_name(&self) -> &str {
        S::KEY_NAME
    }

    fn key(&self) -> Option<Identifier> {
        self.fields
            .get(S::KEY_NAME)
            .and_then(|value| from_value(value, false).ok())
    }

    fn get(&self, field: &str) -> Option<Value> {
        self.fields.get(field).cloned()
    }

    fn set(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_string(), value);
    }

    fn unset(&mut self, field: &str) {
        self.fields.remove(field);
    }

    async fn save(&mut self) -> RelationResult<()> {
        let mut state = self.store.state().write().await;
        state.begin_write(S::COLLECTION)?;

        if self.key().is_none() {
            self.fields.insert(
                S::KEY_NAME.to_string(),
                Identifier::ObjectId(ObjectId::new()).to_value(),
            );
        }

        let key = document_key(&self.fields, S::KEY_NAME);
        let collection = state.collection_mut(S::COLLECTION);
        match collection
            .iter_mut()
            .find(|stored| document_key(stored, S::KEY_NAME) == key)
        {
            Some(stored) => *stored = self.fields.clone(),
            None => collection.push(self.fields.clone()),
        }

        debug!(collection = S::COLLECTION, key = ?key, "saved document");
        Ok(())
    }

    async fn touch(&mut self) -> RelationResult<()> {
        let previous = self.fields.get(UPDATED_AT).cloned();
        self.fields
            .insert(UPDATED_AT.to_string(), Value::String(Utc::now().to_rfc3339()));

        if let Err(err) = self.save().await {
            match previous {
                Some(value) => self.fields.insert(UPDATED_AT.to_string(), value),
                None => self.fields.remove(UPDATED_AT),
            };
            return Err(err);
        }
        self.touches += 1;
        self.reload_relations().await;
        Ok(())
    }
}

impl<S: Schema> Model for MemoryDocument<S> {
    const NAME: &'static str = S::NAME;
    const KEY_NAME: &'static str = S::KEY_NAME;
    const STORE: StoreKind = S::STORE;
}

impl<S: Schema, T: Schema> HasRelation<MemoryDocument<T>> for MemoryDocument<S> {
    fn set_relation(&mut self, slot: &str, value: Loaded<MemoryDocument<T>>) {
        let slot_value = Slot {
            value: Arc::new(value),
            reload: reload_slot::<T>,
        };
        self.relations.insert(slot.to_string(), slot_value);
    }

    fn relation(&self, slot: &str) -> Option<&Loaded<MemoryDocument<T>>> {
        self.relations.get(slot)?.value.downcast_ref()
    }
}
