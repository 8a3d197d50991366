//! Sync: reconcile a desired association list against the current one
//!
//! Removals run before additions, the owner is touched at most once, and a
//! failing step aborts the rest. Steps that already persisted stay persisted.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::RelationResult;
use crate::identifier::{normalize, IdInput, Identifier};
use crate::model::Record;

/// What a sync changed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeReport {
    pub attached: Vec<Identifier>,
    pub detached: Vec<Identifier>,
    /// Always empty: presence is binary, there are no pivot attributes to update
    pub updated: Vec<Identifier>,
}

impl ChangeReport {
    pub fn has_changes(&self) -> bool {
        !self.attached.is_empty() || !self.detached.is_empty() || !self.updated.is_empty()
    }
}

/// One desired association with its attribute payload
#[derive(Debug, Clone)]
pub struct SyncEntry<'a> {
    pub id: IdInput<'a>,
    pub attributes: Map<String, Value>,
}

/// Desired association list
#[derive(Debug, Clone, Default)]
pub struct SyncList<'a> {
    entries: Vec<SyncEntry<'a>>,
}

impl<'a> SyncList<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain ids without attributes
    pub fn ids<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<IdInput<'a>>,
    {
        ids.into_iter().collect()
    }

    /// Keys of already loaded records
    pub fn records<R: Record>(records: &'a [R]) -> Self {
        records
            .iter()
            .map(|record| IdInput::Record(record))
            .collect()
    }

    /// Add an id with attributes
    pub fn with(mut self, id: impl Into<IdInput<'a>>, attributes: Map<String, Value>) -> Self {
        self.push(id, attributes);
        self
    }

    pub fn push(&mut self, id: impl Into<IdInput<'a>>, attributes: Map<String, Value>) {
        self.entries.push(SyncEntry {
            id: id.into(),
            attributes,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a, T: Into<IdInput<'a>>> FromIterator<T> for SyncList<'a> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|id| SyncEntry {
                    id: id.into(),
                    attributes: Map::new(),
                })
                .collect(),
        }
    }
}

/// Set difference between the current and the desired associations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    /// Current ids absent from the desired list, in current order
    pub to_detach: Vec<Identifier>,
    /// Desired ids absent from the current list, in desired order
    pub to_attach: Vec<(Identifier, Map<String, Value>)>,
}

/// Diff `desired` against `current` by canonical rendering. Desired entries are
/// de-duplicated; the last attributes given for an id win.
pub fn plan(
    current: &[Identifier],
    desired: SyncList<'_>,
    convert: bool,
) -> RelationResult<SyncPlan> {
    let mut order: Vec<Identifier> = Vec::new();
    let mut desired_map: HashMap<String, Map<String, Value>> = HashMap::new();

    for entry in desired.entries {
        let id = normalize(entry.id, convert)?;
        let canonical = id.to_string();
        if desired_map.insert(canonical, entry.attributes).is_none() {
            order.push(id);
        }
    }

    let current_keys: HashSet<String> = current.iter().map(|id| id.to_string()).collect();

    let mut seen = HashSet::new();
    let to_detach = current
        .iter()
        .filter(|id| !desired_map.contains_key(id.canonical().as_ref()))
        .filter(|id| seen.insert(id.to_string()))
        .cloned()
        .collect();

    let to_attach = order
        .into_iter()
        .filter(|id| !current_keys.contains(id.canonical().as_ref()))
        .map(|id| {
            let attributes = desired_map.remove(id.canonical().as_ref()).unwrap_or_default();
            (id, attributes)
        })
        .collect();

    Ok(SyncPlan {
        to_detach,
        to_attach,
    })
}

/// A relation that can be synced
#[async_trait]
pub trait Reconcile: Send {
    /// Current associations reduced to plain keys
    fn current_ids(&self) -> RelationResult<Vec<Identifier>>;

    /// Whether raw desired ids are converted to object ids
    fn convert_ids(&self) -> bool;

    /// Remove associations without touching the owner
    async fn detach_ids(&mut self, ids: &[Identifier]) -> RelationResult<()>;

    /// Add one association without touching the owner; `false` if nothing changed
    async fn attach_id(
        &mut self,
        id: &Identifier,
        attributes: &Map<String, Value>,
    ) -> RelationResult<bool>;

    async fn touch_owner(&mut self) -> RelationResult<()>;
}

/// Make `target`'s associations equal `desired`.
///
/// With `detaching` false, nothing currently associated is removed.
pub async fn sync<T>(
    target: &mut T,
    desired: SyncList<'_>,
    detaching: bool,
) -> RelationResult<ChangeReport>
where
    T: Reconcile + ?Sized,
{
    let current = target.current_ids()?;
    let plan = plan(&current, desired, target.convert_ids())?;
    let mut report = ChangeReport::default();

    if detaching && !plan.to_detach.is_empty() {
        if let Err(err) = target.detach_ids(&plan.to_detach).await {
            warn!(error = %err, "sync aborted while detaching");
            return Err(err);
        }
        report.detached = plan
            .to_detach
            .iter()
            .map(|id| Identifier::from_canonical(&id.canonical()))
            .collect();
    }

    for (id, attributes) in &plan.to_attach {
        match target.attach_id(id, attributes).await {
            Ok(true) => report.attached.push(id.clone()),
            Ok(false) => {}
            Err(err) => {
                warn!(id = %id, attached = report.attached.len(), error = %err, "sync aborted while attaching");
                return Err(err);
            }
        }
    }

    if report.has_changes() {
        target.touch_owner().await?;
    }

    debug!(
        attached = report.attached.len(),
        detached = report.detached.len(),
        "sync complete"
    );
    Ok(report)
}
