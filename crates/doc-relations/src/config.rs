//! Relation configuration
//!
//! Options that used to be process-wide toggles are carried explicitly by
//! every relation descriptor.

use serde::{Deserialize, Serialize};

/// Per-descriptor relation options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    /// Restrict the query to the owner on construction (lazy path)
    pub apply_constraints: bool,
    /// Convert raw scalars into object ids when attaching/detaching
    pub convert_ids: bool,
    /// Touch the owner after pivot mutations
    pub touch_owner: bool,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            apply_constraints: true,
            convert_ids: true,
            touch_owner: true,
        }
    }
}

impl RelationConfig {
    /// Configuration for descriptors used only to eager load a batch
    pub fn eager() -> Self {
        Self {
            apply_constraints: false,
            ..Self::default()
        }
    }

    pub fn with_constraints(mut self, apply: bool) -> Self {
        self.apply_constraints = apply;
        self
    }

    /// Keep raw scalars as opaque identifiers instead of object ids
    pub fn with_convert_ids(mut self, convert: bool) -> Self {
        self.convert_ids = convert;
        self
    }

    pub fn with_touch_owner(mut self, touch: bool) -> Self {
        self.touch_owner = touch;
        self
    }
}
