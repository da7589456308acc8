//! TL-006: Value store — write-once map from variable instance to value.
//!
//! Keys are (name, frame, iteration, parent-chain); a second write to the
//! same key is a fatal invariant violation, not an overwrite.

use super::types::{Value, VarId};
use rustc_hash::FxHashMap;

/// Write-once storage for computed values, keyed by variable instance.
#[derive(Debug, Default)]
pub struct ValueStore {
    values: FxHashMap<VarId, Value>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value. Errors if the instance was already written.
    pub fn put(&mut self, id: VarId, value: Value) -> Result<(), String> {
        if self.values.contains_key(&id) {
            return Err(format!("value for {} written twice", id));
        }
        self.values.insert(id, value);
        Ok(())
    }

    pub fn get(&self, id: &VarId) -> Option<&Value> {
        self.values.get(id)
    }

    /// True if the instance was written at all (possibly with an absent
    /// value).
    pub fn contains(&self, id: &VarId) -> bool {
        self.values.contains_key(id)
    }

    /// True if the instance holds an actual (non-absent) value.
    pub fn has_value(&self, id: &VarId) -> bool {
        self.values.get(id).is_some_and(|v| !v.is_absent())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
