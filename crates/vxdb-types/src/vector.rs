//! Batches of logically-typed values: the unit of inter-component exchange.

use crate::value::{LogicalTypeID, Selection, Value};

/// Conventional cap on the number of rows carried by one `ValueVector`.
pub const DEFAULT_VECTOR_CAPACITY: usize = 2048;

/// A small batch of values of one logical type, plus a selection vector
/// naming which positions are "live" for the current operation.
#[derive(Clone, Debug)]
pub struct ValueVector {
    logical_type: LogicalTypeID,
    values: Vec<Value>,
    selection: Selection,
}

impl ValueVector {
    #[must_use]
    pub fn new(logical_type: LogicalTypeID) -> Self {
        ValueVector {
            logical_type,
            values: Vec::new(),
            selection: Selection::new(),
        }
    }

    #[must_use]
    pub fn with_values(logical_type: LogicalTypeID, values: Vec<Value>) -> Self {
        let selection = (0..values.len() as u32).collect();
        ValueVector {
            logical_type,
            values,
            selection,
        }
    }

    #[must_use]
    pub const fn logical_type(&self) -> LogicalTypeID {
        self.logical_type
    }

    #[must_use]
    pub fn selection(&self) -> &[u32] {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn get(&self, pos: u32) -> Option<&Value> {
        self.values.get(pos as usize)
    }

    pub fn push(&mut self, value: Value) {
        let pos = self.values.len() as u32;
        self.values.push(value);
        self.selection.push(pos);
    }

    /// Overwrite the value at an already-selected position, e.g. assigning
    /// a freshly allocated `(table_id, offset)` into a node-ID vector after
    /// insert (spec §4.4).
    pub fn set(&mut self, pos: u32, value: Value) {
        if let Some(slot) = self.values.get_mut(pos as usize) {
            *slot = value;
        }
    }

    /// Iterate `(position, value)` pairs for every selected position.
    pub fn iter_selected(&self) -> impl Iterator<Item = (u32, &Value)> {
        self.selection
            .iter()
            .copied()
            .filter_map(move |pos| self.values.get(pos as usize).map(|v| (pos, v)))
    }

    /// True if the selection describes a contiguous run of offsets with no
    /// gaps — the condition under which node-table reads prefer a sequential
    /// `scan` over per-offset `lookup`.
    #[must_use]
    pub fn is_sequential(&self) -> bool {
        self.selection
            .windows(2)
            .all(|w| w[1] == w[0] + 1)
    }
}
