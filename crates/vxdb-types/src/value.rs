//! Logical values and the type tags that describe stored columns.

use smallvec::SmallVec;

/// Tag of a stored or in-flight logical value.
///
/// Scope is deliberately narrow: this crate does not implement a query-facing
/// type system, only what is needed to describe a stored column value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum LogicalTypeID {
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    String,
    /// Auto-assigned monotonic integer PK; never backed by a PK index.
    Serial,
    /// `(table_id, offset)` pair identifying a node.
    InternalId,
}

impl LogicalTypeID {
    #[must_use]
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            LogicalTypeID::Int16 => Some(2),
            LogicalTypeID::Int32 | LogicalTypeID::Float => Some(4),
            LogicalTypeID::Int64 | LogicalTypeID::Double | LogicalTypeID::Serial => Some(8),
            LogicalTypeID::InternalId => Some(16),
            LogicalTypeID::String => None,
        }
    }
}

/// `(table_id, offset)`, 16 bytes, identifying a node or rel-chain position.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct InternalId {
    pub table_id: u64,
    pub offset: u64,
}

impl InternalId {
    #[must_use]
    pub const fn new(table_id: u64, offset: u64) -> Self {
        InternalId { table_id, offset }
    }
}

/// A single logical value. Strings are stored as owned `Vec<u8>` here; the
/// inline/overflow `ku_string` packing only matters at the PK-index storage
/// boundary (see `vxdb_index::ku_string`).
#[derive(Clone, PartialEq, Debug)]
pub enum Value {
    Null,
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(Vec<u8>),
    Serial(i64),
    InternalId(InternalId),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[must_use]
    pub const fn logical_type(&self) -> Option<LogicalTypeID> {
        match self {
            Value::Null => None,
            Value::Int16(_) => Some(LogicalTypeID::Int16),
            Value::Int32(_) => Some(LogicalTypeID::Int32),
            Value::Int64(_) => Some(LogicalTypeID::Int64),
            Value::Float(_) => Some(LogicalTypeID::Float),
            Value::Double(_) => Some(LogicalTypeID::Double),
            Value::String(_) => Some(LogicalTypeID::String),
            Value::Serial(_) => Some(LogicalTypeID::Serial),
            Value::InternalId(_) => Some(LogicalTypeID::InternalId),
        }
    }

    /// Render for inclusion in a user-visible error message (duplicate/null
    /// PK diagnostics render the offending key as text).
    #[must_use]
    pub fn render_text(&self) -> String {
        match self {
            Value::Null => "NULL".to_owned(),
            Value::Int16(v) => v.to_string(),
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) | Value::Serial(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::String(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Value::InternalId(id) => format!("{}:{}", id.table_id, id.offset),
        }
    }
}

/// Inline small-vector selection list: positions within a `ValueVector` that
/// participate in the current operation. Most batches select every position,
/// so this stays on the stack for the common case.
pub type Selection = SmallVec<[u32; 8]>;
