//! Column storage for node tables.
//!
//! Values live in memory keyed by offset for lookup, but every mutating
//! call (`set`/`add_column`, driven by `NodeTable::insert`/`update`/
//! `add_column`) also re-serializes the touched column into a page-backed
//! blob through [`vxdb_wal::PagedBlobStore`] (spec §4.3 durability), so the
//! on-disk image tracks the in-memory one the same way the PK index's
//! shards do.

use vxdb_types::{LogicalTypeID, Value};

use crate::codec::{decode_logical_type, decode_value, encode_logical_type, encode_value};

/// One column of a node table: values indexed by node offset.
pub struct Column {
    logical_type: LogicalTypeID,
    values: Vec<Value>,
}

impl Column {
    #[must_use]
    pub fn new(logical_type: LogicalTypeID) -> Self {
        Column {
            logical_type,
            values: Vec::new(),
        }
    }

    #[must_use]
    pub const fn logical_type(&self) -> LogicalTypeID {
        self.logical_type
    }

    fn ensure_len(&mut self, offset: u64) {
        let needed = offset as usize + 1;
        if self.values.len() < needed {
            self.values.resize(needed, Value::Null);
        }
    }

    pub fn set(&mut self, offset: u64, value: Value) {
        self.ensure_len(offset);
        self.values[offset as usize] = value;
    }

    #[must_use]
    pub fn get(&self, offset: u64) -> Value {
        self.values.get(offset as usize).cloned().unwrap_or(Value::Null)
    }

    /// Append `value` at every offset in `[0, row_count)` that does not yet
    /// have an entry — used by `addColumn`'s default-value backfill.
    pub fn backfill_default(&mut self, row_count: u64, default: &Value) {
        self.ensure_len(row_count.saturating_sub(1).max(0));
        for slot in &mut self.values {
            if matches!(slot, Value::Null) {
                *slot = default.clone();
            }
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        encode_logical_type(buf, self.logical_type);
        buf.extend_from_slice(&(self.values.len() as u32).to_le_bytes());
        for value in &self.values {
            encode_value(buf, value);
        }
    }

    fn decode(bytes: &[u8], pos: &mut usize) -> Self {
        let logical_type = decode_logical_type(bytes, pos);
        let len = u32::from_le_bytes(bytes[*pos..*pos + 4].try_into().unwrap()) as usize;
        *pos += 4;
        let values = (0..len).map(|_| decode_value(bytes, pos)).collect();
        Column { logical_type, values }
    }
}

/// All columns of one node table, addressed by column index.
pub struct NodeTableData {
    columns: Vec<Column>,
}

impl NodeTableData {
    #[must_use]
    pub fn new(column_types: Vec<LogicalTypeID>) -> Self {
        NodeTableData {
            columns: column_types.into_iter().map(Column::new).collect(),
        }
    }

    pub fn set(&mut self, column_id: usize, offset: u64, value: Value) {
        self.columns[column_id].set(offset, value);
    }

    #[must_use]
    pub fn get(&self, column_id: usize, offset: u64) -> Value {
        self.columns[column_id].get(offset)
    }

    pub fn add_column(&mut self, logical_type: LogicalTypeID, row_count: u64, default: &Value) {
        let mut column = Column::new(logical_type);
        if row_count > 0 {
            column.backfill_default(row_count, default);
        }
        self.columns.push(column);
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Serialize every column's full state to its page-durable form (spec
    /// §4.3 durability).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.columns.len() as u32).to_le_bytes());
        for column in &self.columns {
            column.encode(&mut buf);
        }
        buf
    }

    /// Decode data previously written by [`NodeTableData::encode`]. `bytes`
    /// must be exactly what `encode` produced.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return NodeTableData { columns: Vec::new() };
        }
        let mut pos = 0_usize;
        let column_count = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        let columns = (0..column_count).map(|_| Column::decode(bytes, &mut pos)).collect();
        NodeTableData { columns }
    }
}
