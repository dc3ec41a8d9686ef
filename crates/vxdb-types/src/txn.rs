//! Transaction-identity types shared across the pager, WAL, and storage.

/// Whether a transaction may write. Mirrors the pager's own transaction
/// handle, but is re-exported here so storage and WAL code can name it
/// without depending on `vxdb-pager` directly.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TransactionMode {
    ReadOnly,
    Write,
}

/// A process-unique identifier for a node or rel table, used to key the
/// WAL's "updated tables" set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TableId(pub u64);
