//! Crate-wide error type shared by every vxdb component.

use std::fmt;

pub type Result<T> = std::result::Result<T, VxError>;

/// Unified error taxonomy for the mutation core: paging, WAL, the PK hash
/// index, node/rel table mutation, and the NPY reader all return this type.
#[derive(thiserror::Error, Debug)]
pub enum VxError {
    #[error("malformed input: {detail}")]
    MalformedInput { detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("primary key column {column:?} cannot be NULL")]
    NullPrimaryKey { column: String },

    #[error("duplicate primary key: {key_text}")]
    DuplicatePrimaryKey { key_text: String },

    #[error("node (table {table_id}, offset {offset}) has connected edges; use detach delete")]
    NodeHasConnectedEdges { table_id: u64, offset: u64 },

    #[error("internal invariant violated: {detail}")]
    InternalInvariant { detail: String },

    #[error("transaction aborted: {detail}")]
    TransactionAborted { detail: String },

    #[error("value out of range: {what} = {value}")]
    OutOfRange { what: &'static str, value: i64 },

    #[error("engine is busy")]
    Busy,

    #[error("transaction is read-only")]
    ReadOnly,

    #[error("no active transaction")]
    NoActiveTransaction,
}

impl VxError {
    /// Construct an [`VxError::InternalInvariant`] from any displayable detail.
    ///
    /// In debug builds this also fires a `debug_assert!`, so bugs caught by
    /// this path panic loudly in development while still returning a
    /// catchable error in release builds (per the spec's design note on the
    /// fwd/bwd rel-delete-parity open question).
    pub fn internal(detail: impl fmt::Display) -> Self {
        let detail = detail.to_string();
        debug_assert!(false, "internal invariant violated: {detail}");
        VxError::InternalInvariant { detail }
    }

    pub fn malformed(detail: impl fmt::Display) -> Self {
        VxError::MalformedInput {
            detail: detail.to_string(),
        }
    }
}
