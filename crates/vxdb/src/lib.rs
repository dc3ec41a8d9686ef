//! Public API facade for the transactional graph-database mutation core:
//! paging and the write-ahead log (`vxdb-wal`, `vxdb-pager`), the sharded
//! primary-key hash index (`vxdb-index`), the node/rel table mutation
//! protocol (`vxdb-storage`), transaction orchestration (`vxdb-core`), and
//! the NPY row-batch reader (`vxdb-npy`) — bound together into one
//! [`Database`] handle.

pub mod bulk_load;
pub mod database;

pub use bulk_load::{load_node_table_from_npy, open_npy_columns};
pub use database::Database;

pub use vxdb_core::{EngineConfig, Transaction, TransactionParticipant};
pub use vxdb_error::{Result, VxError};
pub use vxdb_index::IndexKey;
pub use vxdb_npy::{NpyHeader, NpyMultiFileReader, NpyReader};
pub use vxdb_storage::{Direction, NodeTable, PkConfig, RelTable};
pub use vxdb_types::{InternalId, LogicalTypeID, TableId, TransactionMode, Value, ValueVector};
pub use vxdb_vfs::{MemoryVfs, OsVfs, Vfs};
