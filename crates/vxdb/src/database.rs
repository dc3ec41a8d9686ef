//! Top-level database handle: binds a pager, a WAL, the page versioning
//! side table, and a registry of node/rel tables into one open database
//! (spec §2 "Architecture", §4 "Data flow").

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument};
use vxdb_core::{EngineConfig, Transaction, TransactionParticipant};
use vxdb_error::{Result, VxError};
use vxdb_pager::Pager;
use vxdb_storage::{NodeTable, PkConfig, RelTable};
use vxdb_types::{DbFileId, LogicalTypeID, PageSize, TableId, TransactionMode};
use vxdb_vfs::Vfs;
use vxdb_wal::{PageVersionTable, Wal};

/// An open database file plus its WAL and table registry.
///
/// One `Database` owns exactly one `(db file, wal file)` pair. Node and rel
/// tables are created against it by [`Database::create_node_table`] /
/// [`Database::create_rel_table`] and looked back up by [`TableId`]; a
/// [`Transaction`] is then opened with [`Database::begin`] and the tables it
/// touches registered onto it as they're mutated, mirroring the source's
/// "catalog hands out table handles, transaction tracks which ones were
/// dirtied" split (spec §2, §9).
pub struct Database<V: Vfs> {
    config: EngineConfig,
    db_pager: Arc<Pager<V>>,
    wal: Arc<Wal<V>>,
    version_table: Arc<PageVersionTable>,
    node_tables: parking_lot::RwLock<HashMap<TableId, Arc<NodeTable<V>>>>,
    rel_tables: parking_lot::RwLock<HashMap<TableId, Arc<RelTable<V>>>>,
}

impl<V: Vfs> Database<V> {
    /// Open (or create) the database file `db_path` and its WAL `wal_path`
    /// on `vfs`, using `config`'s page size.
    #[instrument(skip(vfs, config))]
    pub fn open(vfs: &V, db_path: &str, wal_path: &str, config: EngineConfig) -> Result<Self> {
        let page_size = PageSize::new(config.page_size)
            .ok_or_else(|| VxError::malformed(format!("invalid page size {}", config.page_size)))?;
        let db_pager = Arc::new(Pager::open(vfs, db_path, DbFileId(0), page_size)?);
        let wal = Arc::new(Wal::open(vfs, wal_path, page_size)?);
        info!(db_path, wal_path, "database opened");
        Ok(Database {
            config,
            db_pager,
            wal,
            version_table: Arc::new(PageVersionTable::new()),
            node_tables: parking_lot::RwLock::new(HashMap::new()),
            rel_tables: parking_lot::RwLock::new(HashMap::new()),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn pager(&self) -> &Arc<Pager<V>> {
        &self.db_pager
    }

    #[must_use]
    pub fn wal(&self) -> &Arc<Wal<V>> {
        &self.wal
    }

    /// Register a new node table, optionally with a materialized PK index
    /// (spec §4.4). Panics in debug builds if `table_id` is already in use,
    /// via the same `VxError::internal` invariant channel the table
    /// mutation protocol uses for its own invariants.
    pub fn create_node_table(
        &self,
        table_id: TableId,
        column_types: Vec<LogicalTypeID>,
        pk: Option<PkConfig>,
    ) -> Result<Arc<NodeTable<V>>> {
        let mut tables = self.node_tables.write();
        if tables.contains_key(&table_id) {
            return Err(VxError::internal(format!("node table {table_id:?} already exists")));
        }
        let table = Arc::new(NodeTable::create(
            table_id,
            column_types,
            pk,
            Arc::clone(&self.db_pager),
            Arc::clone(&self.wal),
            Arc::clone(&self.version_table),
            DbFileId(table_id.0 as u32),
        )?);
        tables.insert(table_id, Arc::clone(&table));
        Ok(table)
    }

    /// Register a new relationship table (spec §4.5).
    pub fn create_rel_table(&self, table_id: TableId) -> Result<Arc<RelTable<V>>> {
        let mut tables = self.rel_tables.write();
        if tables.contains_key(&table_id) {
            return Err(VxError::internal(format!("rel table {table_id:?} already exists")));
        }
        let table = Arc::new(RelTable::create(
            table_id,
            Arc::clone(&self.db_pager),
            Arc::clone(&self.wal),
            Arc::clone(&self.version_table),
            DbFileId(table_id.0 as u32),
        )?);
        tables.insert(table_id, Arc::clone(&table));
        Ok(table)
    }

    #[must_use]
    pub fn node_table(&self, table_id: TableId) -> Option<Arc<NodeTable<V>>> {
        self.node_tables.read().get(&table_id).cloned()
    }

    #[must_use]
    pub fn rel_table(&self, table_id: TableId) -> Option<Arc<RelTable<V>>> {
        self.rel_tables.read().get(&table_id).cloned()
    }

    /// Open a new transaction bound to this database's pager, WAL, and
    /// version table. Callers register the tables they touch via
    /// [`Transaction::register`] before calling `commit`/`rollback`.
    #[must_use]
    pub fn begin(&self, mode: TransactionMode) -> Transaction<V> {
        Transaction::begin(mode, Arc::clone(&self.db_pager), Arc::clone(&self.wal), Arc::clone(&self.version_table))
    }

    /// Convenience over [`Database::begin`] for the common case of one
    /// write transaction touching exactly the named tables.
    pub fn begin_write_with(&self, table_ids: &[TableId]) -> Transaction<V> {
        let mut txn = self.begin(TransactionMode::Write);
        for &id in table_ids {
            if let Some(table) = self.node_table(id) {
                txn.register(table as Arc<dyn TransactionParticipant>);
            } else if let Some(table) = self.rel_table(id) {
                txn.register(table as Arc<dyn TransactionParticipant>);
            }
        }
        txn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vxdb_types::{InternalId, Value, ValueVector};
    use vxdb_vfs::MemoryVfs;

    #[test]
    fn end_to_end_insert_commit_survives_and_rollback_undoes() {
        let vfs = MemoryVfs::new();
        let db = Database::open(&vfs, "g.db", "g.wal", EngineConfig::default()).unwrap();
        let nodes = db
            .create_node_table(
                TableId(0),
                vec![LogicalTypeID::String],
                Some(PkConfig { column_id: 0, is_string: true }),
            )
            .unwrap();

        let mut txn = db.begin_write_with(&[TableId(0)]);
        let pk_vec = ValueVector::with_values(LogicalTypeID::String, vec![Value::String(b"bob".to_vec())]);
        let mut node_id_vec =
            ValueVector::with_values(LogicalTypeID::InternalId, vec![Value::InternalId(InternalId::new(0, 0))]);
        nodes.insert(&mut node_id_vec, &[pk_vec]).unwrap();
        txn.commit().unwrap();

        assert!(nodes
            .pk_index()
            .unwrap()
            .lookup(&vxdb_index::IndexKey::Str(b"bob".to_vec()))
            .is_some());

        let mut txn2 = db.begin_write_with(&[TableId(0)]);
        let pk_vec2 = ValueVector::with_values(LogicalTypeID::String, vec![Value::String(b"carl".to_vec())]);
        let mut node_id_vec2 =
            ValueVector::with_values(LogicalTypeID::InternalId, vec![Value::InternalId(InternalId::new(0, 0))]);
        nodes.insert(&mut node_id_vec2, &[pk_vec2]).unwrap();
        txn2.rollback().unwrap();

        assert!(nodes
            .pk_index()
            .unwrap()
            .lookup(&vxdb_index::IndexKey::Str(b"carl".to_vec()))
            .is_none());
        assert!(nodes
            .pk_index()
            .unwrap()
            .lookup(&vxdb_index::IndexKey::Str(b"bob".to_vec()))
            .is_some());
    }

    #[test]
    fn duplicate_table_id_is_rejected() {
        let vfs = MemoryVfs::new();
        let db = Database::open(&vfs, "g.db", "g.wal", EngineConfig::default()).unwrap();
        db.create_rel_table(TableId(5)).unwrap();
        assert!(db.create_rel_table(TableId(5)).is_err());
    }
}
