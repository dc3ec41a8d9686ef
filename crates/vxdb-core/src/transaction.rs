//! Transaction orchestration (spec §3 "Transaction", §4.1-§4.3 commit
//! choreography): binds a pager transaction, a WAL handle, and the set of
//! tables touched this transaction together.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use vxdb_error::Result;
use vxdb_pager::Pager;
use vxdb_storage::{NodeTable, RelTable};
use vxdb_types::{TableId, TransactionMode};
use vxdb_vfs::Vfs;
use vxdb_wal::{PageVersionTable, Wal};

/// Capability interface every mutable table implements (spec §9 design
/// note: the source's `Table` base class becomes this trait).
pub trait TransactionParticipant: Send + Sync {
    fn table_id(&self) -> TableId;
    fn prepare_commit(&self) -> Result<()>;
    fn prepare_rollback(&self) -> Result<()>;
    fn checkpoint_in_memory(&self);
    fn rollback_in_memory(&self);
}

impl<V: Vfs> TransactionParticipant for NodeTable<V> {
    fn table_id(&self) -> TableId {
        NodeTable::table_id(self)
    }
    fn prepare_commit(&self) -> Result<()> {
        NodeTable::prepare_commit(self)
    }
    fn prepare_rollback(&self) -> Result<()> {
        NodeTable::prepare_rollback(self)
    }
    fn checkpoint_in_memory(&self) {
        NodeTable::checkpoint_in_memory(self);
    }
    fn rollback_in_memory(&self) {
        NodeTable::rollback_in_memory(self);
    }
}

impl<V: Vfs> TransactionParticipant for RelTable<V> {
    fn table_id(&self) -> TableId {
        RelTable::table_id(self)
    }
    fn prepare_commit(&self) -> Result<()> {
        RelTable::prepare_commit(self)
    }
    fn prepare_rollback(&self) -> Result<()> {
        RelTable::prepare_rollback(self)
    }
    fn checkpoint_in_memory(&self) {
        RelTable::checkpoint_in_memory(self);
    }
    fn rollback_in_memory(&self) {
        RelTable::rollback_in_memory(self);
    }
}

/// One transaction against a single database file plus its WAL.
///
/// Holds no table references by default; callers register the tables they
/// touched via [`Transaction::register`] as they go, matching
/// `addToUpdatedTables` in the source — the WAL's own updated-tables set is
/// the authoritative fencing record, this list is what gets the
/// checkpoint/rollback choreography fanned out to.
pub struct Transaction<V: Vfs> {
    mode: TransactionMode,
    db_pager: Arc<Pager<V>>,
    wal: Arc<Wal<V>>,
    version_table: Arc<PageVersionTable>,
    participants: Vec<Arc<dyn TransactionParticipant>>,
}

impl<V: Vfs> Transaction<V> {
    #[must_use]
    pub fn begin(
        mode: TransactionMode,
        db_pager: Arc<Pager<V>>,
        wal: Arc<Wal<V>>,
        version_table: Arc<PageVersionTable>,
    ) -> Self {
        info!(?mode, "transaction begin");
        Transaction {
            mode,
            db_pager,
            wal,
            version_table,
            participants: Vec::new(),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> TransactionMode {
        self.mode
    }

    #[must_use]
    pub const fn version_table(&self) -> &Arc<PageVersionTable> {
        &self.version_table
    }

    /// Record that `table` was touched by this transaction, so commit and
    /// rollback fan out to it.
    pub fn register(&mut self, table: Arc<dyn TransactionParticipant>) {
        if self.mode != TransactionMode::Write {
            warn!("attempted to register a table mutation under a read-only transaction");
            return;
        }
        self.participants.push(table);
    }

    /// Commit: stage every participant, flush the WAL, checkpoint WAL pages
    /// back to their originals, then flip every participant's in-memory
    /// state to committed (spec §2 data flow, §4.2 flush/checkpoint).
    #[instrument(skip(self))]
    pub fn commit(self) -> Result<()> {
        if self.mode != TransactionMode::Write {
            return Ok(());
        }
        for table in &self.participants {
            table.prepare_commit()?;
        }
        self.wal.flush()?;
        let version_table = Arc::clone(&self.version_table);
        let checkpointed = self.wal.checkpoint(&self.db_pager, |p| version_table.get(p))?;
        for (_, page) in &checkpointed {
            self.version_table.clear(*page);
        }
        for table in &self.participants {
            table.checkpoint_in_memory();
        }
        info!(pages = checkpointed.len(), tables = self.participants.len(), "transaction commit");
        Ok(())
    }

    /// Rollback: discard WAL state, clear the page-version side table, and
    /// flip every participant's in-memory state back to pre-transaction.
    #[instrument(skip(self))]
    pub fn rollback(self) -> Result<()> {
        for table in &self.participants {
            table.prepare_rollback()?;
        }
        self.wal.rollback();
        self.version_table.clear_all();
        for table in &self.participants {
            table.rollback_in_memory();
        }
        warn!(tables = self.participants.len(), "transaction rollback");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vxdb_storage::PkConfig;
    use vxdb_types::{DbFileId, InternalId, LogicalTypeID, PageSize, Value, ValueVector};
    use vxdb_vfs::MemoryVfs;

    fn setup() -> (Arc<Pager<MemoryVfs>>, Arc<Wal<MemoryVfs>>, Arc<PageVersionTable>) {
        let vfs = MemoryVfs::new();
        let db_pager = Arc::new(Pager::open(&vfs, "data.db", DbFileId(0), PageSize::DEFAULT).unwrap());
        let wal = Arc::new(Wal::open(&vfs, "data.wal", PageSize::DEFAULT).unwrap());
        (db_pager, wal, Arc::new(PageVersionTable::new()))
    }

    #[test]
    fn rollback_undoes_pk_index_mutations_across_the_transaction() {
        let (db_pager, wal, versions) = setup();
        let table: Arc<NodeTable<MemoryVfs>> = Arc::new(
            NodeTable::create(
                TableId(0),
                vec![LogicalTypeID::String],
                Some(PkConfig { column_id: 0, is_string: true }),
                Arc::clone(&db_pager),
                Arc::clone(&wal),
                Arc::clone(&versions),
                DbFileId(0),
            )
            .unwrap(),
        );

        let mut txn = Transaction::begin(TransactionMode::Write, Arc::clone(&db_pager), Arc::clone(&wal), Arc::clone(&versions));
        txn.register(table.clone() as Arc<dyn TransactionParticipant>);

        let pk_vec = ValueVector::with_values(LogicalTypeID::String, vec![Value::String(b"x".to_vec())]);
        let mut node_id_vec = ValueVector::with_values(
            LogicalTypeID::InternalId,
            vec![Value::InternalId(InternalId::new(0, 0))],
        );
        table.insert(&mut node_id_vec, &[pk_vec]).unwrap();
        assert!(table.pk_index().unwrap().lookup(&vxdb_index::IndexKey::Str(b"x".to_vec())).is_some());

        txn.rollback().unwrap();
        assert!(table.pk_index().unwrap().lookup(&vxdb_index::IndexKey::Str(b"x".to_vec())).is_none());
    }

    #[test]
    fn commit_keeps_pk_index_mutations() {
        let (db_pager, wal, versions) = setup();
        let table: Arc<NodeTable<MemoryVfs>> = Arc::new(
            NodeTable::create(
                TableId(0),
                vec![LogicalTypeID::String],
                Some(PkConfig { column_id: 0, is_string: true }),
                Arc::clone(&db_pager),
                Arc::clone(&wal),
                Arc::clone(&versions),
                DbFileId(0),
            )
            .unwrap(),
        );

        let mut txn = Transaction::begin(TransactionMode::Write, Arc::clone(&db_pager), Arc::clone(&wal), Arc::clone(&versions));
        txn.register(table.clone() as Arc<dyn TransactionParticipant>);

        let pk_vec = ValueVector::with_values(LogicalTypeID::String, vec![Value::String(b"y".to_vec())]);
        let mut node_id_vec = ValueVector::with_values(
            LogicalTypeID::InternalId,
            vec![Value::InternalId(InternalId::new(0, 0))],
        );
        table.insert(&mut node_id_vec, &[pk_vec]).unwrap();

        txn.commit().unwrap();
        assert!(table.pk_index().unwrap().lookup(&vxdb_index::IndexKey::Str(b"y".to_vec())).is_some());
    }
}
