//! Node table mutation protocol (spec §4.4).

use std::sync::Arc;

use tracing::{instrument, warn};
use vxdb_error::{Result, VxError};
use vxdb_index::{IndexKey, PkHashIndex};
use vxdb_pager::Pager;
use vxdb_types::{DbFileId, InternalId, LogicalTypeID, PageNumber, TableId, Value, ValueVector};
use vxdb_vfs::Vfs;
use vxdb_wal::{PageVersionTable, PagedBlobStore, Wal};

use crate::column_store::NodeTableData;
use crate::deleted_ids::DeletedIdsAllocator;
use crate::stats::NodeStats;

/// Column index of the primary key, when the table has a materialized PK
/// index (a `SERIAL` PK never does — spec §3 "Logical value").
pub struct PkConfig {
    pub column_id: usize,
    pub is_string: bool,
}

fn value_to_index_key(value: &Value, is_string: bool) -> IndexKey {
    if is_string {
        match value {
            Value::String(bytes) => IndexKey::Str(bytes.clone()),
            other => IndexKey::Str(other.render_text().into_bytes()),
        }
    } else {
        match value {
            Value::Int64(v) | Value::Serial(v) => IndexKey::Int64(*v),
            Value::Int32(v) => IndexKey::Int64(i64::from(*v)),
            Value::Int16(v) => IndexKey::Int64(i64::from(*v)),
            other => IndexKey::Int64(other.render_text().parse().unwrap_or_default()),
        }
    }
}

/// A node table: column storage plus, optionally, a PK hash index. Both the
/// column data and the PK index persist their current state through a
/// [`PagedBlobStore`] on every mutation (spec §2 data flow, §4.3
/// durability), in addition to the in-memory copy every lookup/mutation
/// reads and writes directly.
pub struct NodeTable<V: Vfs> {
    table_id: TableId,
    column_types: Vec<LogicalTypeID>,
    pk: Option<PkConfig>,
    pk_index: Option<PkHashIndex<V>>,
    data: parking_lot::Mutex<NodeTableData>,
    data_store: PagedBlobStore<V>,
    stats: parking_lot::Mutex<NodeStats>,
    deleted_ids: DeletedIdsAllocator,
    wal: Arc<Wal<V>>,
}

impl<V: Vfs> NodeTable<V> {
    /// Allocate a fresh table: a one-blob column-data store plus, if `pk` is
    /// set, a fresh PK hash index, both backed by `db_pager`/`wal`.
    pub fn create(
        table_id: TableId,
        column_types: Vec<LogicalTypeID>,
        pk: Option<PkConfig>,
        db_pager: Arc<Pager<V>>,
        wal: Arc<Wal<V>>,
        version_table: Arc<PageVersionTable>,
        db_file_id: DbFileId,
    ) -> Result<Self> {
        let data_store = PagedBlobStore::create(
            Arc::clone(&db_pager),
            Arc::clone(&wal),
            Arc::clone(&version_table),
            db_file_id,
            1,
        )?;
        let pk_index = pk
            .is_some()
            .then(|| PkHashIndex::create(db_pager, Arc::clone(&wal), version_table, db_file_id))
            .transpose()?;

        let table = NodeTable {
            data: parking_lot::Mutex::new(NodeTableData::new(column_types.clone())),
            data_store,
            table_id,
            column_types,
            pk,
            pk_index,
            stats: parking_lot::Mutex::new(NodeStats::new()),
            deleted_ids: DeletedIdsAllocator::new(),
            wal,
        };
        table.persist_data()?;
        Ok(table)
    }

    /// Re-open a table whose column-data directory page is `data_directory`
    /// and, if the table has a PK index, whose index directory page is
    /// `index_directory`.
    pub fn open(
        table_id: TableId,
        column_types: Vec<LogicalTypeID>,
        pk: Option<PkConfig>,
        db_pager: Arc<Pager<V>>,
        wal: Arc<Wal<V>>,
        version_table: Arc<PageVersionTable>,
        db_file_id: DbFileId,
        data_directory: PageNumber,
        index_directory: Option<PageNumber>,
    ) -> Result<Self> {
        let data_store = PagedBlobStore::open(
            Arc::clone(&db_pager),
            Arc::clone(&wal),
            Arc::clone(&version_table),
            db_file_id,
            data_directory,
            1,
        )?;
        let data = NodeTableData::decode(&data_store.read_blob(0)?);
        let pk_index = match (pk.is_some(), index_directory) {
            (true, Some(dir)) => Some(PkHashIndex::open(db_pager, Arc::clone(&wal), version_table, db_file_id, dir)?),
            _ => None,
        };
        Ok(NodeTable {
            data: parking_lot::Mutex::new(data),
            data_store,
            table_id,
            column_types,
            pk,
            pk_index,
            stats: parking_lot::Mutex::new(NodeStats::new()),
            deleted_ids: DeletedIdsAllocator::new(),
            wal,
        })
    }

    fn persist_data(&self) -> Result<()> {
        self.data_store.write_blob(0, &self.data.lock().encode())
    }

    #[must_use]
    pub const fn table_id(&self) -> TableId {
        self.table_id
    }

    #[must_use]
    pub const fn data_directory(&self) -> PageNumber {
        self.data_store.directory_page()
    }

    #[must_use]
    pub fn index_directory(&self) -> Option<PageNumber> {
        self.pk_index.as_ref().map(PkHashIndex::directory_page)
    }

    #[must_use]
    pub fn pk_index(&self) -> Option<&PkHashIndex<V>> {
        self.pk_index.as_ref()
    }

    /// `read`: if `node_id_vector`'s selection is a contiguous run, a single
    /// scan would suffice in a page-backed store; this in-memory store has
    /// no difference in cost, so both branches delegate to the same lookup
    /// path and the distinction is only surfaced via `is_sequential` for
    /// parity with the source's two code paths.
    pub fn read(&self, node_id_vector: &ValueVector, output_columns: &[usize]) -> Vec<ValueVector> {
        let _use_scan = node_id_vector.is_sequential();
        let data = self.data.lock();
        let mut outputs: Vec<ValueVector> = output_columns
            .iter()
            .map(|&col| ValueVector::new(self.column_types[col]))
            .collect();
        for (_, value) in node_id_vector.iter_selected() {
            let Value::InternalId(id) = value else {
                continue;
            };
            for (out, &col) in outputs.iter_mut().zip(output_columns) {
                out.push(data.get(col, id.offset));
            }
        }
        outputs
    }

    fn insert_pk(&self, offset: u64, pk_value: &Value) -> Result<()> {
        let Some(pk) = &self.pk else { return Ok(()) };
        let Some(index) = &self.pk_index else { return Ok(()) };
        if pk_value.is_null() {
            return Err(VxError::NullPrimaryKey {
                column: format!("column {}", pk.column_id),
            });
        }
        let key = value_to_index_key(pk_value, pk.is_string);
        if !index.insert(key, offset) {
            warn!(table = ?self.table_id, "duplicate primary key rejected");
            return Err(VxError::DuplicatePrimaryKey {
                key_text: pk_value.render_text(),
            });
        }
        Ok(())
    }

    /// Insert the selected rows of `property_vectors`, assigning fresh
    /// offsets into `node_id_vector`. Returns the maximum offset assigned.
    #[instrument(skip(self, node_id_vector, property_vectors))]
    pub fn insert(
        &self,
        node_id_vector: &mut ValueVector,
        property_vectors: &[ValueVector],
    ) -> Result<u64> {
        let selection: Vec<u32> = node_id_vector.selection().to_vec();
        let mut max_offset = 0_u64;
        let mut data = self.data.lock();

        for &pos in &selection {
            let offset = self.deleted_ids.allocate();
            max_offset = max_offset.max(offset);

            if let Some(pk) = &self.pk {
                let pk_value = property_vectors[pk.column_id].get(pos).cloned().unwrap_or(Value::Null);
                if let Err(e) = self.insert_pk(offset, &pk_value) {
                    self.deleted_ids.free(offset);
                    return Err(e);
                }
            }

            for (col_id, vector) in property_vectors.iter().enumerate() {
                if let Some(value) = vector.get(pos) {
                    data.set(col_id, offset, value.clone());
                }
            }

            node_id_vector.set(pos, Value::InternalId(InternalId::new(self.table_id.0, offset)));
        }
        drop(data);

        self.persist_data()?;
        self.wal.add_to_updated_tables(self.table_id);
        Ok(max_offset)
    }

    /// `update(columnID, offset, newValue)`, selection size 1 (spec §4.4).
    #[instrument(skip(self, new_value))]
    pub fn update(&self, column_id: usize, offset: u64, new_value: Value) -> Result<()> {
        let is_pk_column = self.pk.as_ref().is_some_and(|pk| pk.column_id == column_id);
        if is_pk_column {
            if let Some(pk) = &self.pk {
                if let Some(index) = &self.pk_index {
                    let old_value = self.data.lock().get(column_id, offset);
                    if !old_value.is_null() {
                        let old_key = value_to_index_key(&old_value, pk.is_string);
                        index.delete(&old_key);
                    }
                    self.insert_pk(offset, &new_value)?;
                }
            }
        }
        self.data.lock().set(column_id, offset, new_value);
        self.persist_data()?;
        self.wal.add_to_updated_tables(self.table_id);
        Ok(())
    }

    /// `delete_(nodeIDVector)`: returns the PK value read for each deleted
    /// offset, in selection order (mirrors the source's `pkVector` output
    /// parameter).
    #[instrument(skip(self, node_id_vector))]
    pub fn delete_(&self, node_id_vector: &ValueVector) -> Result<Vec<Value>> {
        let pk_column = self.pk.as_ref().map(|pk| pk.column_id);
        let mut pk_values = Vec::new();
        let mut stats = self.stats.lock();
        let data = self.data.lock();
        for (_, value) in node_id_vector.iter_selected() {
            let Value::InternalId(InternalId { offset, .. }) = value else {
                continue;
            };
            let pk_value = pk_column.map(|col| data.get(col, *offset)).unwrap_or(Value::Null);
            if let (Some(pk), Some(index)) = (&self.pk, &self.pk_index) {
                if !pk_value.is_null() {
                    let key = value_to_index_key(&pk_value, pk.is_string);
                    index.delete(&key);
                }
            }
            if !pk_value.is_null() || pk_column.is_none() {
                stats.mark_deleted(*offset);
                self.deleted_ids.free(*offset);
            }
            pk_values.push(pk_value);
        }
        drop(data);
        drop(stats);
        self.wal.add_to_updated_tables(self.table_id);
        Ok(pk_values)
    }

    /// `addColumn(property, defaultValueVector)` (spec §4.4).
    pub fn add_column(&self, logical_type: LogicalTypeID, default: Value) -> Result<()> {
        let row_count = self.deleted_ids.high_water_mark();
        self.data.lock().add_column(logical_type, row_count, &default);
        self.persist_data()?;
        self.wal.add_to_updated_tables(self.table_id);
        Ok(())
    }

    pub fn prepare_commit(&self) -> Result<()> {
        if let Some(index) = &self.pk_index {
            index.prepare_commit()?;
        }
        Ok(())
    }

    pub fn prepare_rollback(&self) -> Result<()> {
        if let Some(index) = &self.pk_index {
            index.prepare_rollback()?;
        }
        Ok(())
    }

    pub fn checkpoint_in_memory(&self) {
        if let Some(index) = &self.pk_index {
            index.checkpoint_in_memory();
        }
    }

    pub fn rollback_in_memory(&self) {
        if let Some(index) = &self.pk_index {
            index.rollback_in_memory();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vxdb_types::{DbFileId as TestDbFileId, PageSize};
    use vxdb_vfs::MemoryVfs;

    fn test_rig() -> (Arc<Pager<MemoryVfs>>, Arc<Wal<MemoryVfs>>, Arc<PageVersionTable>) {
        let vfs = MemoryVfs::new();
        let db_pager = Arc::new(Pager::open(&vfs, "data.db", TestDbFileId(0), PageSize::DEFAULT).unwrap());
        let wal = Arc::new(Wal::open(&vfs, "test.wal", PageSize::DEFAULT).unwrap());
        (db_pager, wal, Arc::new(PageVersionTable::new()))
    }

    fn string_pk_table() -> NodeTable<MemoryVfs> {
        let (db_pager, wal, versions) = test_rig();
        NodeTable::create(
            TableId(0),
            vec![LogicalTypeID::String, LogicalTypeID::Int64],
            Some(PkConfig { column_id: 0, is_string: true }),
            db_pager,
            wal,
            versions,
            TestDbFileId(0),
        )
        .unwrap()
    }

    fn insert_one(table: &NodeTable<MemoryVfs>, name: &str, age: i64) -> Result<u64> {
        let pk_vec = ValueVector::with_values(LogicalTypeID::String, vec![Value::String(name.as_bytes().to_vec())]);
        let age_vec = ValueVector::with_values(LogicalTypeID::Int64, vec![Value::Int64(age)]);
        let mut node_id_vec = ValueVector::with_values(
            LogicalTypeID::InternalId,
            vec![Value::InternalId(InternalId::new(0, 0))],
        );
        table.insert(&mut node_id_vec, &[pk_vec, age_vec])
    }

    #[test]
    fn duplicate_pk_is_rejected_with_message_containing_key() {
        let table = string_pk_table();
        assert_eq!(insert_one(&table, "alice", 30).unwrap(), 0);
        let err = insert_one(&table, "alice", 40).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("alice"), "message was: {msg}");
    }

    #[test]
    fn null_pk_is_rejected() {
        let table = string_pk_table();
        let pk_vec = ValueVector::with_values(LogicalTypeID::String, vec![Value::Null]);
        let age_vec = ValueVector::with_values(LogicalTypeID::Int64, vec![Value::Int64(1)]);
        let mut node_id_vec = ValueVector::with_values(
            LogicalTypeID::InternalId,
            vec![Value::InternalId(InternalId::new(0, 0))],
        );
        let err = table.insert(&mut node_id_vec, &[pk_vec, age_vec]).unwrap_err();
        assert!(matches!(err, VxError::NullPrimaryKey { .. }));
    }

    #[test]
    fn update_pk_relocates_index_entry() {
        let table = string_pk_table();
        insert_one(&table, "a", 1).unwrap();
        table.update(0, 0, Value::String(b"b".to_vec())).unwrap();
        let index = table.pk_index().unwrap();
        assert_eq!(index.lookup(&IndexKey::Str(b"a".to_vec())), None);
        assert_eq!(index.lookup(&IndexKey::Str(b"b".to_vec())), Some(0));
    }

    #[test]
    fn delete_removes_pk_and_reuses_offset() {
        let table = string_pk_table();
        insert_one(&table, "a", 1).unwrap();
        let node_id_vec = ValueVector::with_values(
            LogicalTypeID::InternalId,
            vec![Value::InternalId(InternalId::new(0, 0))],
        );
        let pks = table.delete_(&node_id_vec).unwrap();
        assert_eq!(pks[0], Value::String(b"a".to_vec()));
        assert_eq!(table.pk_index().unwrap().lookup(&IndexKey::Str(b"a".to_vec())), None);
        assert_eq!(insert_one(&table, "c", 2).unwrap(), 0, "offset 0 is reused");
    }

    #[test]
    fn inserted_rows_persist_through_the_column_data_blob() {
        let table = string_pk_table();
        insert_one(&table, "alice", 30).unwrap();
        let raw = table.data_store.read_blob(0).unwrap();
        let reloaded = NodeTableData::decode(&raw);
        assert_eq!(reloaded.get(0, 0), Value::String(b"alice".to_vec()));
        assert_eq!(reloaded.get(1, 0), Value::Int64(30));
    }

    #[test]
    fn reopening_a_table_recovers_data_and_pk_index() {
        let (db_pager, wal, versions) = test_rig();
        let (data_dir, index_dir) = {
            let table = NodeTable::create(
                TableId(0),
                vec![LogicalTypeID::String],
                Some(PkConfig { column_id: 0, is_string: true }),
                Arc::clone(&db_pager),
                Arc::clone(&wal),
                Arc::clone(&versions),
                TestDbFileId(0),
            )
            .unwrap();
            let pk_vec = ValueVector::with_values(LogicalTypeID::String, vec![Value::String(b"dana".to_vec())]);
            let mut node_id_vec =
                ValueVector::with_values(LogicalTypeID::InternalId, vec![Value::InternalId(InternalId::new(0, 0))]);
            table.insert(&mut node_id_vec, &[pk_vec]).unwrap();
            (table.data_directory(), table.index_directory())
        };

        let reopened = NodeTable::open(
            TableId(0),
            vec![LogicalTypeID::String],
            Some(PkConfig { column_id: 0, is_string: true }),
            db_pager,
            wal,
            versions,
            TestDbFileId(0),
            data_dir,
            index_dir,
        )
        .unwrap();
        assert_eq!(reopened.pk_index().unwrap().lookup(&IndexKey::Str(b"dana".to_vec())), Some(0));
        assert_eq!(reopened.read(
            &ValueVector::with_values(LogicalTypeID::InternalId, vec![Value::InternalId(InternalId::new(0, 0))]),
            &[0]
        )[0].get(0).cloned().unwrap(), Value::String(b"dana".to_vec()));
    }
}
