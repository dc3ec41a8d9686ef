//! Append-only write-ahead log: owns the WAL file's page images (through its
//! own [`Pager`]) and the record stream describing which original page each
//! image replaces.

use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::{debug, instrument};
use vxdb_error::Result;
use vxdb_pager::Pager;
use vxdb_types::{DbFileId, PageData, PageNumber, PageSize, TableId};
use vxdb_vfs::{Vfs, VfsFile};

use crate::record::WalRecord;

/// Append-only log of page images plus the records describing them.
///
/// The record stream (spec §6: "a trailing record stream describing which
/// original page each image replaces") is persisted in a file alongside the
/// WAL's page pool rather than interleaved with it, so a flush can write it
/// in one contiguous range.
pub struct Wal<V: Vfs> {
    pager: Pager<V>,
    record_file: V::File,
    records: Mutex<Vec<WalRecord>>,
    updated_tables: Mutex<HashSet<TableId>>,
}

impl<V: Vfs> Wal<V> {
    pub fn open(vfs: &V, name: &str, page_size: PageSize) -> Result<Self> {
        let pager = Pager::open(vfs, name, DbFileId(u32::MAX), page_size)?;
        let record_file = vfs.open(&format!("{name}.records"))?;
        Ok(Wal {
            pager,
            record_file,
            records: Mutex::new(Vec::new()),
            updated_tables: Mutex::new(HashSet::new()),
        })
    }

    #[must_use]
    pub const fn page_size(&self) -> PageSize {
        self.pager.page_size()
    }

    /// Reserve a WAL page slot for the new image of `orig` and record the
    /// `PageUpdate`. Returns the WAL page index.
    #[instrument(skip(self))]
    pub fn log_page_update_record(
        &self,
        db_file_id: DbFileId,
        original_page_idx: PageNumber,
    ) -> Result<PageNumber> {
        let wal_idx = self.pager.allocate_page()?;
        self.records.lock().push(WalRecord::PageUpdate {
            db_file_id,
            original_page_idx,
        });
        debug!(?wal_idx, orig = ?original_page_idx, "wal page-update record");
        Ok(wal_idx)
    }

    /// Same as [`Wal::log_page_update_record`], but denotes that `orig`
    /// itself is freshly allocated — recovery does not require it to have
    /// existed before this transaction.
    #[instrument(skip(self))]
    pub fn log_page_insert_record(
        &self,
        db_file_id: DbFileId,
        original_page_idx: PageNumber,
    ) -> Result<PageNumber> {
        let wal_idx = self.pager.allocate_page()?;
        self.records.lock().push(WalRecord::PageInsert {
            db_file_id,
            original_page_idx,
        });
        debug!(?wal_idx, orig = ?original_page_idx, "wal page-insert record");
        Ok(wal_idx)
    }

    pub fn add_to_updated_tables(&self, table_id: TableId) {
        self.updated_tables.lock().insert(table_id);
    }

    #[must_use]
    pub fn updated_tables(&self) -> Vec<TableId> {
        self.updated_tables.lock().iter().copied().collect()
    }

    pub fn read_wal_page(&self, wal_idx: PageNumber) -> Result<PageData> {
        self.pager.read_page(wal_idx)
    }

    pub fn write_wal_page(&self, wal_idx: PageNumber, data: &[u8]) -> Result<()> {
        self.pager.write_page(wal_idx, data)
    }

    /// Persist every WAL page and the record stream to stable storage.
    /// Does not touch the original database file.
    #[instrument(skip(self))]
    pub fn flush(&self) -> Result<()> {
        self.pager.sync()?;
        let records = self.records.lock();
        let mut bytes = Vec::with_capacity(records.len() * crate::record::RECORD_ENCODED_LEN);
        for record in records.iter() {
            bytes.extend_from_slice(&record.encode());
        }
        self.record_file.set_len(bytes.len() as u64)?;
        self.record_file.write_at(&bytes, 0)?;
        self.record_file.sync()?;
        debug!(records = records.len(), "wal flushed");
        Ok(())
    }

    /// Copy each WAL page image back to its original location in `db_pager`,
    /// then clear the record stream and truncate the WAL. Returns the set
    /// of `(original_page_idx, db_file_id)` pairs that were checkpointed so
    /// the caller can clear the matching page-versioning side table.
    #[instrument(skip(self, db_pager))]
    pub fn checkpoint<DbV: Vfs>(
        &self,
        db_pager: &Pager<DbV>,
        version_lookup: impl Fn(PageNumber) -> Option<PageNumber>,
    ) -> Result<Vec<(DbFileId, PageNumber)>> {
        let mut records = self.records.lock();
        let mut checkpointed = Vec::with_capacity(records.len());
        for record in records.iter() {
            let orig = record.original_page_idx();
            let Some(wal_idx) = version_lookup(orig) else {
                continue;
            };
            let image = self.pager.read_page(wal_idx)?;
            db_pager.write_page(orig, image.as_ref())?;
            checkpointed.push((record.db_file_id(), orig));
        }
        db_pager.sync()?;
        records.clear();
        drop(records);
        self.record_file.set_len(0)?;
        self.updated_tables.lock().clear();
        debug!(pages = checkpointed.len(), "wal checkpointed");
        Ok(checkpointed)
    }

    /// Discard all uncommitted WAL state: the record stream and the
    /// updated-tables set. The caller is responsible for clearing the
    /// page-versioning side table that mapped originals to these WAL pages.
    pub fn rollback(&self) {
        self.records.lock().clear();
        let _ = self.record_file.set_len(0);
        self.updated_tables.lock().clear();
    }

    /// Re-read the on-disk record stream and decode it, for crash-equivalence
    /// testing (spec §8 testable property 5): a flushed-but-not-yet-checkpointed
    /// WAL's persisted records should match what is held in memory.
    pub fn read_persisted_records(&self) -> Result<Vec<WalRecord>> {
        let len = self.record_file.len()? as usize;
        let mut bytes = vec![0_u8; len];
        self.record_file.read_at(&mut bytes, 0)?;
        Ok(bytes
            .chunks_exact(crate::record::RECORD_ENCODED_LEN)
            .filter_map(|chunk| WalRecord::decode(chunk.try_into().ok()?))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vxdb_vfs::MemoryVfs;

    #[test]
    fn flush_persists_the_record_stream_to_disk() {
        let vfs = MemoryVfs::new();
        let wal = Wal::open(&vfs, "t.wal", PageSize::DEFAULT).unwrap();
        wal.log_page_update_record(DbFileId(0), PageNumber::new(1).unwrap())
            .unwrap();
        wal.log_page_insert_record(DbFileId(0), PageNumber::new(2).unwrap())
            .unwrap();
        wal.flush().unwrap();

        let persisted = wal.read_persisted_records().unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].original_page_idx(), PageNumber::new(1).unwrap());
        assert_eq!(persisted[1].original_page_idx(), PageNumber::new(2).unwrap());
    }

    #[test]
    fn checkpoint_truncates_the_persisted_record_stream() {
        let vfs = MemoryVfs::new();
        let db_pager = Pager::open(&vfs, "t.db", DbFileId(0), PageSize::DEFAULT).unwrap();
        let wal = Wal::open(&vfs, "t.wal", PageSize::DEFAULT).unwrap();
        let orig = db_pager.allocate_page().unwrap();
        let wal_idx = wal.log_page_update_record(DbFileId(0), orig).unwrap();
        wal.write_wal_page(wal_idx, &vec![0xAB; PageSize::DEFAULT.as_usize()]).unwrap();
        wal.flush().unwrap();
        assert_eq!(wal.read_persisted_records().unwrap().len(), 1);

        wal.checkpoint(&db_pager, |_| Some(wal_idx)).unwrap();
        assert!(wal.read_persisted_records().unwrap().is_empty());
    }
}
