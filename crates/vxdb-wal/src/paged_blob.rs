//! A generic page-backed blob store built on the versioning layer (spec §2
//! data flow, §4.3/§4.4 durability): one directory page holding a fixed-size
//! array of `(first_page, byte_len)` entries, one singly-linked chain of data
//! pages per entry. This is what gives the PK hash index's shards and the
//! node/rel table stores an actual on-disk, WAL-versioned representation
//! instead of a bare in-memory aggregate — every write lands through
//! [`get_writable_frame`]/[`insert_new_page`], the same primitive a table
//! mutation uses for its own pages.

use std::sync::Arc;

use parking_lot::Mutex;
use vxdb_error::Result;
use vxdb_pager::Pager;
use vxdb_types::{DbFileId, PageNumber};
use vxdb_vfs::Vfs;

use crate::versioning::{get_writable_frame, insert_new_page, read_current, PageVersionTable};
use crate::wal::Wal;

/// Bytes of directory overhead per blob slot: a `u32` head page number (0
/// means the blob is empty) and a `u32` byte length.
const DIRECTORY_ENTRY_LEN: usize = 8;
/// Bytes of per-data-page overhead: the `u32` next-page pointer (0 = end of
/// chain).
const DATA_PAGE_HEADER_LEN: usize = 4;

/// `num_blobs` independently addressed byte blobs sharing one directory page
/// and the owning table's `Pager`/`Wal`/`PageVersionTable`.
pub struct PagedBlobStore<V: Vfs> {
    db_pager: Arc<Pager<V>>,
    wal: Arc<Wal<V>>,
    version_table: Arc<PageVersionTable>,
    db_file_id: DbFileId,
    directory_page: PageNumber,
    chains: Mutex<Vec<Vec<PageNumber>>>,
}

impl<V: Vfs> PagedBlobStore<V> {
    /// Allocate a fresh directory page for `num_blobs` blobs, all initially
    /// empty.
    pub fn create(
        db_pager: Arc<Pager<V>>,
        wal: Arc<Wal<V>>,
        version_table: Arc<PageVersionTable>,
        db_file_id: DbFileId,
        num_blobs: usize,
    ) -> Result<Self> {
        assert!(
            num_blobs * DIRECTORY_ENTRY_LEN <= db_pager.page_size().as_usize(),
            "blob directory does not fit in one page at this page size"
        );
        let directory_page = insert_new_page(&db_pager, &wal, &version_table, db_file_id, |buf| {
            buf.fill(0);
        })?;
        Ok(PagedBlobStore {
            db_pager,
            wal,
            version_table,
            db_file_id,
            directory_page,
            chains: Mutex::new(vec![Vec::new(); num_blobs]),
        })
    }

    /// Re-open a blob store whose directory page is already `directory_page`,
    /// walking each blob's page chain to reconstruct it.
    pub fn open(
        db_pager: Arc<Pager<V>>,
        wal: Arc<Wal<V>>,
        version_table: Arc<PageVersionTable>,
        db_file_id: DbFileId,
        directory_page: PageNumber,
        num_blobs: usize,
    ) -> Result<Self> {
        let store = PagedBlobStore {
            db_pager,
            wal,
            version_table,
            db_file_id,
            directory_page,
            chains: Mutex::new(vec![Vec::new(); num_blobs]),
        };
        let directory = read_current(&store.db_pager, &store.wal, &store.version_table, directory_page)?;
        let mut chains = vec![Vec::new(); num_blobs];
        for (blob_id, chain) in chains.iter_mut().enumerate() {
            let (first, _len) = read_directory_entry(directory.as_ref(), blob_id);
            let Some(mut page) = first else { continue };
            loop {
                let data = read_current(&store.db_pager, &store.wal, &store.version_table, page)?;
                chain.push(page);
                let next = u32::from_le_bytes(data.as_ref()[0..4].try_into().unwrap());
                match PageNumber::new(next) {
                    Some(next_page) => page = next_page,
                    None => break,
                }
            }
        }
        *store.chains.lock() = chains;
        Ok(store)
    }

    #[must_use]
    pub const fn directory_page(&self) -> PageNumber {
        self.directory_page
    }

    /// Read blob `blob_id`'s current bytes, following its page chain.
    pub fn read_blob(&self, blob_id: usize) -> Result<Vec<u8>> {
        let directory = read_current(&self.db_pager, &self.wal, &self.version_table, self.directory_page)?;
        let (first, len) = read_directory_entry(directory.as_ref(), blob_id);
        let Some(mut page) = first else { return Ok(Vec::new()) };
        let mut out = Vec::with_capacity(len as usize);
        while out.len() < len as usize {
            let data = read_current(&self.db_pager, &self.wal, &self.version_table, page)?;
            let payload = &data.as_ref()[DATA_PAGE_HEADER_LEN..];
            let take = (len as usize - out.len()).min(payload.len());
            out.extend_from_slice(&payload[..take]);
            let next = u32::from_le_bytes(data.as_ref()[0..4].try_into().unwrap());
            match PageNumber::new(next) {
                Some(next_page) => page = next_page,
                None => break,
            }
        }
        Ok(out)
    }

    /// Overwrite blob `blob_id` with `bytes`: grows its page chain if needed,
    /// materializes a WAL frame for every page the new content touches, and
    /// updates the directory entry in place.
    pub fn write_blob(&self, blob_id: usize, bytes: &[u8]) -> Result<()> {
        let payload_cap = self.db_pager.page_size().as_usize() - DATA_PAGE_HEADER_LEN;
        let pages_needed = if bytes.is_empty() { 0 } else { bytes.len().div_ceil(payload_cap) };

        let mut chains = self.chains.lock();
        let chain = &mut chains[blob_id];
        while chain.len() < pages_needed {
            let page = insert_new_page(&self.db_pager, &self.wal, &self.version_table, self.db_file_id, |buf| {
                buf.fill(0);
            })?;
            chain.push(page);
        }

        for i in 0..pages_needed {
            let start = i * payload_cap;
            let end = (start + payload_cap).min(bytes.len());
            let next = if i + 1 < pages_needed { chain[i + 1].get() } else { 0 };
            let mut frame =
                get_writable_frame(&self.db_pager, &self.wal, &self.version_table, self.db_file_id, chain[i], false)?;
            frame[0..4].copy_from_slice(&next.to_le_bytes());
            frame[DATA_PAGE_HEADER_LEN..DATA_PAGE_HEADER_LEN + (end - start)].copy_from_slice(&bytes[start..end]);
            for b in &mut frame[DATA_PAGE_HEADER_LEN + (end - start)..] {
                *b = 0;
            }
        }

        let first_page = if pages_needed > 0 { chain[0].get() } else { 0 };
        let mut directory = get_writable_frame(
            &self.db_pager,
            &self.wal,
            &self.version_table,
            self.db_file_id,
            self.directory_page,
            false,
        )?;
        let off = blob_id * DIRECTORY_ENTRY_LEN;
        directory[off..off + 4].copy_from_slice(&first_page.to_le_bytes());
        directory[off + 4..off + 8].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
        Ok(())
    }
}

fn read_directory_entry(directory: &[u8], blob_id: usize) -> (Option<PageNumber>, u32) {
    let off = blob_id * DIRECTORY_ENTRY_LEN;
    let page = u32::from_le_bytes(directory[off..off + 4].try_into().unwrap());
    let len = u32::from_le_bytes(directory[off + 4..off + 8].try_into().unwrap());
    (PageNumber::new(page), len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vxdb_types::{DbFileId as TestDbFileId, PageSize};
    use vxdb_vfs::MemoryVfs;

    fn setup() -> (Arc<Pager<MemoryVfs>>, Arc<Wal<MemoryVfs>>, Arc<PageVersionTable>) {
        let vfs = MemoryVfs::new();
        let db_pager = Arc::new(Pager::open(&vfs, "data.db", TestDbFileId(0), PageSize::DEFAULT).unwrap());
        let wal = Arc::new(Wal::open(&vfs, "data.wal", PageSize::DEFAULT).unwrap());
        (db_pager, wal, Arc::new(PageVersionTable::new()))
    }

    #[test]
    fn write_then_read_round_trips_a_single_page_blob() {
        let (db_pager, wal, versions) = setup();
        let store = PagedBlobStore::create(db_pager, wal, versions, TestDbFileId(1), 4).unwrap();
        store.write_blob(2, b"hello world").unwrap();
        assert_eq!(store.read_blob(2).unwrap(), b"hello world");
        assert!(store.read_blob(0).unwrap().is_empty());
    }

    #[test]
    fn write_spans_multiple_pages_when_content_exceeds_one_page() {
        let (db_pager, wal, versions) = setup();
        let store = PagedBlobStore::create(db_pager, wal, versions, TestDbFileId(1), 1).unwrap();
        let big = vec![0xAB_u8; PageSize::DEFAULT.as_usize() * 3 + 17];
        store.write_blob(0, &big).unwrap();
        assert_eq!(store.read_blob(0).unwrap(), big);
    }

    #[test]
    fn overwriting_a_blob_with_shorter_content_truncates_correctly() {
        let (db_pager, wal, versions) = setup();
        let store = PagedBlobStore::create(db_pager, wal, versions, TestDbFileId(1), 1).unwrap();
        store.write_blob(0, &vec![1_u8; 5000]).unwrap();
        store.write_blob(0, b"short").unwrap();
        assert_eq!(store.read_blob(0).unwrap(), b"short");
    }

    #[test]
    fn reopening_reconstructs_page_chains_from_the_directory() {
        let (db_pager, wal, versions) = setup();
        let directory_page = {
            let store = PagedBlobStore::create(Arc::clone(&db_pager), Arc::clone(&wal), Arc::clone(&versions), TestDbFileId(1), 2).unwrap();
            store.write_blob(1, b"persisted").unwrap();
            store.directory_page()
        };
        let reopened =
            PagedBlobStore::open(db_pager, wal, versions, TestDbFileId(1), directory_page, 2).unwrap();
        assert_eq!(reopened.read_blob(1).unwrap(), b"persisted");
    }
}
