//! Fixed-size page pager over a single VFS-backed file.
//!
//! `Pager` is the "Pager & Buffer Pool" leaf component: it owns page
//! allocation, a pinning buffer pool, and the per-page locks that the page
//! versioning layer (in `vxdb-wal`) builds on top of. It does not know about
//! the WAL; writers go through `versioning::FileHandle` instead of calling
//! [`Pager::write_page`] directly, except during checkpoint.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use vxdb_error::{Result, VxError};
use vxdb_types::{page_byte_offset, DbFileId, PageData, PageNumber, PageSize};
use vxdb_vfs::{Vfs, VfsFile};

use crate::buffer_pool::BufferPool;

/// Per-page exclusive lock, keyed by page number and lazily created on
/// first access so a freshly opened file pays no up-front allocation cost.
#[derive(Default)]
struct PageLocks {
    locks: Mutex<HashMap<PageNumber, Arc<Mutex<()>>>>,
}

impl PageLocks {
    fn get(&self, page_no: PageNumber) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(page_no)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// An acquired per-page lock. Released on drop.
pub struct PageLockGuard {
    _lock: Arc<Mutex<()>>,
    _guard: parking_lot::lock_api::ArcMutexGuard<parking_lot::RawMutex, ()>,
}

struct PagerState {
    next_page: u32,
    freelist: Vec<PageNumber>,
}

/// A single-file pager: allocation, write-through I/O, and per-page locking.
pub struct Pager<V: Vfs> {
    file_id: DbFileId,
    file: V::File,
    page_size: PageSize,
    pool: BufferPool,
    locks: PageLocks,
    state: Mutex<PagerState>,
}

impl<V: Vfs> Pager<V> {
    /// Open `name` through `vfs`, inferring the current page count from the
    /// file's length (zero for a freshly created file).
    pub fn open(vfs: &V, name: &str, file_id: DbFileId, page_size: PageSize) -> Result<Self> {
        let file = vfs.open(name)?;
        let len = file.len()?;
        let page_count = len / page_size.as_usize() as u64;
        let next_page = u32::try_from(page_count + 1).map_err(|_| VxError::OutOfRange {
            what: "page count",
            value: i64::try_from(page_count).unwrap_or(i64::MAX),
        })?;
        Ok(Pager {
            file_id,
            file,
            page_size,
            pool: BufferPool::new(page_size, 4096),
            locks: PageLocks::default(),
            state: Mutex::new(PagerState {
                next_page: next_page.max(2),
                freelist: Vec::new(),
            }),
        })
    }

    #[must_use]
    pub const fn file_id(&self) -> DbFileId {
        self.file_id
    }

    #[must_use]
    pub const fn page_size(&self) -> PageSize {
        self.page_size
    }

    /// Acquire the per-page lock on `page_no`. Held for the duration of a
    /// page-versioning write (spec §4.1 step 2/unpin).
    pub fn lock_page(&self, page_no: PageNumber) -> PageLockGuard {
        let lock = self.locks.get(page_no);
        let guard = parking_lot::Mutex::lock_arc(Arc::clone(&lock));
        PageLockGuard {
            _lock: lock,
            _guard: guard,
        }
    }

    /// Allocate a fresh page index, reusing a freed page if one is available.
    pub fn allocate_page(&self) -> Result<PageNumber> {
        let mut state = self.state.lock();
        if let Some(page) = state.freelist.pop() {
            return Ok(page);
        }
        let raw = state.next_page;
        state.next_page = state.next_page.saturating_add(1);
        PageNumber::new(raw).ok_or(VxError::OutOfRange {
            what: "allocated page number",
            value: i64::from(raw),
        })
    }

    pub fn free_page(&self, page_no: PageNumber) {
        self.pool.invalidate(page_no);
        self.state.lock().freelist.push(page_no);
    }

    /// Optimistic read: pin the cached frame if resident, else read through
    /// to the file. Tolerates a concurrent writer — the caller observes
    /// either the pre- or post-write image, never a torn one, because writes
    /// always go through a freshly-seeded WAL frame rather than mutating
    /// this page in place.
    pub fn read_page(&self, page_no: PageNumber) -> Result<PageData> {
        if let Some(cached) = self.pool.peek(page_no) {
            return Ok(cached);
        }
        let mut buf = vec![0_u8; self.page_size.as_usize()];
        let offset = page_byte_offset(page_no, self.page_size)?;
        self.file.read_at(&mut buf, offset)?;
        let data = PageData::from_vec(buf);
        self.pool.put(page_no, data.clone());
        Ok(data)
    }

    /// Write-through: used by checkpoint (copying a WAL image back to its
    /// original page) and by WAL page allocation (the WAL file is itself
    /// just another paged file, opened through its own `Pager`).
    pub fn write_page(&self, page_no: PageNumber, data: &[u8]) -> Result<()> {
        let offset = page_byte_offset(page_no, self.page_size)?;
        self.file.write_at(data, offset)?;
        self.pool.put(page_no, PageData::from_vec(data.to_vec()));
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync()
    }

    pub fn truncate(&self, page_count: u32) -> Result<()> {
        let len = u64::from(page_count) * self.page_size.as_usize() as u64;
        self.file.set_len(len)?;
        let mut state = self.state.lock();
        state.next_page = page_count.max(1) + 1;
        state.freelist.clear();
        Ok(())
    }
}
