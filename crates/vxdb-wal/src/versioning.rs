//! Page Versioning Layer: presents every mutable page as copy-on-write under
//! the WAL. This is the mutation primitive the rest of the engine is built
//! from (spec §4.1).

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::instrument;
use vxdb_error::Result;
use vxdb_pager::{PageLockGuard, Pager};
use vxdb_types::{DbFileId, PageData, PageNumber, TableId, TransactionMode};
use vxdb_vfs::Vfs;

use crate::wal::Wal;

/// Pages per lazily-allocated side-table group. Grouping avoids a per-page
/// heap allocation for files with sparse write patterns.
const GROUP_SIZE: u32 = 64;

/// Per-file-handle side-table mapping an original page index to the WAL page
/// index holding its uncommitted new image.
#[derive(Default)]
pub struct PageVersionTable {
    groups: Mutex<HashMap<u32, Vec<Option<PageNumber>>>>,
}

impl PageVersionTable {
    #[must_use]
    pub fn new() -> Self {
        PageVersionTable::default()
    }

    fn group_of(page_no: PageNumber) -> (u32, usize) {
        let idx = page_no.get() - 1;
        (idx / GROUP_SIZE, (idx % GROUP_SIZE) as usize)
    }

    #[must_use]
    pub fn get(&self, original_page_idx: PageNumber) -> Option<PageNumber> {
        let (group, slot) = Self::group_of(original_page_idx);
        let groups = self.groups.lock();
        groups.get(&group).and_then(|g| g.get(slot).copied().flatten())
    }

    /// Record `original → wal_idx`. Per invariant 2, a page never acquires a
    /// second WAL image — this is a no-op if a mapping already exists.
    pub fn set_if_absent(&self, original_page_idx: PageNumber, wal_idx: PageNumber) {
        let (group, slot) = Self::group_of(original_page_idx);
        let mut groups = self.groups.lock();
        let entry = groups
            .entry(group)
            .or_insert_with(|| vec![None; GROUP_SIZE as usize]);
        if entry[slot].is_none() {
            entry[slot] = Some(wal_idx);
        }
    }

    pub fn clear(&self, original_page_idx: PageNumber) {
        let (group, slot) = Self::group_of(original_page_idx);
        let mut groups = self.groups.lock();
        if let Some(entry) = groups.get_mut(&group) {
            entry[slot] = None;
        }
    }

    pub fn clear_all(&self) {
        self.groups.lock().clear();
    }

    /// All `(original, wal_idx)` mappings currently tracked, for checkpoint.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(PageNumber, PageNumber)> {
        let groups = self.groups.lock();
        let mut out = Vec::new();
        for (&group, slots) in groups.iter() {
            for (slot, wal_idx) in slots.iter().enumerate() {
                if let Some(wal_idx) = wal_idx {
                    let raw = group * GROUP_SIZE + slot as u32 + 1;
                    if let Some(orig) = PageNumber::new(raw) {
                        out.push((orig, *wal_idx));
                    }
                }
            }
        }
        out
    }
}

/// Where a reader should route its page access, per spec §4.1 reader
/// routing: read-only transactions (or writers with no WAL image yet) see
/// the last checkpoint; writers with an existing WAL image read their own
/// writes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReadRoute {
    Original(PageNumber),
    Wal(PageNumber),
}

#[must_use]
pub fn route_read(
    version_table: &PageVersionTable,
    original_page_idx: PageNumber,
    mode: TransactionMode,
) -> ReadRoute {
    if matches!(mode, TransactionMode::ReadOnly) {
        return ReadRoute::Original(original_page_idx);
    }
    match version_table.get(original_page_idx) {
        Some(wal_idx) => ReadRoute::Wal(wal_idx),
        None => ReadRoute::Original(original_page_idx),
    }
}

/// A pinned, writable WAL frame. Dropping the guard writes the buffered
/// bytes back to the WAL pager and releases the per-page lock on the
/// original — on every exit path, including unwinding through a panicking
/// or early-returning write callback (spec §4.1, "scoped release").
pub struct WritableFrame<'w, V: Vfs> {
    wal: &'w Wal<V>,
    wal_idx: PageNumber,
    original_idx: PageNumber,
    data: Vec<u8>,
    _page_lock: PageLockGuard,
}

impl<V: Vfs> WritableFrame<'_, V> {
    #[must_use]
    pub const fn wal_idx(&self) -> PageNumber {
        self.wal_idx
    }

    #[must_use]
    pub const fn original_idx(&self) -> PageNumber {
        self.original_idx
    }
}

impl<V: Vfs> Deref for WritableFrame<'_, V> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl<V: Vfs> DerefMut for WritableFrame<'_, V> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl<V: Vfs> Drop for WritableFrame<'_, V> {
    fn drop(&mut self) {
        // Errors here cannot propagate from a Drop impl; a write failure at
        // this point means the underlying VFS file is failing writes, which
        // surfaces on the next explicit flush()/sync() call instead.
        let _ = self.wal.write_wal_page(self.wal_idx, &self.data);
    }
}

/// Primary operation of the page versioning layer: present `original_page_idx`
/// as a pinned, writable, copy-on-write frame (spec §4.1).
#[instrument(skip(db_pager, wal, version_table))]
pub fn get_writable_frame<'w, V: Vfs>(
    db_pager: &Pager<V>,
    wal: &'w Wal<V>,
    version_table: &PageVersionTable,
    db_file_id: DbFileId,
    original_page_idx: PageNumber,
    inserting_new_page: bool,
) -> Result<WritableFrame<'w, V>> {
    let page_lock = db_pager.lock_page(original_page_idx);

    if let Some(wal_idx) = version_table.get(original_page_idx) {
        let data = wal.read_wal_page(wal_idx)?;
        return Ok(WritableFrame {
            wal,
            wal_idx,
            original_idx: original_page_idx,
            data: data.as_ref().to_vec(),
            _page_lock: page_lock,
        });
    }

    let wal_idx = wal.log_page_update_record(db_file_id, original_page_idx)?;
    let mut data = vec![0_u8; db_pager.page_size().as_usize()];
    if !inserting_new_page {
        let original = db_pager.read_page(original_page_idx)?;
        data.copy_from_slice(original.as_ref());
    }
    version_table.set_if_absent(original_page_idx, wal_idx);

    Ok(WritableFrame {
        wal,
        wal_idx,
        original_idx: original_page_idx,
        data,
        _page_lock: page_lock,
    })
}

/// Allocate a brand-new original page, giving the caller a writable frame to
/// initialise it in. Distinct from [`get_writable_frame`] because there is
/// no original content to seed: the page did not exist before this call.
#[instrument(skip(db_pager, wal, version_table, init))]
pub fn insert_new_page<V: Vfs>(
    db_pager: &Pager<V>,
    wal: &Wal<V>,
    version_table: &PageVersionTable,
    db_file_id: DbFileId,
    init: impl FnOnce(&mut [u8]),
) -> Result<PageNumber> {
    let original_page_idx = db_pager.allocate_page()?;
    let _page_lock = db_pager.lock_page(original_page_idx);

    let wal_idx = wal.log_page_insert_record(db_file_id, original_page_idx)?;
    let mut data = vec![0_u8; db_pager.page_size().as_usize()];
    init(&mut data);
    wal.write_wal_page(wal_idx, &data)?;
    version_table.set_if_absent(original_page_idx, wal_idx);
    Ok(original_page_idx)
}

/// Read `page_no`'s current bytes without pinning it for a write: the same
/// writer-reads-its-own-writes routing [`get_writable_frame`] uses, minus the
/// page lock and the WAL-image allocation. Used by callers that only need to
/// see the page as it stands right now (e.g. loading a blob's page chain).
pub fn read_current<V: Vfs>(
    db_pager: &Pager<V>,
    wal: &Wal<V>,
    version_table: &PageVersionTable,
    page_no: PageNumber,
) -> Result<PageData> {
    match version_table.get(page_no) {
        Some(wal_idx) => wal.read_wal_page(wal_idx),
        None => db_pager.read_page(page_no),
    }
}

/// Re-export for call sites that only need the table-id bookkeeping
/// alongside a versioning call.
pub type UpdatedTable = TableId;
