//! Pinning buffer pool: a bounded cache of page frames with per-frame pin
//! counts. Eviction never touches a pinned frame.
//!
//! This is a plain LRU rather than the teacher's adaptive-replacement
//! cache — ARC's recency/frequency split earns its keep against a large,
//! heterogeneous SQLite page mix, but this engine's buffer pool only needs
//! to keep hot index and column pages resident and never evict a page a
//! writer currently holds a frame for.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use vxdb_types::{PageData, PageNumber, PageSize};

struct Frame {
    data: PageData,
    pins: AtomicUsize,
}

/// A bounded, pinning page cache. `capacity` bounds the number of resident
/// frames; once exceeded, the least-recently-used unpinned frame is evicted.
pub struct BufferPool {
    page_size: PageSize,
    capacity: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    frames: HashMap<PageNumber, Arc<Frame>>,
    recency: Vec<PageNumber>,
}

impl BufferPool {
    #[must_use]
    pub fn new(page_size: PageSize, capacity: usize) -> Self {
        BufferPool {
            page_size,
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                frames: HashMap::new(),
                recency: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub const fn page_size(&self) -> PageSize {
        self.page_size
    }

    /// Look up a cached frame without pinning it — used by optimistic reads
    /// that tolerate a concurrent overwrite.
    #[must_use]
    pub fn peek(&self, page_no: PageNumber) -> Option<PageData> {
        let inner = self.inner.lock();
        inner.frames.get(&page_no).map(|f| f.data.clone())
    }

    /// Insert or replace a frame's contents (used after a read-through or a
    /// write-through) and bump its recency.
    pub fn put(&self, page_no: PageNumber, data: PageData) {
        let mut inner = self.inner.lock();
        self.touch_recency(&mut inner, page_no);
        match inner.frames.get(&page_no) {
            Some(frame) => {
                let pins = frame.pins.load(Ordering::Acquire);
                inner.frames.insert(
                    page_no,
                    Arc::new(Frame {
                        data,
                        pins: AtomicUsize::new(pins),
                    }),
                );
            }
            None => {
                inner.frames.insert(
                    page_no,
                    Arc::new(Frame {
                        data,
                        pins: AtomicUsize::new(0),
                    }),
                );
            }
        }
        self.evict_if_needed(&mut inner);
    }

    /// Pin `page_no`, returning its cached contents if resident. The pin
    /// count prevents eviction until [`BufferPool::unpin`] is called the
    /// same number of times.
    pub fn pin(&self, page_no: PageNumber) -> Option<PageData> {
        let mut inner = self.inner.lock();
        self.touch_recency(&mut inner, page_no);
        inner.frames.get(&page_no).map(|frame| {
            frame.pins.fetch_add(1, Ordering::AcqRel);
            frame.data.clone()
        })
    }

    pub fn unpin(&self, page_no: PageNumber) {
        let inner = self.inner.lock();
        if let Some(frame) = inner.frames.get(&page_no) {
            frame.pins.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub fn invalidate(&self, page_no: PageNumber) {
        let mut inner = self.inner.lock();
        inner.frames.remove(&page_no);
        inner.recency.retain(|p| *p != page_no);
    }

    fn touch_recency(&self, inner: &mut Inner, page_no: PageNumber) {
        inner.recency.retain(|p| *p != page_no);
        inner.recency.push(page_no);
    }

    fn evict_if_needed(&self, inner: &mut Inner) {
        while inner.frames.len() > self.capacity {
            let Some(victim_pos) = inner
                .recency
                .iter()
                .position(|p| inner.frames.get(p).is_some_and(|f| f.pins.load(Ordering::Acquire) == 0))
            else {
                break;
            };
            let victim = inner.recency.remove(victim_pos);
            inner.frames.remove(&victim);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pn(n: u32) -> PageNumber {
        PageNumber::new(n).unwrap()
    }

    #[test]
    fn pinned_frame_survives_eviction_pressure() {
        let pool = BufferPool::new(PageSize::DEFAULT, 2);
        pool.put(pn(1), PageData::zeroed(PageSize::DEFAULT));
        let _pinned = pool.pin(pn(1));
        pool.put(pn(2), PageData::zeroed(PageSize::DEFAULT));
        pool.put(pn(3), PageData::zeroed(PageSize::DEFAULT));
        assert!(pool.peek(pn(1)).is_some());
    }

    #[test]
    fn unpinned_lru_frame_is_evicted() {
        let pool = BufferPool::new(PageSize::DEFAULT, 1);
        pool.put(pn(1), PageData::zeroed(PageSize::DEFAULT));
        pool.put(pn(2), PageData::zeroed(PageSize::DEFAULT));
        assert!(pool.peek(pn(1)).is_none());
        assert!(pool.peek(pn(2)).is_some());
    }
}
