//! Fixed-size page buffer pool: pin/unpin, read/write, and the per-page
//! locks the page versioning layer (in `vxdb-wal`) is built from.

pub mod buffer_pool;
pub mod pager;

pub use buffer_pool::BufferPool;
pub use pager::{PageLockGuard, Pager};
