//! Page identity and fixed-size page buffers.

use std::num::NonZeroU32;
use std::sync::Arc;

use vxdb_error::{Result, VxError};

/// Default and only page size the mutation core is validated against.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// A file-local page number. Page numbers are 1-based; `0` is reserved as
/// the `INVALID_PAGE_IDX` sentinel and is not representable by this type.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PageNumber(NonZeroU32);

impl PageNumber {
    pub const ONE: PageNumber = match NonZeroU32::new(1) {
        Some(n) => PageNumber(n),
        None => panic!("1 is non-zero"),
    };

    #[must_use]
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(n) => Some(PageNumber(n)),
            None => None,
        }
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

use std::fmt;

/// Validated page size. Only powers of two between 512 B and 64 KiB are
/// accepted, matching the on-disk page contract.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PageSize(u32);

impl PageSize {
    pub const DEFAULT: PageSize = PageSize(DEFAULT_PAGE_SIZE as u32);

    #[must_use]
    pub fn new(bytes: usize) -> Option<Self> {
        if bytes.is_power_of_two() && (512..=65536).contains(&bytes) {
            Some(PageSize(bytes as u32))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// An owned, page-sized byte buffer returned from a read.
#[derive(Clone, Debug)]
pub struct PageData(Arc<Vec<u8>>);

impl PageData {
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        PageData(Arc::new(bytes))
    }

    #[must_use]
    pub fn zeroed(page_size: PageSize) -> Self {
        PageData(Arc::new(vec![0_u8; page_size.as_usize()]))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for PageData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Identifies which logical database file a page belongs to — the primary
/// data file, a PK-index shard file, or the WAL itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct DbFileId(pub u32);

/// Validate a raw page offset arithmetic never silently overflows.
pub fn page_byte_offset(page_no: PageNumber, page_size: PageSize) -> Result<u64> {
    let idx = u64::from(page_no.get() - 1);
    idx.checked_mul(page_size.as_usize() as u64)
        .ok_or_else(|| {
            VxError::OutOfRange {
                what: "page byte offset",
                value: i64::try_from(page_no.get()).unwrap_or(i64::MAX),
            }
        })
}
