//! WAL record log: the append-only stream of page-update/page-insert
//! records plus the per-transaction "updated tables" set.

use vxdb_types::{DbFileId, PageNumber};

/// One entry in the WAL's record stream.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WalRecord {
    /// `orig` already existed; the WAL holds its new image.
    PageUpdate {
        db_file_id: DbFileId,
        original_page_idx: PageNumber,
    },
    /// `orig` is a freshly allocated page; recovery does not require it to
    /// have existed before this transaction.
    PageInsert {
        db_file_id: DbFileId,
        original_page_idx: PageNumber,
    },
}

impl WalRecord {
    #[must_use]
    pub const fn original_page_idx(&self) -> PageNumber {
        match self {
            WalRecord::PageUpdate {
                original_page_idx, ..
            }
            | WalRecord::PageInsert {
                original_page_idx, ..
            } => *original_page_idx,
        }
    }

    #[must_use]
    pub const fn db_file_id(&self) -> DbFileId {
        match self {
            WalRecord::PageUpdate { db_file_id, .. } | WalRecord::PageInsert { db_file_id, .. } => {
                *db_file_id
            }
        }
    }

    /// Fixed-width on-disk encoding: tag byte, db_file_id, original_page_idx,
    /// trailing CRC32C over the three preceding fields so a torn write to
    /// the record stream is detectable rather than silently misread.
    const ENCODED_LEN: usize = 1 + 4 + 4 + 4;

    #[must_use]
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0_u8; Self::ENCODED_LEN];
        let (tag, db_file_id, page_idx) = match self {
            WalRecord::PageUpdate {
                db_file_id,
                original_page_idx,
            } => (0_u8, db_file_id.0, original_page_idx.get()),
            WalRecord::PageInsert {
                db_file_id,
                original_page_idx,
            } => (1_u8, db_file_id.0, original_page_idx.get()),
        };
        buf[0] = tag;
        buf[1..5].copy_from_slice(&db_file_id.to_le_bytes());
        buf[5..9].copy_from_slice(&page_idx.to_le_bytes());
        let checksum = crc32c::crc32c(&buf[0..9]);
        buf[9..13].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Decode and verify the trailing checksum. Returns `None` on a
    /// malformed tag, an invalid page number, or a checksum mismatch (a
    /// torn or corrupted write to the record stream).
    #[must_use]
    pub fn decode(buf: &[u8; Self::ENCODED_LEN]) -> Option<Self> {
        let stored_checksum = u32::from_le_bytes(buf[9..13].try_into().ok()?);
        if crc32c::crc32c(&buf[0..9]) != stored_checksum {
            return None;
        }
        let db_file_id = DbFileId(u32::from_le_bytes(buf[1..5].try_into().ok()?));
        let page_idx = u32::from_le_bytes(buf[5..9].try_into().ok()?);
        let original_page_idx = PageNumber::new(page_idx)?;
        match buf[0] {
            0 => Some(WalRecord::PageUpdate {
                db_file_id,
                original_page_idx,
            }),
            1 => Some(WalRecord::PageInsert {
                db_file_id,
                original_page_idx,
            }),
            _ => None,
        }
    }
}

pub(crate) const RECORD_ENCODED_LEN: usize = WalRecord::ENCODED_LEN;
