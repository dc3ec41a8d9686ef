//! Fixed-capacity primary/overflow slots.

use smallvec::SmallVec;

use crate::entry::Entry;
use crate::header::SLOT_CAPACITY;

/// One primary or overflow slot: up to [`SLOT_CAPACITY`] entries plus a link
/// to the next overflow slot in the chain, if any.
#[derive(Clone, Debug, Default)]
pub struct Slot {
    pub entries: SmallVec<[Option<Entry>; SLOT_CAPACITY]>,
    pub overflow: Option<u32>,
}

impl Slot {
    #[must_use]
    pub fn empty() -> Self {
        Slot {
            entries: SmallVec::from_elem(None, SLOT_CAPACITY),
            overflow: None,
        }
    }

    /// First unoccupied (or tombstoned) position in this slot, if any.
    #[must_use]
    pub fn free_index(&self) -> Option<usize> {
        self.entries.iter().position(|e| match e {
            None => true,
            Some(entry) => entry.tombstoned,
        })
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free_index().is_none()
    }

    /// Append this slot's page-serialized form to `buf` (spec §4.3).
    pub fn encode(&self, buf: &mut Vec<u8>) {
        for entry in &self.entries {
            match entry {
                Some(e) => {
                    buf.push(1);
                    e.encode(buf);
                }
                None => buf.push(0),
            }
        }
        let link = self.overflow.map_or(0, |v| v + 1);
        buf.extend_from_slice(&link.to_le_bytes());
    }

    /// Decode a slot previously written by [`Slot::encode`], advancing `pos`
    /// past the bytes consumed.
    #[must_use]
    pub fn decode(bytes: &[u8], pos: &mut usize) -> Self {
        let mut entries = SmallVec::with_capacity(SLOT_CAPACITY);
        for _ in 0..SLOT_CAPACITY {
            let present = bytes[*pos];
            *pos += 1;
            if present == 1 {
                entries.push(Some(Entry::decode(bytes, pos)));
            } else {
                entries.push(None);
            }
        }
        let link = u32::from_le_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
        *pos += 4;
        let overflow = if link == 0 { None } else { Some(link - 1) };
        Slot { entries, overflow }
    }
}
