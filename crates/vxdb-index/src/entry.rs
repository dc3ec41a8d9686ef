//! Key and entry types stored in a shard's slots.

use crate::ku_string::KuString;

/// A primary-key value as stored in the index. Integer keys are hashed and
/// compared directly; string keys go through [`KuString`]'s inline/overflow
/// representation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Key {
    Int64(i64),
    Str(KuString),
}

impl Key {
    #[must_use]
    pub fn as_hash_bytes(&self) -> std::borrow::Cow<'_, [u8]> {
        match self {
            Key::Int64(v) => std::borrow::Cow::Owned(v.to_le_bytes().to_vec()),
            Key::Str(s) => std::borrow::Cow::Owned(s.prefix().to_vec()),
        }
    }
}

/// One occupied or tombstoned position in a slot.
#[derive(Clone, Debug)]
pub struct Entry {
    pub fingerprint: u8,
    pub key: Key,
    pub offset: u64,
    pub tombstoned: bool,
}

impl Entry {
    #[must_use]
    pub const fn live(fingerprint: u8, key: Key, offset: u64) -> Self {
        Entry {
            fingerprint,
            key,
            offset,
            tombstoned: false,
        }
    }

    /// Append this entry's page-serialized form to `buf`. Does not write a
    /// presence marker — [`crate::slot::Slot::encode`] handles `Option`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(u8::from(self.tombstoned));
        buf.push(self.fingerprint);
        match &self.key {
            Key::Int64(v) => {
                buf.push(0);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Key::Str(s) => {
                buf.push(1);
                s.encode(buf);
            }
        }
        buf.extend_from_slice(&self.offset.to_le_bytes());
    }

    /// Decode an entry previously written by [`Entry::encode`], advancing
    /// `pos` past the bytes consumed.
    #[must_use]
    pub fn decode(bytes: &[u8], pos: &mut usize) -> Self {
        let tombstoned = bytes[*pos] != 0;
        *pos += 1;
        let fingerprint = bytes[*pos];
        *pos += 1;
        let tag = bytes[*pos];
        *pos += 1;
        let key = if tag == 0 {
            let v = i64::from_le_bytes(bytes[*pos..*pos + 8].try_into().unwrap());
            *pos += 8;
            Key::Int64(v)
        } else {
            Key::Str(KuString::decode(bytes, pos))
        };
        let offset = u64::from_le_bytes(bytes[*pos..*pos + 8].try_into().unwrap());
        *pos += 8;
        Entry { fingerprint, key, offset, tombstoned }
    }
}
