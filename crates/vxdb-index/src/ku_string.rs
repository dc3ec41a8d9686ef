//! String-key representation for the PK hash index.
//!
//! A key carries its length and a 4-byte prefix inline so most comparisons
//! never touch the full string: lookup compares `(len, prefix)` first and
//! only dereferences the overflow store on a prefix match.

pub const PREFIX_LENGTH: usize = 4;
pub const INLINE_CAPACITY: usize = 12;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct KuString {
    len: u32,
    prefix: [u8; PREFIX_LENGTH],
    storage: Storage,
}

#[derive(Clone, PartialEq, Eq, Debug)]
enum Storage {
    Inline([u8; INLINE_CAPACITY]),
    /// Index into the owning shard's overflow byte store.
    Overflow(u32),
}

impl KuString {
    /// Construct a key that stores its bytes inline (`bytes.len() <= INLINE_CAPACITY`).
    #[must_use]
    pub fn inline(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= INLINE_CAPACITY);
        let mut prefix = [0_u8; PREFIX_LENGTH];
        let prefix_len = bytes.len().min(PREFIX_LENGTH);
        prefix[..prefix_len].copy_from_slice(&bytes[..prefix_len]);
        let mut inline = [0_u8; INLINE_CAPACITY];
        inline[..bytes.len()].copy_from_slice(bytes);
        KuString {
            len: bytes.len() as u32,
            prefix,
            storage: Storage::Inline(inline),
        }
    }

    /// Construct a key whose full bytes live at `overflow_id` in the shard's
    /// overflow store; `bytes` is still needed here to capture the prefix.
    #[must_use]
    pub fn overflow(bytes: &[u8], overflow_id: u32) -> Self {
        let mut prefix = [0_u8; PREFIX_LENGTH];
        let prefix_len = bytes.len().min(PREFIX_LENGTH);
        prefix[..prefix_len].copy_from_slice(&bytes[..prefix_len]);
        KuString {
            len: bytes.len() as u32,
            prefix,
            storage: Storage::Overflow(overflow_id),
        }
    }

    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn prefix(&self) -> &[u8; PREFIX_LENGTH] {
        &self.prefix
    }

    #[must_use]
    pub const fn overflow_id(&self) -> Option<u32> {
        match self.storage {
            Storage::Overflow(id) => Some(id),
            Storage::Inline(_) => None,
        }
    }

    /// Fast-path prefix comparison: length and the first `PREFIX_LENGTH`
    /// bytes. Only on a match does the caller need to compare full bytes.
    #[must_use]
    pub fn prefix_equal(&self, other: &KuString) -> bool {
        self.len == other.len && self.prefix == other.prefix
    }

    /// Build a key from raw bytes, choosing inline or overflow storage. A
    /// fresh overflow id is requested from `alloc_overflow` only when the
    /// bytes exceed [`INLINE_CAPACITY`].
    pub fn from_bytes(bytes: &[u8], alloc_overflow: impl FnOnce(&[u8]) -> u32) -> Self {
        if bytes.len() <= INLINE_CAPACITY {
            KuString::inline(bytes)
        } else {
            let id = alloc_overflow(bytes);
            KuString::overflow(bytes, id)
        }
    }

    /// Resolve the full byte value, consulting the overflow store only when
    /// necessary.
    #[must_use]
    pub fn resolve<'a>(&'a self, read_overflow: impl FnOnce(u32) -> &'a [u8]) -> &'a [u8] {
        match &self.storage {
            Storage::Inline(buf) => &buf[..self.len as usize],
            Storage::Overflow(id) => read_overflow(*id),
        }
    }

    /// Append this key's page-serialized form to `buf` (spec §4.3 durability).
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.len.to_le_bytes());
        buf.extend_from_slice(&self.prefix);
        match &self.storage {
            Storage::Inline(bytes) => {
                buf.push(0);
                buf.extend_from_slice(bytes);
            }
            Storage::Overflow(id) => {
                buf.push(1);
                buf.extend_from_slice(&id.to_le_bytes());
            }
        }
    }

    /// Decode a key previously written by [`KuString::encode`], advancing
    /// `pos` past the bytes consumed.
    #[must_use]
    pub fn decode(bytes: &[u8], pos: &mut usize) -> Self {
        let len = u32::from_le_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
        *pos += 4;
        let mut prefix = [0_u8; PREFIX_LENGTH];
        prefix.copy_from_slice(&bytes[*pos..*pos + PREFIX_LENGTH]);
        *pos += PREFIX_LENGTH;
        let tag = bytes[*pos];
        *pos += 1;
        let storage = if tag == 0 {
            let mut inline = [0_u8; INLINE_CAPACITY];
            inline.copy_from_slice(&bytes[*pos..*pos + INLINE_CAPACITY]);
            *pos += INLINE_CAPACITY;
            Storage::Inline(inline)
        } else {
            let id = u32::from_le_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
            *pos += 4;
            Storage::Overflow(id)
        };
        KuString { len, prefix, storage }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_string_is_stored_inline() {
        let s = KuString::inline(b"alice");
        assert!(s.overflow_id().is_none());
        assert_eq!(s.resolve(|_| unreachable!()), b"alice");
    }

    #[test]
    fn prefix_equal_requires_matching_length() {
        let a = KuString::inline(b"alice");
        let b = KuString::inline(b"alicexx");
        assert!(!a.prefix_equal(&b));
    }

    #[test]
    fn prefix_equal_true_for_shared_prefix_and_length() {
        let a = KuString::inline(b"alice");
        let b = KuString::inline(b"alice");
        assert!(a.prefix_equal(&b));
    }
}
