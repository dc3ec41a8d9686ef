//! One of the 256 independently-routed partitions of the index.

use crate::entry::{Entry, Key};
use crate::header::{DEFAULT_HT_LOAD_FACTOR, ShardHeader};
use crate::ku_string::KuString;
use crate::slot::Slot;

/// All in-memory state for one shard: routing header, primary slots,
/// overflow-slot pool, and the byte store backing out-of-line `KuString`
/// values. Authoritative for lookup/insert/delete; see `DESIGN.md` for why
/// this stays an in-memory struct rather than a page-backed byte layout.
#[derive(Clone, Debug)]
pub struct Shard {
    pub header: ShardHeader,
    pub primary: Vec<Slot>,
    pub overflow: Vec<Slot>,
    free_overflow: Vec<u32>,
    overflow_bytes: Vec<Vec<u8>>,
}

impl Shard {
    #[must_use]
    pub fn new() -> Self {
        Shard {
            header: ShardHeader::new(),
            primary: vec![Slot::empty()],
            overflow: Vec::new(),
            free_overflow: Vec::new(),
            overflow_bytes: Vec::new(),
        }
    }

    fn alloc_overflow_bytes(&mut self, bytes: &[u8]) -> u32 {
        self.overflow_bytes.push(bytes.to_vec());
        (self.overflow_bytes.len() - 1) as u32
    }

    /// Build a `Key` for `bytes`, allocating an overflow slot in this shard
    /// if the string exceeds the inline capacity.
    #[must_use]
    pub fn intern_string_key(&mut self, bytes: &[u8]) -> Key {
        if bytes.len() <= crate::ku_string::INLINE_CAPACITY {
            Key::Str(KuString::inline(bytes))
        } else {
            let id = self.alloc_overflow_bytes(bytes);
            Key::Str(KuString::overflow(bytes, id))
        }
    }

    fn keys_equal(&self, a: &Key, b_bytes: &[u8]) -> bool {
        match a {
            Key::Int64(v) => {
                b_bytes.len() == 8 && *v == i64::from_le_bytes(b_bytes.try_into().unwrap())
            }
            Key::Str(s) => s.resolve(|id| &self.overflow_bytes[id as usize]) == b_bytes,
        }
    }

    fn fingerprint_and_low_bits(hash: u64) -> (u8, u64) {
        let fingerprint = ((hash >> 48) & 0xFF) as u8;
        let low_bits = hash & 0x0000_FFFF_FFFF_FFFF;
        (fingerprint, low_bits)
    }

    /// Lookup by full key bytes (the bytes a comparison needs, not the
    /// routing hash). `hash` has already had its top 8 bits consumed to pick
    /// this shard.
    #[must_use]
    pub fn lookup(&self, hash: u64, key_bytes: &[u8]) -> Option<u64> {
        let (fingerprint, low_bits) = Self::fingerprint_and_low_bits(hash);
        let slot_id = self.header.slot_for(low_bits);
        let mut slot = self.primary.get(slot_id as usize)?;
        loop {
            for entry in slot.entries.iter().flatten() {
                if entry.tombstoned || entry.fingerprint != fingerprint {
                    continue;
                }
                if self.keys_equal(&entry.key, key_bytes) {
                    return Some(entry.offset);
                }
            }
            match slot.overflow {
                Some(next) => slot = &self.overflow[next as usize],
                None => return None,
            }
        }
    }

    /// Insert `(key, offset)`. Returns `false` (without mutating state) if
    /// the key is already present.
    pub fn insert(&mut self, hash: u64, key: Key, key_bytes: &[u8], offset: u64) -> bool {
        if self.lookup(hash, key_bytes).is_some() {
            return false;
        }
        let (fingerprint, low_bits) = Self::fingerprint_and_low_bits(hash);
        let slot_id = self.header.slot_for(low_bits) as usize;
        self.place(slot_id, Entry::live(fingerprint, key, offset));
        self.header.count += 1;
        if self.header.load_factor() > DEFAULT_HT_LOAD_FACTOR {
            self.split();
        }
        true
    }

    fn place(&mut self, primary_slot_id: usize, entry: Entry) {
        let mut cur = primary_slot_id;
        loop {
            let is_primary = cur == primary_slot_id;
            let slot = if is_primary {
                &mut self.primary[cur]
            } else {
                &mut self.overflow[cur]
            };
            if let Some(idx) = slot.free_index() {
                slot.entries[idx] = Some(entry);
                return;
            }
            match slot.overflow {
                Some(next) => cur = next as usize,
                None => {
                    let new_id = self.alloc_overflow_slot();
                    let slot = if is_primary {
                        &mut self.primary[primary_slot_id]
                    } else {
                        &mut self.overflow[cur]
                    };
                    slot.overflow = Some(new_id);
                    cur = new_id as usize;
                }
            }
        }
    }

    fn alloc_overflow_slot(&mut self) -> u32 {
        if let Some(id) = self.free_overflow.pop() {
            self.overflow[id as usize] = Slot::empty();
            id
        } else {
            self.overflow.push(Slot::empty());
            (self.overflow.len() - 1) as u32
        }
    }

    /// Tombstone the entry for `key_bytes`, if present.
    pub fn delete(&mut self, hash: u64, key_bytes: &[u8]) -> bool {
        if self.lookup(hash, key_bytes).is_none() {
            return false;
        }
        let (fingerprint, low_bits) = Self::fingerprint_and_low_bits(hash);
        let slot_id = self.header.slot_for(low_bits);
        let mut cur = slot_id as usize;
        let mut in_primary = true;
        loop {
            let slot = if in_primary {
                &self.primary[cur]
            } else {
                &self.overflow[cur]
            };
            let mut found = None;
            for (idx, entry) in slot.entries.iter().enumerate() {
                let Some(entry) = entry else { continue };
                if !entry.tombstoned
                    && entry.fingerprint == fingerprint
                    && self.keys_equal(&entry.key, key_bytes)
                {
                    found = Some(idx);
                    break;
                }
            }
            if let Some(idx) = found {
                let slot = if in_primary {
                    &mut self.primary[cur]
                } else {
                    &mut self.overflow[cur]
                };
                slot.entries[idx].as_mut().unwrap().tombstoned = true;
                self.header.count = self.header.count.saturating_sub(1);
                return true;
            }
            match slot.overflow {
                Some(id) => {
                    cur = id as usize;
                    in_primary = false;
                }
                None => return false,
            }
        }
    }

    /// Rehash all entries in the slot pointed to by `next_split_slot_id`
    /// across the old slot and its newly-created sibling, per spec §4.3.
    fn split(&mut self) {
        let split_id = self.header.next_split_slot_id as usize;
        let new_mask = self.header.level_hash_mask | (self.header.level_hash_mask + 1);
        let sibling_id = self.primary.len();
        self.primary.push(Slot::empty());

        let mut chain = Vec::new();
        let mut cur = Some(split_id);
        let mut in_primary = true;
        while let Some(idx) = cur {
            let slot = if in_primary {
                self.primary[idx].clone()
            } else {
                self.overflow[idx].clone()
            };
            for entry in slot.entries.into_iter().flatten() {
                if !entry.tombstoned {
                    chain.push(entry);
                }
            }
            cur = slot.overflow.map(|id| id as usize);
            in_primary = false;
        }
        self.primary[split_id] = Slot::empty();

        for entry in chain {
            let low_bits = match &entry.key {
                Key::Int64(v) => {
                    let (_, low) = Self::fingerprint_and_low_bits(xxhash_rust::xxh3::xxh3_64(
                        &v.to_le_bytes(),
                    ));
                    low
                }
                Key::Str(s) => {
                    let bytes = s.resolve(|id| &self.overflow_bytes[id as usize]).to_vec();
                    let (_, low) =
                        Self::fingerprint_and_low_bits(xxhash_rust::xxh3::xxh3_64(&bytes));
                    low
                }
            };
            let target = if (low_bits & new_mask) == low_bits & self.header.level_hash_mask {
                split_id
            } else {
                sibling_id
            };
            self.place(target, entry);
        }

        self.header.advance_split();
    }

    /// Serialize this shard's full state (header, primary/overflow slots,
    /// free-overflow list, overflow byte store) to its page-durable form
    /// (spec §4.3 durability, §6 reserved shard pages).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.header.level_hash_mask.to_le_bytes());
        buf.extend_from_slice(&self.header.higher_level_hash_mask.to_le_bytes());
        buf.extend_from_slice(&self.header.next_split_slot_id.to_le_bytes());
        buf.extend_from_slice(&self.header.num_primary_slots.to_le_bytes());
        buf.extend_from_slice(&self.header.count.to_le_bytes());

        buf.extend_from_slice(&(self.primary.len() as u32).to_le_bytes());
        for slot in &self.primary {
            slot.encode(&mut buf);
        }

        buf.extend_from_slice(&(self.overflow.len() as u32).to_le_bytes());
        for slot in &self.overflow {
            slot.encode(&mut buf);
        }

        buf.extend_from_slice(&(self.free_overflow.len() as u32).to_le_bytes());
        for id in &self.free_overflow {
            buf.extend_from_slice(&id.to_le_bytes());
        }

        buf.extend_from_slice(&(self.overflow_bytes.len() as u32).to_le_bytes());
        for bytes in &self.overflow_bytes {
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(bytes);
        }
        buf
    }

    /// Decode a shard previously written by [`Shard::encode`]. `bytes` must
    /// be exactly what `encode` produced (no trailing padding).
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        let mut pos = 0_usize;
        let header = ShardHeader {
            level_hash_mask: read_u64(bytes, &mut pos),
            higher_level_hash_mask: read_u64(bytes, &mut pos),
            next_split_slot_id: read_u64(bytes, &mut pos),
            num_primary_slots: read_u64(bytes, &mut pos),
            count: read_u64(bytes, &mut pos),
        };

        let primary_len = read_u32(bytes, &mut pos) as usize;
        let primary = (0..primary_len).map(|_| Slot::decode(bytes, &mut pos)).collect();

        let overflow_len = read_u32(bytes, &mut pos) as usize;
        let overflow = (0..overflow_len).map(|_| Slot::decode(bytes, &mut pos)).collect();

        let free_len = read_u32(bytes, &mut pos) as usize;
        let free_overflow = (0..free_len).map(|_| read_u32(bytes, &mut pos)).collect();

        let overflow_bytes_len = read_u32(bytes, &mut pos) as usize;
        let mut overflow_bytes = Vec::with_capacity(overflow_bytes_len);
        for _ in 0..overflow_bytes_len {
            let len = read_u32(bytes, &mut pos) as usize;
            overflow_bytes.push(bytes[pos..pos + len].to_vec());
            pos += len;
        }

        Shard {
            header,
            primary,
            overflow,
            free_overflow,
            overflow_bytes,
        }
    }
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> u64 {
    let v = u64::from_le_bytes(bytes[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    v
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> u32 {
    let v = u32::from_le_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

impl Default for Shard {
    fn default() -> Self {
        Shard::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_int(v: i64) -> u64 {
        xxhash_rust::xxh3::xxh3_64(&v.to_le_bytes())
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let mut shard = Shard::new();
        let h = hash_int(42);
        let bytes = 42_i64.to_le_bytes();
        assert!(shard.insert(h, Key::Int64(42), &bytes, 100));
        assert_eq!(shard.lookup(h, &bytes), Some(100));
    }

    #[test]
    fn duplicate_insert_returns_false() {
        let mut shard = Shard::new();
        let h = hash_int(7);
        let bytes = 7_i64.to_le_bytes();
        assert!(shard.insert(h, Key::Int64(7), &bytes, 1));
        assert!(!shard.insert(h, Key::Int64(7), &bytes, 2));
    }

    #[test]
    fn delete_makes_key_unfindable() {
        let mut shard = Shard::new();
        let h = hash_int(9);
        let bytes = 9_i64.to_le_bytes();
        shard.insert(h, Key::Int64(9), &bytes, 5);
        assert!(shard.delete(h, &bytes));
        assert_eq!(shard.lookup(h, &bytes), None);
    }

    #[test]
    fn split_preserves_all_lookups() {
        let mut shard = Shard::new();
        for i in 0..64_i64 {
            let h = hash_int(i);
            let bytes = i.to_le_bytes();
            shard.insert(h, Key::Int64(i), &bytes, i as u64 * 10);
        }
        for i in 0..64_i64 {
            let h = hash_int(i);
            let bytes = i.to_le_bytes();
            assert_eq!(shard.lookup(h, &bytes), Some(i as u64 * 10));
        }
        assert!(shard.primary.len() > 1, "load factor should have triggered a split");
    }

    #[test]
    fn encode_decode_round_trips_a_shard_with_an_overflow_string_key() {
        let mut shard = Shard::new();
        let long_key = b"a string long enough to need overflow storage";
        let key = shard.intern_string_key(long_key);
        let h = xxhash_rust::xxh3::xxh3_64(long_key);
        shard.insert(h, key, long_key, 77);

        let decoded = Shard::decode(&shard.encode());
        assert_eq!(decoded.lookup(h, long_key), Some(77));
        assert_eq!(decoded.header.count, shard.header.count);
    }

    #[test]
    fn delete_only_tombstones_the_matching_overflow_string_key() {
        let mut shard = Shard::new();
        let a = b"first long overflow-backed string key value";
        let b = b"second long overflow-backed string key value";
        let key_a = shard.intern_string_key(a);
        let key_b = shard.intern_string_key(b);
        let ha = xxhash_rust::xxh3::xxh3_64(a);
        let hb = xxhash_rust::xxh3::xxh3_64(b);
        shard.insert(ha, key_a, a, 1);
        shard.insert(hb, key_b, b, 2);

        assert!(shard.delete(ha, a));
        assert_eq!(shard.lookup(ha, a), None);
        assert_eq!(shard.lookup(hb, b), Some(2), "deleting one overflow key must not remove the other");
    }
}
