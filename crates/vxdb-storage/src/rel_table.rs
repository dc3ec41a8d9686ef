//! Relationship table mutation protocol (spec §4.5): two symmetric
//! directional stores, `fwd` and `bwd`, mutated in lockstep. Each direction
//! also re-serializes its full adjacency map into a page-backed blob through
//! [`vxdb_wal::PagedBlobStore`] after every mutation (spec §4.3 durability),
//! the same pattern the node column store and PK index use.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::instrument;
use vxdb_error::{Result, VxError};
use vxdb_pager::Pager;
use vxdb_types::{DbFileId, PageNumber, TableId, Value};
use vxdb_vfs::Vfs;
use vxdb_wal::{PageVersionTable, PagedBlobStore, Wal};

use crate::codec::{decode_value, encode_value};
use crate::stats::RelStats;

/// Which directional store to address.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    Fwd,
    Bwd,
}

impl Direction {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Direction::Fwd => Direction::Bwd,
            Direction::Bwd => Direction::Fwd,
        }
    }
}

#[derive(Clone, Debug)]
struct Edge {
    nbr: u64,
    rel_id: u64,
    props: Vec<Value>,
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> u32 {
    let v = u32::from_le_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> u64 {
    let v = u64::from_le_bytes(bytes[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    v
}

/// One directional adjacency store: CSR-like in spirit (one row per node).
#[derive(Default)]
pub struct RelTableData {
    rows: Mutex<HashMap<u64, Vec<Edge>>>,
}

impl RelTableData {
    #[must_use]
    pub fn new() -> Self {
        RelTableData::default()
    }

    fn insert(&self, node: u64, nbr: u64, rel_id: u64, props: Vec<Value>) {
        self.rows.lock().entry(node).or_default().push(Edge { nbr, rel_id, props });
    }

    fn update(&self, node: u64, rel_id: u64, props: Vec<Value>) -> bool {
        let mut rows = self.rows.lock();
        let Some(row) = rows.get_mut(&node) else { return false };
        if let Some(edge) = row.iter_mut().find(|e| e.rel_id == rel_id) {
            edge.props = props;
            true
        } else {
            false
        }
    }

    fn delete(&self, node: u64, rel_id: u64) -> bool {
        let mut rows = self.rows.lock();
        let Some(row) = rows.get_mut(&node) else { return false };
        let before = row.len();
        row.retain(|e| e.rel_id != rel_id);
        let removed = row.len() != before;
        if row.is_empty() {
            rows.remove(&node);
        }
        removed
    }

    /// Snapshot of `(nbr, rel_id)` pairs incident on `node`, for
    /// `detachDelete`'s CSR-style scan.
    #[must_use]
    pub fn incident(&self, node: u64) -> Vec<(u64, u64)> {
        self.rows
            .lock()
            .get(&node)
            .map(|row| row.iter().map(|e| (e.nbr, e.rel_id)).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn has_any(&self, node: u64) -> bool {
        self.rows.lock().get(&node).is_some_and(|row| !row.is_empty())
    }

    fn snapshot(&self) -> HashMap<u64, Vec<Edge>> {
        self.rows.lock().clone()
    }

    fn restore(&self, snapshot: HashMap<u64, Vec<Edge>>) {
        *self.rows.lock() = snapshot;
    }

    /// Total number of edges across every row, and the largest `rel_id`
    /// stored, if any — used to recover `RelTable`'s rel count and next-id
    /// counter when reopening from a persisted page image.
    fn totals(&self) -> (u64, Option<u64>) {
        let rows = self.rows.lock();
        let count = rows.values().map(|row| row.len() as u64).sum();
        let max_rel_id = rows.values().flatten().map(|e| e.rel_id).max();
        (count, max_rel_id)
    }

    /// Serialize every row's full state to its page-durable form (spec §4.3
    /// durability).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let rows = self.rows.lock();
        let mut buf = Vec::new();
        buf.extend_from_slice(&(rows.len() as u32).to_le_bytes());
        for (node, edges) in rows.iter() {
            buf.extend_from_slice(&node.to_le_bytes());
            buf.extend_from_slice(&(edges.len() as u32).to_le_bytes());
            for edge in edges {
                buf.extend_from_slice(&edge.nbr.to_le_bytes());
                buf.extend_from_slice(&edge.rel_id.to_le_bytes());
                buf.extend_from_slice(&(edge.props.len() as u32).to_le_bytes());
                for prop in &edge.props {
                    encode_value(&mut buf, prop);
                }
            }
        }
        buf
    }

    /// Decode data previously written by [`RelTableData::encode`]. `bytes`
    /// must be exactly what `encode` produced.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        let table = RelTableData::new();
        if bytes.is_empty() {
            return table;
        }
        let mut pos = 0_usize;
        let row_count = read_u32(bytes, &mut pos);
        let mut rows = table.rows.lock();
        for _ in 0..row_count {
            let node = read_u64(bytes, &mut pos);
            let edge_count = read_u32(bytes, &mut pos);
            let mut edges = Vec::with_capacity(edge_count as usize);
            for _ in 0..edge_count {
                let nbr = read_u64(bytes, &mut pos);
                let rel_id = read_u64(bytes, &mut pos);
                let prop_count = read_u32(bytes, &mut pos);
                let props = (0..prop_count).map(|_| decode_value(bytes, &mut pos)).collect();
                edges.push(Edge { nbr, rel_id, props });
            }
            rows.insert(node, edges);
        }
        drop(rows);
        table
    }
}

/// A relationship table: `fwd` keyed by src, `bwd` keyed by dst, mutated
/// together (spec §3 rel-table invariant).
pub struct RelTable<V: Vfs> {
    table_id: TableId,
    fwd: RelTableData,
    bwd: RelTableData,
    fwd_store: PagedBlobStore<V>,
    bwd_store: PagedBlobStore<V>,
    next_rel_id: Mutex<u64>,
    stats: Mutex<RelStats>,
    wal: Arc<Wal<V>>,
    /// Pre-transaction snapshot of `(fwd rows, bwd rows, rel count)`, taken
    /// lazily on the first mutation since the last checkpoint/rollback —
    /// mirrors the PK index's in-memory CoW rollback model (spec §4.1).
    snapshot: Mutex<Option<(HashMap<u64, Vec<Edge>>, HashMap<u64, Vec<Edge>>, u64)>>,
}

impl<V: Vfs> RelTable<V> {
    /// Allocate a fresh table: empty `fwd`/`bwd` directional stores, each
    /// backed by its own one-blob page store.
    pub fn create(
        table_id: TableId,
        db_pager: Arc<Pager<V>>,
        wal: Arc<Wal<V>>,
        version_table: Arc<PageVersionTable>,
        db_file_id: DbFileId,
    ) -> Result<Self> {
        let fwd_store =
            PagedBlobStore::create(Arc::clone(&db_pager), Arc::clone(&wal), Arc::clone(&version_table), db_file_id, 1)?;
        let bwd_store = PagedBlobStore::create(db_pager, Arc::clone(&wal), version_table, db_file_id, 1)?;
        let table = RelTable {
            table_id,
            fwd: RelTableData::new(),
            bwd: RelTableData::new(),
            fwd_store,
            bwd_store,
            next_rel_id: Mutex::new(0),
            stats: Mutex::new(RelStats::new()),
            wal,
            snapshot: Mutex::new(None),
        };
        table.persist()?;
        Ok(table)
    }

    /// Re-open a table whose directional stores' directory pages are
    /// `fwd_directory`/`bwd_directory`, recovering rows, rel count, and the
    /// next-rel-id counter from the decoded data.
    pub fn open(
        table_id: TableId,
        db_pager: Arc<Pager<V>>,
        wal: Arc<Wal<V>>,
        version_table: Arc<PageVersionTable>,
        db_file_id: DbFileId,
        fwd_directory: PageNumber,
        bwd_directory: PageNumber,
    ) -> Result<Self> {
        let fwd_store = PagedBlobStore::open(
            Arc::clone(&db_pager),
            Arc::clone(&wal),
            Arc::clone(&version_table),
            db_file_id,
            fwd_directory,
            1,
        )?;
        let bwd_store =
            PagedBlobStore::open(db_pager, Arc::clone(&wal), version_table, db_file_id, bwd_directory, 1)?;
        let fwd = RelTableData::decode(&fwd_store.read_blob(0)?);
        let bwd = RelTableData::decode(&bwd_store.read_blob(0)?);
        let (count, max_rel_id) = fwd.totals();
        let mut stats = RelStats::new();
        for _ in 0..count {
            stats.increment();
        }
        Ok(RelTable {
            table_id,
            fwd,
            bwd,
            fwd_store,
            bwd_store,
            next_rel_id: Mutex::new(max_rel_id.map_or(0, |id| id + 1)),
            stats: Mutex::new(stats),
            wal,
            snapshot: Mutex::new(None),
        })
    }

    fn persist(&self) -> Result<()> {
        self.fwd_store.write_blob(0, &self.fwd.encode())?;
        self.bwd_store.write_blob(0, &self.bwd.encode())
    }

    #[must_use]
    pub const fn table_id(&self) -> TableId {
        self.table_id
    }

    #[must_use]
    pub const fn fwd_directory(&self) -> PageNumber {
        self.fwd_store.directory_page()
    }

    #[must_use]
    pub const fn bwd_directory(&self) -> PageNumber {
        self.bwd_store.directory_page()
    }

    fn mark_dirty(&self) {
        let mut snapshot = self.snapshot.lock();
        if snapshot.is_none() {
            *snapshot = Some((self.fwd.snapshot(), self.bwd.snapshot(), self.stats.lock().count()));
        }
    }

    pub fn prepare_commit(&self) -> Result<()> {
        Ok(())
    }

    pub fn prepare_rollback(&self) -> Result<()> {
        Ok(())
    }

    pub fn checkpoint_in_memory(&self) {
        *self.snapshot.lock() = None;
    }

    pub fn rollback_in_memory(&self) {
        if let Some((fwd_snap, bwd_snap, count)) = self.snapshot.lock().take() {
            self.fwd.restore(fwd_snap);
            self.bwd.restore(bwd_snap);
            let mut stats = self.stats.lock();
            *stats = RelStats::new();
            for _ in 0..count {
                stats.increment();
            }
            let _ = self.persist();
        }
    }

    #[must_use]
    pub fn direction_store(&self, direction: Direction) -> &RelTableData {
        match direction {
            Direction::Fwd => &self.fwd,
            Direction::Bwd => &self.bwd,
        }
    }

    #[must_use]
    pub fn rel_count(&self) -> u64 {
        self.stats.lock().count()
    }

    /// `insert(src, dst, props)`: mirrored into both directional stores,
    /// then the rel count is incremented.
    #[instrument(skip(self, props))]
    pub fn insert(&self, src: u64, dst: u64, props: Vec<Value>) -> Result<u64> {
        self.mark_dirty();
        let rel_id = {
            let mut next = self.next_rel_id.lock();
            let id = *next;
            *next += 1;
            id
        };
        self.fwd.insert(src, dst, rel_id, props.clone());
        self.bwd.insert(dst, src, rel_id, props);
        self.stats.lock().increment();
        self.persist()?;
        self.wal.add_to_updated_tables(self.table_id);
        Ok(rel_id)
    }

    /// `update(rel_id, props)`, applied to both directions.
    pub fn update(&self, src: u64, dst: u64, rel_id: u64, props: Vec<Value>) -> Result<bool> {
        self.mark_dirty();
        let fwd_ok = self.fwd.update(src, rel_id, props.clone());
        let bwd_ok = self.bwd.update(dst, rel_id, props);
        self.persist()?;
        self.wal.add_to_updated_tables(self.table_id);
        Ok(fwd_ok && bwd_ok)
    }

    /// `delete_(src, dst, rel_id)`: the count is decremented only when both
    /// directional deletes agree (spec invariant: `fwd.delete == bwd.delete`).
    #[instrument(skip(self))]
    pub fn delete_(&self, src: u64, dst: u64, rel_id: u64) -> Result<bool> {
        self.mark_dirty();
        let fwd_deleted = self.fwd.delete(src, rel_id);
        let bwd_deleted = self.bwd.delete(dst, rel_id);
        if fwd_deleted != bwd_deleted {
            return Err(VxError::internal(format!(
                "fwd/bwd delete disagreement for rel {rel_id} (src={src}, dst={dst})"
            )));
        }
        if fwd_deleted {
            self.stats.lock().decrement_by(1);
        }
        self.persist()?;
        self.wal.add_to_updated_tables(self.table_id);
        Ok(fwd_deleted)
    }

    /// `detachDelete(direction, src)`: delete every edge incident on `src`
    /// in `direction`, through both directional stores, and return the
    /// number of edges deleted.
    #[instrument(skip(self))]
    pub fn detach_delete(&self, direction: Direction, node: u64) -> Result<u64> {
        let edges = self.direction_store(direction).incident(node);
        let mut deleted = 0_u64;
        for (nbr, rel_id) in edges {
            let (src, dst) = match direction {
                Direction::Fwd => (node, nbr),
                Direction::Bwd => (nbr, node),
            };
            if self.delete_(src, dst, rel_id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// `checkIfNodeHasRels(direction, src)`: nodes with live edges in this
    /// direction cannot be deleted without `detachDelete` first.
    pub fn check_if_node_has_rels(&self, direction: Direction, node: u64) -> Result<()> {
        if self.direction_store(direction).has_any(node) {
            return Err(VxError::NodeHasConnectedEdges {
                table_id: self.table_id.0,
                offset: node,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vxdb_types::{DbFileId as TestDbFileId, PageSize};
    use vxdb_vfs::MemoryVfs;

    fn test_rig() -> (Arc<Pager<MemoryVfs>>, Arc<Wal<MemoryVfs>>, Arc<PageVersionTable>) {
        let vfs = MemoryVfs::new();
        let db_pager = Arc::new(Pager::open(&vfs, "t.db", TestDbFileId(0), PageSize::DEFAULT).unwrap());
        let wal = Arc::new(Wal::open(&vfs, "t.wal", PageSize::DEFAULT).unwrap());
        (db_pager, wal, Arc::new(PageVersionTable::new()))
    }

    fn test_table() -> RelTable<MemoryVfs> {
        let (db_pager, wal, versions) = test_rig();
        RelTable::create(TableId(1), db_pager, wal, versions, TestDbFileId(1)).unwrap()
    }

    #[test]
    fn insert_is_mirrored_into_both_directions() {
        let table = test_table();
        table.insert(1, 2, vec![]).unwrap();
        assert_eq!(table.fwd.incident(1), vec![(2, 0)]);
        assert_eq!(table.bwd.incident(2), vec![(1, 0)]);
        assert_eq!(table.rel_count(), 1);
    }

    #[test]
    fn detach_delete_removes_all_incident_edges_both_ways() {
        let table = test_table();
        table.insert(1, 2, vec![]).unwrap();
        table.insert(1, 3, vec![]).unwrap();
        table.insert(1, 4, vec![]).unwrap();
        assert_eq!(table.rel_count(), 3);

        let deleted = table.detach_delete(Direction::Fwd, 1).unwrap();
        assert_eq!(deleted, 3);
        assert!(table.check_if_node_has_rels(Direction::Fwd, 1).is_ok());
        assert_eq!(table.rel_count(), 0);
        assert!(table.bwd.incident(2).is_empty());
        assert!(table.bwd.incident(3).is_empty());
        assert!(table.bwd.incident(4).is_empty());
    }

    #[test]
    fn check_if_node_has_rels_rejects_connected_node() {
        let table = test_table();
        table.insert(1, 2, vec![]).unwrap();
        let err = table.check_if_node_has_rels(Direction::Fwd, 1).unwrap_err();
        assert!(matches!(err, VxError::NodeHasConnectedEdges { .. }));
    }

    #[test]
    fn delete_decrements_count_only_when_both_sides_agree() {
        let table = test_table();
        table.insert(5, 6, vec![]).unwrap();
        assert!(table.delete_(5, 6, 0).unwrap());
        assert_eq!(table.rel_count(), 0);
        assert!(!table.delete_(5, 6, 0).unwrap(), "already gone from both sides");
    }

    #[test]
    fn edges_persist_through_the_directional_blobs() {
        let table = test_table();
        table.insert(1, 2, vec![Value::Int64(42)]).unwrap();
        let fwd = RelTableData::decode(&table.fwd_store.read_blob(0).unwrap());
        assert_eq!(fwd.incident(1), vec![(2, 0)]);
    }

    #[test]
    fn reopening_a_table_recovers_edges_and_next_rel_id() {
        let (db_pager, wal, versions) = test_rig();
        let (fwd_dir, bwd_dir) = {
            let table =
                RelTable::create(TableId(1), Arc::clone(&db_pager), Arc::clone(&wal), Arc::clone(&versions), TestDbFileId(1))
                    .unwrap();
            table.insert(1, 2, vec![Value::Int64(7)]).unwrap();
            table.insert(2, 3, vec![]).unwrap();
            (table.fwd_directory(), table.bwd_directory())
        };

        let reopened =
            RelTable::open(TableId(1), db_pager, wal, versions, TestDbFileId(1), fwd_dir, bwd_dir).unwrap();
        assert_eq!(reopened.rel_count(), 2);
        assert_eq!(reopened.fwd.incident(1), vec![(2, 0)]);
        let next_id = reopened.insert(3, 4, vec![]).unwrap();
        assert_eq!(next_id, 2, "next rel id continues past the highest recovered one");
    }
}
