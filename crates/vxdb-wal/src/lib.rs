//! Write-ahead log and the page versioning layer built on top of it: the
//! engine's core mutation primitive (spec §4.1, §4.2).

pub mod paged_blob;
pub mod record;
pub mod versioning;
pub mod wal;

pub use paged_blob::PagedBlobStore;
pub use record::WalRecord;
pub use versioning::{
    get_writable_frame, insert_new_page, read_current, route_read, PageVersionTable, ReadRoute, WritableFrame,
};
pub use wal::Wal;

#[cfg(test)]
mod tests {
    use super::*;
    use vxdb_pager::Pager;
    use vxdb_types::{DbFileId, PageSize, TransactionMode};
    use vxdb_vfs::MemoryVfs;

    fn setup() -> (Pager<MemoryVfs>, Wal<MemoryVfs>, PageVersionTable) {
        let vfs = MemoryVfs::new();
        let db_pager = Pager::open(&vfs, "data.db", DbFileId(0), PageSize::DEFAULT).unwrap();
        let wal = Wal::open(&vfs, "data.wal", PageSize::DEFAULT).unwrap();
        (db_pager, wal, PageVersionTable::new())
    }

    #[test]
    fn writable_frame_seeds_from_original_page() {
        let (db_pager, wal, versions) = setup();
        let orig = db_pager.allocate_page().unwrap();
        let mut seed = vec![0_u8; PageSize::DEFAULT.as_usize()];
        seed[0] = 0x42;
        db_pager.write_page(orig, &seed).unwrap();

        let mut frame =
            get_writable_frame(&db_pager, &wal, &versions, DbFileId(0), orig, false).unwrap();
        assert_eq!(frame[0], 0x42);
        frame[1] = 0x99;
        drop(frame);

        let wal_idx = versions.get(orig).unwrap();
        let stored = wal.read_wal_page(wal_idx).unwrap();
        assert_eq!(stored.as_ref()[0], 0x42);
        assert_eq!(stored.as_ref()[1], 0x99);
    }

    #[test]
    fn second_get_writable_frame_reuses_existing_wal_image() {
        let (db_pager, wal, versions) = setup();
        let orig = db_pager.allocate_page().unwrap();

        let mut first =
            get_writable_frame(&db_pager, &wal, &versions, DbFileId(0), orig, true).unwrap();
        first[0] = 1;
        let wal_idx_first = first.wal_idx();
        drop(first);

        let second =
            get_writable_frame(&db_pager, &wal, &versions, DbFileId(0), orig, false).unwrap();
        assert_eq!(second.wal_idx(), wal_idx_first, "no second WAL image is allocated");
        assert_eq!(second[0], 1, "second frame observes the first frame's write");
    }

    #[test]
    fn read_only_transaction_routes_to_original_even_with_wal_image() {
        let (db_pager, wal, versions) = setup();
        let orig = db_pager.allocate_page().unwrap();
        let mut frame =
            get_writable_frame(&db_pager, &wal, &versions, DbFileId(0), orig, true).unwrap();
        frame[0] = 7;
        drop(frame);

        assert_eq!(
            route_read(&versions, orig, TransactionMode::ReadOnly),
            ReadRoute::Original(orig)
        );
        assert_eq!(
            route_read(&versions, orig, TransactionMode::Write),
            ReadRoute::Wal(versions.get(orig).unwrap())
        );
    }

    #[test]
    fn checkpoint_copies_wal_images_back_to_originals() {
        let (db_pager, wal, versions) = setup();
        let orig = db_pager.allocate_page().unwrap();
        let mut frame =
            get_writable_frame(&db_pager, &wal, &versions, DbFileId(0), orig, true).unwrap();
        frame[0] = 0xED;
        drop(frame);

        wal.flush().unwrap();
        let checkpointed = wal
            .checkpoint(&db_pager, |p| versions.get(p))
            .unwrap();
        assert_eq!(checkpointed, vec![(DbFileId(0), orig)]);
        for (_, page) in &checkpointed {
            versions.clear(*page);
        }

        let committed = db_pager.read_page(orig).unwrap();
        assert_eq!(committed.as_ref()[0], 0xED);
    }

    #[test]
    fn rollback_discards_wal_records_without_touching_original() {
        let (db_pager, wal, versions) = setup();
        let orig = db_pager.allocate_page().unwrap();
        db_pager.write_page(orig, &vec![0_u8; PageSize::DEFAULT.as_usize()]).unwrap();

        let mut frame =
            get_writable_frame(&db_pager, &wal, &versions, DbFileId(0), orig, false).unwrap();
        frame[0] = 0xFF;
        drop(frame);

        wal.rollback();
        versions.clear_all();

        let original = db_pager.read_page(orig).unwrap();
        assert_eq!(original.as_ref()[0], 0);
    }
}
