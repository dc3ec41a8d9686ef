//! Bulk-loading a node table's property columns from NPY files (spec §4.10
//! "NPY ingestion"): the one place the mutation core and the external NPY
//! reader meet.

use std::path::Path;

use vxdb_error::{Result, VxError};
use vxdb_npy::NpyMultiFileReader;
use vxdb_storage::NodeTable;
use vxdb_types::{InternalId, LogicalTypeID, Value, ValueVector, DEFAULT_VECTOR_CAPACITY};
use vxdb_vfs::Vfs;

/// Read every `column_files` path into memory and open them as one aligned
/// multi-column NPY source (spec §4.10). Column files are host filesystem
/// artifacts produced ahead of time by an external loader, not pager-backed
/// pages, so this reads through `std::fs` rather than the `Vfs` trait.
pub fn open_npy_columns(column_files: &[impl AsRef<Path>]) -> Result<NpyMultiFileReader> {
    let bytes = column_files
        .iter()
        .map(|p| std::fs::read(p).map_err(VxError::from))
        .collect::<Result<Vec<_>>>()?;
    NpyMultiFileReader::open(bytes)
}

/// Stream every row out of `reader`'s aligned column files and insert them
/// into `table` in `DEFAULT_VECTOR_CAPACITY`-sized batches, returning the
/// total number of rows inserted.
///
/// `reader`'s column order must match `table`'s property column order; this
/// is the caller's responsibility to arrange (spec §4.10 leaves column
/// binding to the embedding application, matching the C++ source's
/// `copyFromNPY` path).
pub fn load_node_table_from_npy<V: Vfs>(table: &NodeTable<V>, reader: &NpyMultiFileReader) -> Result<u64> {
    let row_count = reader.row_count();
    let mut loaded = 0_u64;
    let mut start = 0_usize;
    while start < row_count {
        let end = (start + DEFAULT_VECTOR_CAPACITY).min(row_count);
        let columns = reader.read_range(start, end)?;
        let batch_len = end - start;
        let node_id_values = (0..batch_len)
            .map(|_| Value::InternalId(InternalId::new(0, 0)))
            .collect();
        let mut node_id_vector = ValueVector::with_values(LogicalTypeID::InternalId, node_id_values);
        table.insert(&mut node_id_vector, &columns)?;
        loaded += batch_len as u64;
        start = end;
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;
    use vxdb_pager::Pager;
    use vxdb_types::{DbFileId, PageSize, TableId};
    use vxdb_vfs::MemoryVfs;
    use vxdb_wal::{PageVersionTable, Wal};

    fn write_int64_npy(path: &Path, values: &[i64]) {
        let dict = format!("{{'descr': '<i8', 'fortran_order': False, 'shape': ({},), }}", values.len());
        let mut header = dict.into_bytes();
        header.push(b'\n');
        let total_preamble = 10 + header.len();
        let pad = (64 - total_preamble % 64) % 64;
        header.extend(std::iter::repeat(b' ').take(pad));
        if let Some(last) = header.last_mut() {
            *last = b'\n';
        }
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(b"\x93NUMPY").unwrap();
        file.write_all(&[1, 0]).unwrap();
        file.write_all(&(header.len() as u16).to_le_bytes()).unwrap();
        file.write_all(&header).unwrap();
        for v in values {
            file.write_all(&v.to_le_bytes()).unwrap();
        }
    }

    #[test]
    fn loads_every_row_from_an_npy_column_into_a_node_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("age.npy");
        write_int64_npy(&path, &[10, 20, 30]);

        let reader = open_npy_columns(&[&path]).unwrap();
        let vfs = MemoryVfs::new();
        let db_pager = Arc::new(Pager::open(&vfs, "t.db", DbFileId(0), PageSize::DEFAULT).unwrap());
        let wal = Arc::new(Wal::open(&vfs, "t.wal", PageSize::DEFAULT).unwrap());
        let table = NodeTable::create(
            TableId(0),
            vec![LogicalTypeID::Int64],
            None,
            db_pager,
            wal,
            Arc::new(PageVersionTable::new()),
            DbFileId(0),
        )
        .unwrap();

        let loaded = load_node_table_from_npy(&table, &reader).unwrap();
        assert_eq!(loaded, 3);
    }
}
