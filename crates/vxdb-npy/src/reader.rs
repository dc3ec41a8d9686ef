//! Row-batch readers over NPY files (spec §6, §4.10).

use vxdb_error::{Result, VxError};
use vxdb_types::{LogicalTypeID, Value, ValueVector, DEFAULT_VECTOR_CAPACITY};

use crate::header::{parse_header, NpyHeader};

fn decode_row(bytes: &[u8], logical_type: LogicalTypeID) -> Value {
    match logical_type {
        LogicalTypeID::Int16 => Value::Int16(i16::from_le_bytes(bytes.try_into().unwrap())),
        LogicalTypeID::Int32 => Value::Int32(i32::from_le_bytes(bytes.try_into().unwrap())),
        LogicalTypeID::Int64 => Value::Int64(i64::from_le_bytes(bytes.try_into().unwrap())),
        LogicalTypeID::Float => Value::Float(f32::from_le_bytes(bytes.try_into().unwrap())),
        LogicalTypeID::Double => Value::Double(f64::from_le_bytes(bytes.try_into().unwrap())),
        _ => unreachable!("dtype_to_logical_type only ever returns numeric scalar types"),
    }
}

/// A single-column NPY reader. Reads the whole file into memory up front —
/// column files produced by the surrounding compiler are expected to fit,
/// matching the source's own NPY reader contract (a memory-mapped,
/// random-access column file, not a stream).
pub struct NpyReader {
    header: NpyHeader,
    bytes: Vec<u8>,
}

impl NpyReader {
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        let header = parse_header(&bytes)?;
        let width = header
            .logical_type
            .fixed_width()
            .expect("NPY dtypes are always fixed-width scalars");
        let required = header.data_offset + header.row_count() * width;
        if bytes.len() < required {
            return Err(VxError::malformed("file shorter than shape implies"));
        }
        Ok(NpyReader { header, bytes })
    }

    #[must_use]
    pub const fn logical_type(&self) -> LogicalTypeID {
        self.header.logical_type
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.header.row_count()
    }

    /// Read rows `[start, end)` into one `ValueVector`, batching at most
    /// `DEFAULT_VECTOR_CAPACITY` rows at a time per spec §6.
    pub fn read_range(&self, start: usize, end: usize) -> Result<ValueVector> {
        if end < start || end > self.row_count() {
            return Err(VxError::OutOfRange {
                what: "npy row range",
                value: i64::try_from(end).unwrap_or(i64::MAX),
            });
        }
        if end - start > DEFAULT_VECTOR_CAPACITY {
            return Err(VxError::OutOfRange {
                what: "npy row batch size",
                value: i64::try_from(end - start).unwrap_or(i64::MAX),
            });
        }
        let width = self.header.logical_type.fixed_width().unwrap();
        let mut values = Vec::with_capacity(end - start);
        for row in start..end {
            let offset = self.header.data_offset + row * width;
            values.push(decode_row(&self.bytes[offset..offset + width], self.header.logical_type));
        }
        Ok(ValueVector::with_values(self.header.logical_type, values))
    }
}

/// Composes N single-column NPY files sharing a common row count into one
/// logical multi-column source (spec §4.10, ambient supplement).
pub struct NpyMultiFileReader {
    columns: Vec<NpyReader>,
    row_count: usize,
}

impl NpyMultiFileReader {
    pub fn open(column_files: Vec<Vec<u8>>) -> Result<Self> {
        let columns: Vec<NpyReader> = column_files
            .into_iter()
            .map(NpyReader::open)
            .collect::<Result<_>>()?;
        let Some(first) = columns.first() else {
            return Err(VxError::malformed("no column files given"));
        };
        let row_count = first.row_count();
        for (i, col) in columns.iter().enumerate().skip(1) {
            if col.row_count() != row_count {
                return Err(VxError::malformed(format!(
                    "column {i} has {} rows but column 0 has {row_count}",
                    col.row_count()
                )));
            }
        }
        Ok(NpyMultiFileReader { columns, row_count })
    }

    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.row_count
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Read `[start, end)` from every underlying column, returning one
    /// `ValueVector` per column.
    pub fn read_range(&self, start: usize, end: usize) -> Result<Vec<ValueVector>> {
        self.columns.iter().map(|c| c.read_range(start, end)).collect()
    }
}
