//! Read-only NPY v1.0 row-batch reader (spec §6, §4.10): the sole concrete
//! external-format reader retained from the original system.

pub mod header;
pub mod reader;

pub use header::{parse_header, NpyHeader};
pub use reader::{NpyMultiFileReader, NpyReader};
