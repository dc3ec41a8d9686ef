//! Virtual filesystem abstraction layer: the file-I/O boundary underneath
//! the pager and WAL.

pub mod memory;
pub mod os;
pub mod traits;

pub use memory::{MemoryFile, MemoryVfs};
pub use os::{OsFile, OsVfs};
pub use traits::{Vfs, VfsFile};
