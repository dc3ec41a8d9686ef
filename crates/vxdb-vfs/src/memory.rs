//! In-memory [`Vfs`] used throughout the test suite so pager/WAL/index tests
//! never touch a real filesystem.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use vxdb_error::Result;

use crate::traits::{Vfs, VfsFile};

#[derive(Default)]
pub struct MemoryVfs {
    files: Mutex<HashMap<String, Arc<Mutex<Vec<u8>>>>>,
}

impl MemoryVfs {
    #[must_use]
    pub fn new() -> Self {
        MemoryVfs::default()
    }
}

impl Vfs for MemoryVfs {
    type File = MemoryFile;

    fn open(&self, name: &str) -> Result<Self::File> {
        let mut files = self.files.lock();
        let data = files
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone();
        Ok(MemoryFile { data })
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.files.lock().remove(name);
        Ok(())
    }
}

pub struct MemoryFile {
    data: Arc<Mutex<Vec<u8>>>,
}

impl VfsFile for MemoryFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let data = self.data.lock();
        let start = offset as usize;
        if start >= data.len() {
            buf.fill(0);
            return Ok(());
        }
        let available = data.len() - start;
        let to_copy = available.min(buf.len());
        buf[..to_copy].copy_from_slice(&data[start..start + to_copy]);
        buf[to_copy..].fill(0);
        Ok(())
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        let mut data = self.data.lock();
        let start = offset as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.data.lock().len() as u64)
    }

    fn set_len(&self, len: u64) -> Result<()> {
        self.data.lock().resize(len as usize, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back_past_eof_zero_fills() {
        let vfs = MemoryVfs::new();
        let file = vfs.open("test.db").unwrap();
        file.write_at(&[1, 2, 3, 4], 0).unwrap();
        let mut buf = [0_u8; 8];
        file.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf, &[1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn files_are_independent() {
        let vfs = MemoryVfs::new();
        let a = vfs.open("a.db").unwrap();
        let b = vfs.open("b.db").unwrap();
        a.write_at(&[0xAA], 0).unwrap();
        let mut buf = [0_u8; 1];
        b.read_at(&mut buf, 0).unwrap();
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn reopen_same_name_shares_storage() {
        let vfs = MemoryVfs::new();
        {
            let f = vfs.open("shared.db").unwrap();
            f.write_at(&[7, 7], 0).unwrap();
        }
        let f2 = vfs.open("shared.db").unwrap();
        let mut buf = [0_u8; 2];
        f2.read_at(&mut buf, 0).unwrap();
        assert_eq!(buf, [7, 7]);
    }
}
