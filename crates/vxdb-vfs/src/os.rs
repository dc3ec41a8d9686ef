//! Real-filesystem [`Vfs`] implementation backed by positional `pread`/`pwrite`.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use parking_lot::Mutex;
use vxdb_error::{Result, VxError};

use crate::traits::{Vfs, VfsFile};

/// Opens real files rooted at a base directory.
pub struct OsVfs {
    root: PathBuf,
}

impl OsVfs {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        OsVfs { root: root.into() }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Vfs for OsVfs {
    type File = OsFile;

    fn open(&self, name: &str) -> Result<Self::File> {
        let path = self.resolve(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok(OsFile {
            file: Mutex::new(file),
        })
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.resolve(name);
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A real file handle. Positional reads/writes are serialised behind a
/// mutex: `pread`/`pwrite` themselves are thread-safe at the OS level, but
/// `std::fs::File`'s safe API only exposes cursor-relative `Read`/`Write`, so
/// the mutex protects the temporary cursor sought by the fallback path on
/// platforms without `nix`.
pub struct OsFile {
    file: Mutex<File>,
}

impl VfsFile for OsFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::fd::AsFd;
            let file = self.file.lock();
            let mut filled = 0usize;
            while filled < buf.len() {
                match nix::sys::uio::pread(file.as_fd(), &mut buf[filled..], offset as i64 + filled as i64) {
                    Ok(0) => {
                        buf[filled..].fill(0);
                        break;
                    }
                    Ok(n) => filled += n,
                    Err(e) => return Err(VxError::Io(std::io::Error::from(e))),
                }
            }
            Ok(())
        }
        #[cfg(not(unix))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            match file.read_exact(buf) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    buf.fill(0);
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::fd::AsFd;
            let file = self.file.lock();
            let mut written = 0usize;
            while written < buf.len() {
                let n = nix::sys::uio::pwrite(file.as_fd(), &buf[written..], offset as i64 + written as i64)
                    .map_err(|e| VxError::Io(std::io::Error::from(e)))?;
                written += n;
            }
            Ok(())
        }
        #[cfg(not(unix))]
        {
            use std::io::{Seek, SeekFrom, Write};
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(buf)?;
            Ok(())
        }
    }

    fn sync(&self) -> Result<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    fn set_len(&self, len: u64) -> Result<()> {
        self.file.lock().set_len(len)?;
        Ok(())
    }
}
