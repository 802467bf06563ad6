//! Address-based storage backends
//!
//! The store addresses its backing medium like a small flash part: reads
//! and writes at absolute offsets, no structure. [`FileBackend`] maps this
//! onto a regular file; [`MemoryBackend`] keeps everything in a `Vec` for
//! non-persistent accessories and tests.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::rc::Rc;

/// Raw random-access medium under the persistent store
pub trait StorageBackend {
    /// Read `buf.len()` bytes starting at `address`
    ///
    /// # Errors
    ///
    /// Returns an error if the range is not fully readable.
    fn read(&mut self, address: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Write `data` starting at `address`, extending the medium if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be completed.
    fn write(&mut self, address: u64, data: &[u8]) -> io::Result<()>;
}

/// File-backed storage
pub struct FileBackend {
    file: File,
}

impl FileBackend {
    /// Open or create the backing file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened read-write.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { file })
    }
}

impl StorageBackend for FileBackend {
    fn read(&mut self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(address))?;
        self.file.read_exact(buf)
    }

    fn write(&mut self, address: u64, data: &[u8]) -> io::Result<()> {
        if self.file.metadata()?.len() < address {
            // Gap writes land on zero bytes, as on an erased flash page
            self.file.set_len(address)?;
        }
        self.file.seek(SeekFrom::Start(address))?;
        self.file.write_all(data)?;
        self.file.flush()
    }
}

/// In-memory storage
///
/// Handles share one medium: cloning yields another view of the same
/// bytes, which lets tests snapshot state "across a reboot".
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    data: Rc<RefCell<Vec<u8>>>,
}

impl MemoryBackend {
    /// Create an empty medium
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a previous [`MemoryBackend::snapshot`]
    #[must_use]
    pub fn from_snapshot(data: Vec<u8>) -> Self {
        Self {
            data: Rc::new(RefCell::new(data)),
        }
    }

    /// Copy of the raw medium contents
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&mut self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        let data = self.data.borrow();
        let start = usize::try_from(address).map_err(|_| io::ErrorKind::InvalidInput)?;
        let end = start + buf.len();
        if end > data.len() {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write(&mut self, address: u64, data: &[u8]) -> io::Result<()> {
        let mut medium = self.data.borrow_mut();
        let start = usize::try_from(address).map_err(|_| io::ErrorKind::InvalidInput)?;
        let end = start + data.len();
        if end > medium.len() {
            medium.resize(end, 0);
        }
        medium[start..end].copy_from_slice(data);
        Ok(())
    }
}
