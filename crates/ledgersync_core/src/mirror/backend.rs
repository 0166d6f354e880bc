//! Byte stores that hold the mirror journal.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An append-only byte store for the journal.
///
/// Backends are opaque: they know nothing about record framing.
///
/// # Invariants
///
/// - `read_all` returns every byte previously appended and not truncated
/// - After `sync` returns, appended bytes survive process termination
/// - `replace` swaps the whole content atomically
pub trait JournalBackend: Send + Sync + std::fmt::Debug {
    /// Reads the whole journal.
    fn read_all(&self) -> CoreResult<Vec<u8>>;

    /// Appends bytes at the end.
    fn append(&mut self, data: &[u8]) -> CoreResult<()>;

    /// Makes appended bytes durable.
    fn sync(&mut self) -> CoreResult<()>;

    /// Drops everything after `len` bytes.
    fn truncate(&mut self, len: u64) -> CoreResult<()>;

    /// Replaces the whole content.
    fn replace(&mut self, data: &[u8]) -> CoreResult<()>;

    /// Current size in bytes.
    fn size(&self) -> CoreResult<u64>;
}

/// In-memory journal.
///
/// Clones share the same buffer, so a test can drop a store and reopen it
/// from a clone to simulate a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    data: Arc<Mutex<Vec<u8>>>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a journal holding `bytes`.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes)),
        }
    }

    /// Copy of the current content.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl JournalBackend for MemoryJournal {
    fn read_all(&self) -> CoreResult<Vec<u8>> {
        Ok(self.data.lock().clone())
    }

    fn append(&mut self, data: &[u8]) -> CoreResult<()> {
        self.data.lock().extend_from_slice(data);
        Ok(())
    }

    fn sync(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> CoreResult<()> {
        let len = usize::try_from(len)
            .map_err(|_| CoreError::journal_corruption("truncate length overflow"))?;
        self.data.lock().truncate(len);
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> CoreResult<()> {
        *self.data.lock() = data.to_vec();
        Ok(())
    }

    fn size(&self) -> CoreResult<u64> {
        Ok(self.data.lock().len() as u64)
    }
}

/// Journal in an OS file, held under an exclusive advisory lock.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: File,
}

impl FileJournal {
    /// Opens or creates the journal at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MirrorLocked`] if another process holds the lock.
    pub fn open(path: &Path) -> CoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = Self::open_locked(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn open_locked(path: &Path) -> CoreResult<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(CoreError::MirrorLocked);
        }
        Ok(file)
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JournalBackend for FileJournal {
    fn read_all(&self) -> CoreResult<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> CoreResult<()> {
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn sync(&mut self) -> CoreResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> CoreResult<()> {
        self.file.set_len(len)?;
        self.file.sync_all()?;
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> CoreResult<()> {
        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".compact");
        let tmp_path = PathBuf::from(tmp_path);

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(data)?;
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path)?;
        // The rename put a new inode at `path`; lock it before letting go of the old one.
        self.file = Self::open_locked(&self.path)?;
        Ok(())
    }

    fn size(&self) -> CoreResult<u64> {
        Ok(self.file.metadata()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_clones_share_content() {
        let mut a = MemoryJournal::new();
        let b = a.clone();
        a.append(b"abc").unwrap();
        assert_eq!(b.read_all().unwrap(), b"abc");
    }

    #[test]
    fn memory_truncate_and_replace() {
        let mut journal = MemoryJournal::from_bytes(b"abcdef".to_vec());
        journal.truncate(3).unwrap();
        assert_eq!(journal.bytes(), b"abc");
        journal.replace(b"xy").unwrap();
        assert_eq!(journal.size().unwrap(), 2);
    }

    #[test]
    fn file_append_read_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mirror.journal");
        {
            let mut journal = FileJournal::open(&path).unwrap();
            journal.append(b"hello ").unwrap();
            journal.append(b"world").unwrap();
            journal.sync().unwrap();
        }
        let journal = FileJournal::open(&path).unwrap();
        assert_eq!(journal.read_all().unwrap(), b"hello world");
        assert_eq!(journal.size().unwrap(), 11);
    }

    #[test]
    fn file_replace_keeps_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mirror.journal");
        let mut journal = FileJournal::open(&path).unwrap();
        journal.append(b"old content").unwrap();
        journal.replace(b"new").unwrap();
        assert_eq!(journal.read_all().unwrap(), b"new");
        assert!(matches!(FileJournal::open(&path), Err(CoreError::MirrorLocked)));
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("mirror.journal");
        let _held = FileJournal::open(&path).unwrap();
        assert!(matches!(FileJournal::open(&path), Err(CoreError::MirrorLocked)));
    }
}
