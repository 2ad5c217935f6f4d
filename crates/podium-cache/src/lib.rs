//! On-disk key→blob store for compiled artifacts.
//!
//! Entries live as flat files in one folder. Reads refresh the file's
//! modification time, and a worker thread evicts the oldest files once
//! the count passes the configured ceiling, so the folder behaves as an
//! LRU cache across processes. All I/O errors are swallowed: callers
//! see a store that silently does nothing, or a miss.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use podium_core::worker::TaskWorker;

const FILE_PREFIX: &str = "cmajor_cache_";

struct CacheInner {
    folder: PathBuf,
    max_files: usize,
    lock: Mutex<()>,
}

/// A file-per-key cache with mtime-ordered eviction.
pub struct FileCacheStore {
    inner: Arc<CacheInner>,
    purge_worker: TaskWorker,
}

impl FileCacheStore {
    /// `folder` must already exist; `max_files` is the eviction ceiling.
    pub fn new(folder: impl Into<PathBuf>, max_files: usize) -> Self {
        let inner = Arc::new(CacheInner {
            folder: folder.into(),
            max_files,
            lock: Mutex::new(()),
        });

        let purge_inner = Arc::clone(&inner);
        let purge_worker = TaskWorker::start("podium-cache-purge", None, move || {
            purge_inner.remove_old_files();
        });

        Self {
            inner,
            purge_worker,
        }
    }

    /// Atomically replace the entry for `key`, then schedule a purge.
    pub fn store(&self, key: &str, data: &[u8]) {
        {
            let _guard = self.inner.lock.lock();
            if let Err(error) = self.inner.write_entry(key, data) {
                tracing::debug!("cache store for '{key}' failed: {error}");
            }
        }

        self.purge_worker.trigger();
    }

    /// Read the entry for `key`.
    ///
    /// Returns 0 on a miss. With `dest` absent or too small, returns the
    /// entry size without writing anything, so callers can size a buffer
    /// and call again. A successful read refreshes the entry's
    /// modification time and returns the number of bytes written.
    pub fn reload(&self, key: &str, dest: Option<&mut [u8]>) -> u64 {
        let _guard = self.inner.lock.lock();
        self.inner.read_entry(key, dest).unwrap_or(0)
    }
}

impl CacheInner {
    fn cache_file(&self, key: &str) -> PathBuf {
        self.folder.join(format!("{FILE_PREFIX}{key}"))
    }

    fn write_entry(&self, key: &str, data: &[u8]) -> std::io::Result<()> {
        // Write-then-rename keeps readers from ever seeing a torn entry.
        // The temporary name must not match the purge prefix.
        let temporary = self.folder.join(format!(".{FILE_PREFIX}{key}.part"));
        fs::write(&temporary, data)?;
        fs::rename(&temporary, self.cache_file(key))
    }

    fn read_entry(&self, key: &str, dest: Option<&mut [u8]>) -> std::io::Result<u64> {
        let path = self.cache_file(key);
        let size = fs::metadata(&path)?.len();

        if size == 0 {
            return Ok(0);
        }

        let dest = match dest {
            Some(buffer) if buffer.len() as u64 >= size => buffer,
            _ => return Ok(size),
        };

        let mut file = fs::OpenOptions::new().read(true).write(true).open(&path)?;
        file.read_exact(&mut dest[..size as usize])?;

        // Write one byte past the end and truncate it away again: a
        // portable modification-time refresh.
        file.seek(SeekFrom::End(0))?;
        file.write_all(&[0])?;
        file.flush()?;
        file.set_len(size)?;

        Ok(size)
    }

    fn remove_old_files(&self) {
        let _guard = self.lock.lock();

        let entries = match fs::read_dir(&self.folder) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        let mut files: Vec<(PathBuf, SystemTime)> = Vec::new();

        for entry in entries.flatten() {
            let path = entry.path();
            let is_cache_file = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(FILE_PREFIX));
            if !is_cache_file {
                continue;
            }

            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                files.push((path, modified));
            }
        }

        if files.len() <= self.max_files {
            return;
        }

        files.sort_by_key(|&(_, modified)| modified);
        let excess = files.len() - self.max_files;

        for (path, _) in files.into_iter().take(excess) {
            if let Err(error) = fs::remove_file(&path) {
                tracing::debug!("cache purge could not remove {}: {error}", path.display());
            }
        }
    }
}
