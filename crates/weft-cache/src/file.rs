//! File-based cache implementation.
//!
//! [`FileCache`] keeps every bucket and artifact store in its own
//! subdirectory of the cache root. Bucket entries carry a binary header
//! followed by the data:
//!
//! ```text
//! [etag_len: u32 LE][etag bytes][data bytes]
//! ```
//!
//! Artifacts are stored as raw bytes under their key, so a store directory
//! can be inspected with ordinary tools (an executed notebook is a plain
//! `.ipynb` file). Artifacts are written through a temporary file and
//! persisted without clobbering, which keeps them immutable once present.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use crate::{ArtifactStore, Cache, CacheBucket, CacheError};

/// File-based [`Cache`] rooted at a directory on disk.
///
/// Directory layout:
/// ```text
/// {root}/
/// +-- stamps/            # bucket "stamps"
/// |   +-- guide/intro.qmd
/// +-- notebooks/         # artifact store "notebooks"
///     +-- 3f2a….ipynb
/// ```
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Create a file-based cache at `root`.
    ///
    /// Directories are created lazily on first write.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Cache for FileCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        Box::new(FileCacheBucket {
            dir: self.root.join(name),
        })
    }

    fn artifacts(&self, name: &str) -> Box<dyn ArtifactStore> {
        Box::new(FileArtifactStore {
            dir: self.root.join(name),
        })
    }
}

/// A single etag bucket backed by a directory on disk.
struct FileCacheBucket {
    dir: PathBuf,
}

impl CacheBucket for FileCacheBucket {
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>> {
        let path = self.dir.join(key);
        let mut file = File::open(&path).ok()?;

        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf).ok()?;
        let etag_len = u32::from_le_bytes(len_buf) as usize;

        let mut stored_etag = vec![0u8; etag_len];
        file.read_exact(&mut stored_etag).ok()?;

        if !etag.is_empty() && stored_etag != etag.as_bytes() {
            return None;
        }

        let mut data = Vec::new();
        file.read_to_end(&mut data).ok()?;
        Some(data)
    }

    fn set(&self, key: &str, etag: &str, value: &[u8]) {
        let path = self.dir.join(key);
        let Some(parent) = path.parent() else {
            return;
        };
        if let Err(e) = fs::create_dir_all(parent) {
            tracing::warn!(path = %parent.display(), error = %e, "failed to create cache bucket directory");
            return;
        }

        let etag_bytes = etag.as_bytes();
        let Ok(etag_len) = u32::try_from(etag_bytes.len()) else {
            tracing::warn!(key, "cache etag too long, entry skipped");
            return;
        };
        let mut buf = Vec::with_capacity(4 + etag_bytes.len() + value.len());
        buf.extend_from_slice(&etag_len.to_le_bytes());
        buf.extend_from_slice(etag_bytes);
        buf.extend_from_slice(value);

        if let Err(e) = fs::write(&path, &buf) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write cache entry");
        }
    }
}

/// A write-once artifact store backed by a directory on disk.
struct FileArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore for FileArtifactStore {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.dir.join(key)).ok()
    }

    fn contains(&self, key: &str) -> bool {
        self.dir.join(key).is_file()
    }

    fn store(&self, key: &str, value: &[u8]) -> Result<bool, CacheError> {
        let path = self.dir.join(key);
        if path.exists() {
            return Ok(false);
        }
        let io_err = |source| CacheError::Io {
            path: path.clone(),
            source,
        };

        let parent = path.parent().unwrap_or(&self.dir);
        fs::create_dir_all(parent).map_err(io_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
        tmp.write_all(value).map_err(io_err)?;
        match tmp.persist_noclobber(&path) {
            Ok(_) => Ok(true),
            // Another writer got there first; its content is equivalent.
            Err(e) if path.exists() => {
                tracing::debug!(key, error = %e.error, "artifact already present");
                Ok(false)
            }
            Err(e) => Err(io_err(e.error)),
        }
    }
}
