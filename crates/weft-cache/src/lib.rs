//! Persistent caches for weft builds.
//!
//! Two storage shapes are provided, both rooted under one cache directory:
//!
//! - [`CacheBucket`]: key-value entries validated by an etag. Used for render
//!   stamps, where the value under a key is expected to change over time.
//! - [`ArtifactStore`]: write-once, content-addressed artifacts. The key *is*
//!   the content identity (for example an execution hash chain), so an entry
//!   is never overwritten and never evicted.
//!
//! # Implementations
//!
//! - [`NullCache`]: No-op implementation (always misses, discards writes)
//! - [`FileCache`]: Directory-per-bucket implementation on disk
//!
//! # Example
//!
//! ```
//! use weft_cache::{Cache, NullCache};
//!
//! let cache = NullCache;
//! let bucket = cache.bucket("stamps");
//! bucket.set("intro.qmd", "v1", b"stamp");
//! assert_eq!(bucket.get("intro.qmd", "v1"), None); // NullCache always misses
//! ```

mod ext;
mod file;

use std::path::PathBuf;

pub use ext::ArtifactStoreExt;
pub use file::FileCache;

/// Error raised when an artifact cannot be persisted.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// I/O failure while writing an artifact.
    #[error("failed to write cache artifact {}: {source}", path.display())]
    Io {
        /// Path of the artifact being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Artifact could not be serialized.
    #[error("failed to serialize cache artifact {key}: {message}")]
    Serialize {
        /// Artifact key.
        key: String,
        /// Serializer message.
        message: String,
    },
}

/// A named partition of etag-validated entries.
///
/// The etag is an opaque string chosen by the caller (a content hash, an option
/// fingerprint). A hit requires both the key and the etag to match.
pub trait CacheBucket: Send + Sync {
    /// Retrieve a cached value.
    ///
    /// Returns `Some(value)` if the key exists **and** was stored with the same
    /// `etag`. An empty `etag` skips validation.
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>>;

    /// Store a value, replacing any previous entry for the key.
    ///
    /// Failures are logged and swallowed; a lost stamp only costs a rebuild.
    fn set(&self, key: &str, etag: &str, value: &[u8]);
}

/// Write-once store of content-addressed artifacts.
///
/// Keys are expected to be derived from the artifact's inputs, so two writes
/// under the same key always carry equivalent content. The first write wins
/// and later writes are ignored.
pub trait ArtifactStore: Send + Sync {
    /// Load an artifact by key.
    fn load(&self, key: &str) -> Option<Vec<u8>>;

    /// Whether an artifact exists for `key`.
    fn contains(&self, key: &str) -> bool {
        self.load(key).is_some()
    }

    /// Persist an artifact unless one already exists under `key`.
    ///
    /// Returns `true` when the artifact was written, `false` when an entry was
    /// already present.
    fn store(&self, key: &str, value: &[u8]) -> Result<bool, CacheError>;
}

/// Factory for named buckets and artifact stores.
pub trait Cache: Send + Sync {
    /// Open or create a named etag bucket.
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket>;

    /// Open or create a named artifact store.
    fn artifacts(&self, name: &str) -> Box<dyn ArtifactStore>;
}

/// No-op [`CacheBucket`] and [`ArtifactStore`].
pub struct NullCacheBucket;

impl CacheBucket for NullCacheBucket {
    fn get(&self, _key: &str, _etag: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _etag: &str, _value: &[u8]) {}
}

impl ArtifactStore for NullCacheBucket {
    fn load(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn store(&self, _key: &str, _value: &[u8]) -> Result<bool, CacheError> {
        Ok(false)
    }
}

/// No-op [`Cache`] used when caching is disabled.
pub struct NullCache;

impl Cache for NullCache {
    fn bucket(&self, _name: &str) -> Box<dyn CacheBucket> {
        Box::new(NullCacheBucket)
    }

    fn artifacts(&self, _name: &str) -> Box<dyn ArtifactStore> {
        Box::new(NullCacheBucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_cache_always_misses() {
        let cache = NullCache;
        let bucket = cache.bucket("stamps");

        assert_eq!(bucket.get("key", "etag1"), None);

        bucket.set("key", "etag1", b"hello");
        assert_eq!(bucket.get("key", "etag1"), None);
    }

    #[test]
    fn test_null_artifacts_never_store() {
        let cache = NullCache;
        let store = cache.artifacts("notebooks");

        assert!(!store.store("abc.ipynb", b"{}").unwrap());
        assert!(!store.contains("abc.ipynb"));
        assert_eq!(store.load("abc.ipynb"), None);
    }
}
