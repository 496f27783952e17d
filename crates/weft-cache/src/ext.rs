//! JSON convenience methods for artifact stores.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{ArtifactStore, CacheError};

/// JSON convenience methods for [`ArtifactStore`].
///
/// # Example
///
/// ```
/// use weft_cache::{ArtifactStoreExt, Cache, NullCache};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Run { outputs: Vec<String> }
///
/// let store = NullCache.artifacts("runs");
/// store.store_json("abc", &Run { outputs: vec![] }).unwrap();
/// let run: Option<Run> = store.load_json("abc");
/// assert!(run.is_none());
/// ```
pub trait ArtifactStoreExt: ArtifactStore {
    /// Load and deserialize a JSON artifact.
    ///
    /// A corrupt artifact is treated as absent and logged.
    fn load_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.load(key)?;
        serde_json::from_slice(&bytes)
            .inspect_err(|e| tracing::warn!(key, error = %e, "ignoring unreadable cache artifact"))
            .ok()
    }

    /// Serialize `value` as JSON and store it unless the key exists.
    fn store_json<T: Serialize>(&self, key: &str, value: &T) -> Result<bool, CacheError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| CacheError::Serialize {
            key: key.to_owned(),
            message: e.to_string(),
        })?;
        self.store(key, &bytes)
    }
}

impl<S: ArtifactStore + ?Sized> ArtifactStoreExt for S {}
