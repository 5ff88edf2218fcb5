use serde::Serialize;
use serde::de::DeserializeOwned;

use threatwatch_types::{EngineError, Result};

/// Key-value preference storage. The engine only ever talks to this trait;
/// the storage medium behind it is a collaborator concern.
pub trait PreferenceStore: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<String>>;
    fn put_raw(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get_raw(key)?.is_some())
    }
}

/// Typed JSON accessors over any store.
pub trait PreferenceStoreExt: PreferenceStore {
    /// Read a value, falling back to `default` when the key is missing or
    /// the stored document does not parse. A corrupt entry is a recoverable
    /// condition, not an error.
    fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.get_raw(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(key, error = %err, "Stored preference does not parse, using default");
                    default
                }
            },
            Ok(None) => default,
            Err(err) => {
                tracing::warn!(key, error = %err, "Preference read failed, using default");
                default
            }
        }
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        self.put_raw(key, &raw)
    }
}

impl<S: PreferenceStore + ?Sized> PreferenceStoreExt for S {}
