//! Typed access to the persisted user preferences.
//!
//! Malformed persisted data is treated as absent: readers log and fall back
//! to defaults instead of failing startup.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Units;
use crate::error::StorageError;
use crate::storage::KeyValueStore;

pub const UNITS_KEY: &str = "temperatureUnit";
pub const FAVORITES_KEY: &str = "favorites";
pub const SESSION_KEY: &str = "user";

/// Preference accessors over a shared key-value store.
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for Preferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preferences").finish_non_exhaustive()
    }
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Saved unit preference, or `default` when absent or unreadable.
    pub fn units(&self, default: Units) -> Units {
        match self.store.get(UNITS_KEY) {
            Ok(Some(raw)) => Units::parse(&raw).unwrap_or_else(|| {
                tracing::warn!("Ignoring unknown unit preference {:?}", raw);
                default
            }),
            Ok(None) => default,
            Err(e) => {
                tracing::warn!("Failed to load unit preference: {}", e);
                default
            }
        }
    }

    pub fn set_units(&self, units: Units) -> Result<(), StorageError> {
        self.store.set(UNITS_KEY, units.as_str())
    }

    /// Saved favorites in insertion order; empty when absent or malformed.
    pub fn favorites(&self) -> Vec<String> {
        match self.load_json::<Vec<String>>(FAVORITES_KEY) {
            Ok(Some(favorites)) => favorites,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Discarding saved favorites: {}", e);
                Vec::new()
            }
        }
    }

    pub fn set_favorites(&self, favorites: &[String]) -> Result<(), StorageError> {
        self.save_json(FAVORITES_KEY, &favorites)
    }

    /// Deserialize a JSON value stored under `key`.
    ///
    /// Returns `StorageError::Parse` when the stored text is not valid for `T`;
    /// callers decide whether that means "absent".
    pub fn load_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::Parse {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    pub fn save_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value).map_err(|e| StorageError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.store.set(key, &json)
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.store.remove(key)
    }
}
