//! Versioned model registry
//!
//! Models are stored as `model_<version>` objects, written once. Which model
//! is current is recorded in an append-only `status.json` log; the last entry
//! naming an existing version wins, otherwise the highest version is current.

pub mod store;

use std::collections::BTreeMap;
use std::io;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::model::TrainedModel;
use crate::utils::logging::log_warning;

pub use store::{LocalObjectStore, MemoryObjectStore, ObjectStore};

/// Key prefix of stored models
pub const MODEL_PREFIX: &str = "model_";

/// Key of the status log
pub const STATUS_KEY: &str = "status.json";

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// An object with this key already exists
    #[error("object '{0}' already exists and will not be overwritten")]
    Overwrite(String),

    /// The requested model version is not stored
    #[error("model version {0} not found")]
    ModelNotFound(u32),

    /// The store holds no models
    #[error("no models found in the registry")]
    NoModelsFound,

    /// A key that is not a single path component
    #[error("invalid object key '{0}'")]
    InvalidKey(String),

    /// No version number follows the highest stored one
    #[error("no model version is left after {0}")]
    VersionsExhausted(u32),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialisation error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// One entry of the status log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub current_version: u32,
    pub timestamp: NaiveDateTime,
}

/// Model versions and current-model selection over an [`ObjectStore`]
#[derive(Debug)]
pub struct ModelRegistry<S> {
    store: S,
}

impl<S: ObjectStore> ModelRegistry<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Object key of a model version
    #[must_use]
    pub fn model_key(version: u32) -> String {
        format!("{MODEL_PREFIX}{version}")
    }

    /// Stored versions and their keys
    ///
    /// Keys with the model prefix but no numeric suffix are ignored.
    pub fn list_models(&self) -> Result<BTreeMap<u32, String>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter_map(|key| {
                let version = key.strip_prefix(MODEL_PREFIX)?.parse().ok()?;
                Some((version, key))
            })
            .collect())
    }

    /// Store model bytes under `version`, or the next free version when `None`
    ///
    /// Versions start at 1. An existing version fails with
    /// [`RegistryError::Overwrite`] and leaves the stored model untouched.
    pub fn save_model(&self, bytes: &[u8], version: Option<u32>) -> Result<u32> {
        let version = match version {
            Some(version) => version,
            None => match self.list_models()?.last_key_value() {
                Some((&highest, _)) => highest
                    .checked_add(1)
                    .ok_or(RegistryError::VersionsExhausted(highest))?,
                None => 1,
            },
        };
        self.store.put_new(&Self::model_key(version), bytes)?;
        log::info!("Saved model version {version} ({} bytes)", bytes.len());
        Ok(version)
    }

    /// Serialise and store a trained model
    pub fn save_trained(&self, model: &TrainedModel, version: Option<u32>) -> Result<u32> {
        self.save_model(&serde_json::to_vec(model)?, version)
    }

    /// The status log; a missing log is empty, an unreadable one is logged
    /// and treated as empty
    pub fn status(&self) -> Result<Vec<StatusEntry>> {
        let Some(bytes) = self.store.get(STATUS_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_slice(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                log_warning(&format!("unreadable, treating as empty: {e}"), Some(STATUS_KEY));
                Ok(Vec::new())
            }
        }
    }

    /// Make `version` current by appending to the status log
    pub fn set_current(&self, version: u32) -> Result<StatusEntry> {
        if !self.list_models()?.contains_key(&version) {
            return Err(RegistryError::ModelNotFound(version));
        }
        let entry = StatusEntry {
            current_version: version,
            timestamp: Local::now().naive_local(),
        };
        let mut entries = self.status()?;
        entries.push(entry.clone());
        self.store.put(STATUS_KEY, &serde_json::to_vec_pretty(&entries)?)?;
        log::info!("Current model set to version {version}");
        Ok(entry)
    }

    /// Version of the current model
    pub fn current_version(&self) -> Result<u32> {
        let models = self.list_models()?;
        let Some((&highest, _)) = models.last_key_value() else {
            return Err(RegistryError::NoModelsFound);
        };

        match self.status()?.last() {
            Some(entry) if models.contains_key(&entry.current_version) => {
                Ok(entry.current_version)
            }
            Some(entry) => {
                log_warning(
                    &format!(
                        "status names missing version {}, using highest version {highest}",
                        entry.current_version
                    ),
                    Some(STATUS_KEY),
                );
                Ok(highest)
            }
            None => Ok(highest),
        }
    }

    /// Bytes of one stored model
    pub fn load_model(&self, version: u32) -> Result<Vec<u8>> {
        self.store
            .get(&Self::model_key(version))?
            .ok_or(RegistryError::ModelNotFound(version))
    }

    /// Version and bytes of the current model
    pub fn load_current(&self) -> Result<(u32, Vec<u8>)> {
        let version = self.current_version()?;
        Ok((version, self.load_model(version)?))
    }

    /// Version and deserialised current model
    pub fn load_current_model(&self) -> Result<(u32, TrainedModel)> {
        let (version, bytes) = self.load_current()?;
        Ok((version, serde_json::from_slice(&bytes)?))
    }
}
