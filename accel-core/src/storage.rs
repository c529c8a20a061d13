//! # Weight Storage
//!
//! Persists the classifier weights under one fixed key.
//!
//! | Backend        | Where                                  | Selected when              |
//! |----------------|----------------------------------------|----------------------------|
//! | `FileStore`    | `<data_dir>/interaction_weights.json`  | native, `data_dir` set     |
//! | `BrowserStore` | `window.localStorage`                  | `wasm` feature, in browser |
//! | `MemoryStore`  | process memory                         | otherwise                  |
//!
//! Failures are reported to the learner, which falls back to defaults on
//! read and logs on write. Nothing here is fatal.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;

use crate::config::BridgeConfig;
use crate::error::StorageResult;
use crate::learner::Weights;

/// Key (and file stem) the weights are stored under.
pub const WEIGHTS_KEY: &str = "interaction_weights";

/// Durable home for classifier weights.
#[async_trait(?Send)]
pub trait WeightStore: std::fmt::Debug {
    /// Read the stored weights; `Ok(None)` when nothing is stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read or parsed.
    async fn load(&self) -> StorageResult<Option<Weights>>;

    /// Replace the stored weights.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn save(&self, weights: &Weights) -> StorageResult<()>;
}

/// In-process key-value store. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored record, if any.
    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.records.borrow().get(WEIGHTS_KEY).cloned()
    }

    /// Overwrite the raw record.
    pub fn put_raw(&self, record: impl Into<String>) {
        self.records
            .borrow_mut()
            .insert(WEIGHTS_KEY.to_string(), record.into());
    }
}

#[async_trait(?Send)]
impl WeightStore for MemoryStore {
    async fn load(&self) -> StorageResult<Option<Weights>> {
        self.raw()
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(Into::into)
    }

    fn save(&self, weights: &Weights) -> StorageResult<()> {
        self.put_raw(serde_json::to_string(weights)?);
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStore;

#[cfg(not(target_arch = "wasm32"))]
mod file {
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;

    use super::{WeightStore, WEIGHTS_KEY};
    use crate::error::StorageResult;
    use crate::learner::Weights;

    /// JSON file in a data directory.
    ///
    /// Reads and writes are blocking `std::fs` calls on a small file, so
    /// loading works under any executor.
    #[derive(Debug, Clone)]
    pub struct FileStore {
        path: PathBuf,
    }

    impl FileStore {
        /// Store weights in `dir`.
        #[must_use]
        pub fn new(dir: impl AsRef<Path>) -> Self {
            Self {
                path: dir.as_ref().join(format!("{WEIGHTS_KEY}.json")),
            }
        }

        /// Path of the weights file.
        #[must_use]
        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    #[async_trait(?Send)]
    impl WeightStore for FileStore {
        async fn load(&self) -> StorageResult<Option<Weights>> {
            match std::fs::read_to_string(&self.path) {
                Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        }

        fn save(&self, weights: &Weights) -> StorageResult<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.path, serde_json::to_vec_pretty(weights)?)?;
            tracing::debug!("Saved classifier weights to {}", self.path.display());
            Ok(())
        }
    }
}

#[cfg(feature = "wasm")]
pub use browser::BrowserStore;

#[cfg(feature = "wasm")]
mod browser {
    use async_trait::async_trait;

    use super::{WeightStore, WEIGHTS_KEY};
    use crate::error::{StorageError, StorageResult};
    use crate::learner::Weights;

    /// `window.localStorage` in the browser.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct BrowserStore;

    impl BrowserStore {
        /// Whether local storage is reachable from this context.
        #[must_use]
        pub fn is_available() -> bool {
            Self::storage().is_ok()
        }

        fn storage() -> StorageResult<web_sys::Storage> {
            web_sys::window()
                .ok_or_else(|| StorageError::Unavailable("no window".to_string()))?
                .local_storage()
                .ok()
                .flatten()
                .ok_or_else(|| StorageError::Unavailable("localStorage disabled".to_string()))
        }
    }

    #[async_trait(?Send)]
    impl WeightStore for BrowserStore {
        async fn load(&self) -> StorageResult<Option<Weights>> {
            let raw = Self::storage()?
                .get_item(WEIGHTS_KEY)
                .map_err(|_| StorageError::Unavailable("localStorage read rejected".to_string()))?;
            raw.map(|raw| serde_json::from_str(&raw))
                .transpose()
                .map_err(Into::into)
        }

        fn save(&self, weights: &Weights) -> StorageResult<()> {
            let raw = serde_json::to_string(weights)?;
            Self::storage()?
                .set_item(WEIGHTS_KEY, &raw)
                .map_err(|_| StorageError::Unavailable("localStorage write rejected".to_string()))
        }
    }
}

/// Pick the weight store this environment supports.
#[must_use]
pub fn select_store(config: &BridgeConfig) -> Box<dyn WeightStore> {
    if let Some(store) = file_store(config) {
        return store;
    }
    if let Some(store) = browser_store() {
        return store;
    }
    tracing::debug!("Using in-memory weight store");
    Box::new(MemoryStore::new())
}

#[cfg(not(target_arch = "wasm32"))]
fn file_store(config: &BridgeConfig) -> Option<Box<dyn WeightStore>> {
    let dir = config.data_dir.as_ref()?;
    tracing::debug!("Using file weight store in {}", dir.display());
    Some(Box::new(FileStore::new(dir)))
}

#[cfg(target_arch = "wasm32")]
fn file_store(_config: &BridgeConfig) -> Option<Box<dyn WeightStore>> {
    None
}

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
fn browser_store() -> Option<Box<dyn WeightStore>> {
    BrowserStore::is_available().then(|| {
        tracing::debug!("Using browser weight store");
        Box::new(BrowserStore) as Box<dyn WeightStore>
    })
}

#[cfg(not(all(feature = "wasm", target_arch = "wasm32")))]
fn browser_store() -> Option<Box<dyn WeightStore>> {
    None
}
