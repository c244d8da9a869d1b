//! Key/value persistence for the workspace.
//!
//! Every collection lives under one stable key as a single JSON document,
//! the same layout the browser client kept in local storage. Backends:
//! - `MemoryBackend` - process-local map, used by tests
//! - `FileBackend` - one `<key>.json` file per key in a data directory
//! - `MongoBackend` - one document per key in a MongoDB collection

mod file;
mod memory;
mod mongo;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use mongo::MongoBackend;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::StoreConfig;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("stored value under '{key}' is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

/// The keys the workspace mirrors into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreKey {
    CurrentUser,
    Impersonator,
    Messages,
    Team,
    Projects,
    Tasks,
    Documents,
    Notifications,
}

impl StoreKey {
    pub const ALL: [StoreKey; 8] = [
        StoreKey::CurrentUser,
        StoreKey::Impersonator,
        StoreKey::Messages,
        StoreKey::Team,
        StoreKey::Projects,
        StoreKey::Tasks,
        StoreKey::Documents,
        StoreKey::Notifications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::CurrentUser => "delimhub_user",
            StoreKey::Impersonator => "delimhub_impersonator",
            StoreKey::Messages => "delimhub_messages",
            StoreKey::Team => "delimhub_team",
            StoreKey::Projects => "delimhub_projects",
            StoreKey::Tasks => "delimhub_tasks",
            StoreKey::Documents => "delimhub_docs",
            StoreKey::Notifications => "delimhub_notifications",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub enum StoreBackend {
    Memory(MemoryBackend),
    File(FileBackend),
    Mongo(MongoBackend),
}

impl StoreBackend {
    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            StoreBackend::Memory(b) => Ok(b.get(key).await),
            StoreBackend::File(b) => b.get(key).await,
            StoreBackend::Mongo(b) => b.get(key).await,
        }
    }

    pub async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(b) => {
                b.put(key, value).await;
                Ok(())
            }
            StoreBackend::File(b) => b.put(key, &value).await,
            StoreBackend::Mongo(b) => b.put(key, value).await,
        }
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(b) => {
                b.remove(key).await;
                Ok(())
            }
            StoreBackend::File(b) => b.remove(key).await,
            StoreBackend::Mongo(b) => b.remove(key).await,
        }
    }

    pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
        match self {
            StoreBackend::Memory(b) => Ok(b.keys().await),
            StoreBackend::File(b) => b.keys().await,
            StoreBackend::Mongo(b) => b.keys().await,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            StoreBackend::Memory(_) => "memory".to_string(),
            StoreBackend::File(b) => format!("file:{}", b.dir().display()),
            StoreBackend::Mongo(b) => format!("mongo:{}", b.database_name()),
        }
    }
}

/// Typed front of a backend. Each write is stamped with a revision taken
/// from a monotonic millisecond clock; concurrent writers to the same key
/// resolve last-write-wins and subscribers use the revision to order
/// change events.
pub struct PersistedStore {
    backend: StoreBackend,
    revision: AtomicU64,
}

impl PersistedStore {
    pub fn new(backend: StoreBackend) -> Self {
        PersistedStore {
            backend,
            revision: AtomicU64::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(StoreBackend::Memory(MemoryBackend::default()))
    }

    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let backend = match config {
            StoreConfig::Memory => return Ok(Self::in_memory()),
            StoreConfig::File { dir } => StoreBackend::File(FileBackend::new(dir.clone())),
            StoreConfig::Mongo { uri, database } => {
                StoreBackend::Mongo(MongoBackend::init(uri, database).await?)
            }
        };
        Ok(Self::new(backend))
    }

    pub fn backend(&self) -> &StoreBackend {
        &self.backend
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    fn next_revision(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut current = self.revision.load(Ordering::SeqCst);
        loop {
            let next = now.max(current + 1);
            match self
                .revision
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// `Ok(None)` when nothing is stored under `key`.
    pub async fn load<T: DeserializeOwned>(&self, key: StoreKey) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.backend.get(key.as_str()).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            })
    }

    pub async fn save<T: Serialize + ?Sized>(&self, key: StoreKey, value: &T) -> Result<u64, StoreError> {
        let json = serde_json::to_string(value).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.save_raw(key, json).await
    }

    pub async fn save_raw(&self, key: StoreKey, json: String) -> Result<u64, StoreError> {
        debug!("Writing {} ({} bytes)", key, json.len());
        self.backend.put(key.as_str(), json).await?;
        Ok(self.next_revision())
    }

    pub async fn remove(&self, key: StoreKey) -> Result<u64, StoreError> {
        debug!("Removing {}", key);
        self.backend.remove(key.as_str()).await?;
        Ok(self.next_revision())
    }
}
