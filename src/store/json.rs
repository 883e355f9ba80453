//! JSON file backed [`ConfigStore`].
//!
//! ```text
//! load ──► cached? ──yes──► clone
//!            │ no
//!            ├─ file missing ──► default document, written immediately
//!            └─ file present ──► parse
//! save ──► cache = doc ──► write <path>.tmp ──► rename over <path>
//! ```
//!
//! One async lock guards the cache and the file, so read-modify-write
//! helpers (`save_group`, `delete_group`, `save_settings`) never interleave.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::model::{GroupId, ProcessGroup};
use crate::store::document::{AppSettings, ConfigDocument};

const APP_DIR: &str = "procvisor";
const FILE_NAME: &str = "procvisor.json";

/// Persistence of the configuration document.
#[async_trait]
pub trait ConfigStore: Send + Sync + 'static {
    /// Returns the whole document, creating a default one when none exists.
    async fn load(&self) -> Result<ConfigDocument, StoreError>;

    /// Replaces the whole document.
    async fn save(&self, doc: ConfigDocument) -> Result<(), StoreError>;

    async fn groups(&self) -> Result<Vec<ProcessGroup>, StoreError> {
        Ok(self.load().await?.groups)
    }

    /// Inserts `group`, or replaces the stored group with the same id.
    async fn save_group(&self, group: ProcessGroup) -> Result<(), StoreError>;

    /// Removes the group with `id`; unknown ids are ignored.
    async fn delete_group(&self, id: GroupId) -> Result<(), StoreError>;

    async fn settings(&self) -> Result<AppSettings, StoreError> {
        Ok(self.load().await?.settings)
    }

    async fn save_settings(&self, settings: AppSettings) -> Result<(), StoreError>;
}

/// Stores the document as pretty-printed JSON in a single file.
pub struct JsonFileStore {
    path: PathBuf,
    cache: Mutex<Option<ConfigDocument>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Store at the platform configuration directory.
    pub fn at_default_location() -> Result<Self, StoreError> {
        Ok(Self::new(Self::default_path()?))
    }

    /// `<config dir>/procvisor/procvisor.json`.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let base = dirs::config_dir().ok_or(StoreError::NoConfigDir)?;
        Ok(base.join(APP_DIR).join(FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` on the cached document and persists the result.
    async fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ConfigDocument) + Send,
    {
        let mut cache = self.cache.lock().await;
        let mut doc = match cache.take() {
            Some(doc) => doc,
            None => self.read_or_create().await?,
        };
        f(&mut doc);
        let written = self.write(&doc).await;
        *cache = Some(doc);
        written
    }

    async fn read_or_create(&self) -> Result<ConfigDocument, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Format {
                path: self.path.clone(),
                source,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let doc = ConfigDocument::default();
                self.write(&doc).await?;
                tracing::info!(path = %self.path.display(), "created default configuration");
                Ok(doc)
            }
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn write(&self, doc: &ConfigDocument) -> Result<(), StoreError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(io_err(dir))?;
        }
        let json = serde_json::to_vec_pretty(doc).map_err(|source| StoreError::Format {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json).await.map_err(io_err(&tmp))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(io_err(&self.path))?;
        tracing::debug!(path = %self.path.display(), groups = doc.groups.len(), "configuration saved");
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn load(&self) -> Result<ConfigDocument, StoreError> {
        let mut cache = self.cache.lock().await;
        if let Some(doc) = cache.as_ref() {
            return Ok(doc.clone());
        }
        let doc = self.read_or_create().await?;
        *cache = Some(doc.clone());
        Ok(doc)
    }

    async fn save(&self, doc: ConfigDocument) -> Result<(), StoreError> {
        self.update(move |current| *current = doc).await
    }

    async fn save_group(&self, group: ProcessGroup) -> Result<(), StoreError> {
        self.update(move |doc| match doc.groups.iter_mut().find(|g| g.id == group.id) {
            Some(existing) => *existing = group,
            None => doc.groups.push(group),
        })
        .await
    }

    async fn delete_group(&self, id: GroupId) -> Result<(), StoreError> {
        self.update(move |doc| doc.groups.retain(|g| g.id != id)).await
    }

    async fn save_settings(&self, settings: AppSettings) -> Result<(), StoreError> {
        self.update(move |doc| doc.settings = settings).await
    }
}
