use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;

use crate::workflows::application::domain::DraftApplication;

/// Fixed key the draft is stored under before payment handoff.
pub const DRAFT_STORAGE_KEY: &str = "applicationFormData";

/// Durable client-held storage for the draft.
#[async_trait]
pub trait DraftStorage: Send + Sync {
    async fn save(&self, draft: &DraftApplication) -> Result<(), DraftStorageError>;
    async fn load(&self) -> Result<Option<DraftApplication>, DraftStorageError>;
    async fn clear(&self) -> Result<(), DraftStorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DraftStorageError {
    #[error("draft storage io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("draft could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("stored draft is unreadable: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("draft storage unavailable: {0}")]
    Unavailable(String),
}

/// Key/value files under a directory; the draft lives at `<dir>/applicationFormData.json`.
#[derive(Debug, Clone)]
pub struct FileDraftStorage {
    dir: PathBuf,
}

impl FileDraftStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{DRAFT_STORAGE_KEY}.json"))
    }
}

#[async_trait]
impl DraftStorage for FileDraftStorage {
    async fn save(&self, draft: &DraftApplication) -> Result<(), DraftStorageError> {
        let encoded = serde_json::to_vec_pretty(draft).map_err(DraftStorageError::Encode)?;
        fs::create_dir_all(&self.dir).await?;
        let target = self.path();
        let tmp = self.dir.join(format!(".{DRAFT_STORAGE_KEY}.json.tmp"));
        fs::write(&tmp, encoded).await?;
        fs::rename(&tmp, &target).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<DraftApplication>, DraftStorageError> {
        match fs::read(self.path()).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(DraftStorageError::Decode),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn clear(&self) -> Result<(), DraftStorageError> {
        match fs::remove_file(self.path()).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-process key/value storage holding the serialized draft.
#[derive(Debug, Default)]
pub struct MemoryDraftStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryDraftStorage {
    /// Raw stored value, as a browser's storage would expose it.
    pub fn raw(&self) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(DRAFT_STORAGE_KEY).cloned())
    }

    fn poisoned() -> DraftStorageError {
        DraftStorageError::Unavailable("draft map lock poisoned".to_string())
    }
}

#[async_trait]
impl DraftStorage for MemoryDraftStorage {
    async fn save(&self, draft: &DraftApplication) -> Result<(), DraftStorageError> {
        let encoded = serde_json::to_string(draft).map_err(DraftStorageError::Encode)?;
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries.insert(DRAFT_STORAGE_KEY.to_string(), encoded);
        Ok(())
    }

    async fn load(&self) -> Result<Option<DraftApplication>, DraftStorageError> {
        let entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries
            .get(DRAFT_STORAGE_KEY)
            .map(|raw| serde_json::from_str(raw).map_err(DraftStorageError::Decode))
            .transpose()
    }

    async fn clear(&self) -> Result<(), DraftStorageError> {
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries.remove(DRAFT_STORAGE_KEY);
        Ok(())
    }
}
