use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::reconcile::{DocumentInventory, InventoryEntry};
use super::{
    validate_locator, DocumentStore, ResolvedDocument, StorageError, StoredObject, UploadedFile,
};

#[derive(Debug, Clone)]
struct MemoryObject {
    bytes: Vec<u8>,
    content_type: String,
    stored_at: DateTime<Utc>,
}

/// In-process store for demos and tests.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    objects: Mutex<BTreeMap<String, MemoryObject>>,
}

impl MemoryDocumentStore {
    pub fn locators(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Seed an object with an explicit timestamp.
    pub fn insert_at(&self, locator: &str, bytes: Vec<u8>, stored_at: DateTime<Utc>) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(
                locator.to_string(),
                MemoryObject {
                    bytes,
                    content_type: mime::APPLICATION_OCTET_STREAM.to_string(),
                    stored_at,
                },
            );
        }
    }

    fn poisoned() -> StorageError {
        StorageError::Backend("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put(&self, key: &str, file: &UploadedFile) -> Result<StoredObject, StorageError> {
        validate_locator(key)?;
        let content_type = file
            .content_type
            .clone()
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
        let mut objects = self.objects.lock().map_err(|_| Self::poisoned())?;
        if objects.contains_key(key) {
            return Err(StorageError::Backend(format!("object {key} already exists")));
        }
        objects.insert(
            key.to_string(),
            MemoryObject {
                bytes: file.bytes.clone(),
                content_type: content_type.clone(),
                stored_at: Utc::now(),
            },
        );
        Ok(StoredObject {
            locator: key.to_string(),
            size: file.bytes.len() as u64,
            content_type: Some(content_type),
        })
    }

    async fn resolve(&self, locator: &str) -> Result<ResolvedDocument, StorageError> {
        let objects = self.objects.lock().map_err(|_| Self::poisoned())?;
        let object = objects
            .get(locator)
            .ok_or_else(|| StorageError::NotFound(locator.to_string()))?;
        Ok(ResolvedDocument::Inline {
            bytes: object.bytes.clone(),
            content_type: object.content_type.clone(),
        })
    }
}

#[async_trait]
impl DocumentInventory for MemoryDocumentStore {
    async fn list(&self, prefix: &str) -> Result<Vec<InventoryEntry>, StorageError> {
        let objects = self.objects.lock().map_err(|_| Self::poisoned())?;
        Ok(objects
            .iter()
            .filter(|(locator, _)| locator.starts_with(prefix))
            .map(|(locator, object)| InventoryEntry {
                locator: locator.clone(),
                created_at: Some(object.stored_at),
                size: Some(object.bytes.len() as u64),
            })
            .collect())
    }

    async fn delete(&self, locator: &str) -> Result<(), StorageError> {
        let mut objects = self.objects.lock().map_err(|_| Self::poisoned())?;
        objects
            .remove(locator)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(locator.to_string()))
    }
}
