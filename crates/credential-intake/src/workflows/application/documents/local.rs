use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use super::reconcile::{DocumentInventory, InventoryEntry};
use super::{
    validate_locator, DocumentStore, ResolvedDocument, StorageError, StoredObject, UploadedFile,
};

const BLOBS_DIR: &str = "blobs";
const OBJECTS_DIR: &str = "objects";
const SIDECAR_SUFFIX: &str = ".json";

/// Content-addressed directory store.
///
/// Bytes live once under `blobs/<sha256>`; each key gets a JSON sidecar under
/// `objects/<key>.json` pointing at its blob. Resolution is always inline.
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectMeta {
    key: String,
    digest: String,
    name: String,
    content_type: String,
    size: u64,
    stored_at: DateTime<Utc>,
}

impl LocalDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, digest: &str) -> PathBuf {
        self.root.join(BLOBS_DIR).join(digest)
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.root
            .join(OBJECTS_DIR)
            .join(format!("{key}{SIDECAR_SUFFIX}"))
    }

    async fn read_meta(&self, key: &str) -> Result<ObjectMeta, StorageError> {
        let raw = match fs::read(self.sidecar_path(key)).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&raw)
            .map_err(|err| StorageError::Backend(format!("corrupt sidecar for {key}: {err}")))
    }

    async fn all_meta(&self) -> Result<Vec<ObjectMeta>, StorageError> {
        let objects_root = self.root.join(OBJECTS_DIR);
        let mut pending = vec![objects_root];
        let mut found = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !path.to_string_lossy().ends_with(SIDECAR_SUFFIX) {
                    continue;
                }
                let raw = fs::read(&path).await?;
                match serde_json::from_slice::<ObjectMeta>(&raw) {
                    Ok(meta) => found.push(meta),
                    Err(err) => debug!(path = %path.display(), error = %err, "skipping unreadable sidecar"),
                }
            }
        }

        Ok(found)
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

pub(super) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn put(&self, key: &str, file: &UploadedFile) -> Result<StoredObject, StorageError> {
        validate_locator(key)?;
        if fs::try_exists(self.sidecar_path(key)).await? {
            return Err(StorageError::Backend(format!("object {key} already exists")));
        }

        let digest = sha256_hex(&file.bytes);
        let blob = self.blob_path(&digest);
        if !fs::try_exists(&blob).await? {
            write_atomic(&blob, &file.bytes).await?;
        }

        let content_type = file
            .content_type
            .clone()
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
        let meta = ObjectMeta {
            key: key.to_string(),
            digest,
            name: file.name.clone(),
            content_type: content_type.clone(),
            size: file.bytes.len() as u64,
            stored_at: Utc::now(),
        };
        let encoded = serde_json::to_vec_pretty(&meta)
            .map_err(|err| StorageError::Backend(err.to_string()))?;
        write_atomic(&self.sidecar_path(key), &encoded).await?;

        Ok(StoredObject {
            locator: key.to_string(),
            size: meta.size,
            content_type: Some(content_type),
        })
    }

    async fn resolve(&self, locator: &str) -> Result<ResolvedDocument, StorageError> {
        validate_locator(locator)?;
        let meta = self.read_meta(locator).await?;
        let bytes = match fs::read(self.blob_path(&meta.digest)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(locator.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        if sha256_hex(&bytes) != meta.digest {
            return Err(StorageError::Backend(format!(
                "content digest mismatch for {locator}"
            )));
        }
        Ok(ResolvedDocument::Inline {
            bytes,
            content_type: meta.content_type,
        })
    }
}

#[async_trait]
impl DocumentInventory for LocalDocumentStore {
    async fn list(&self, prefix: &str) -> Result<Vec<InventoryEntry>, StorageError> {
        let mut entries: Vec<InventoryEntry> = self
            .all_meta()
            .await?
            .into_iter()
            .filter(|meta| meta.key.starts_with(prefix))
            .map(|meta| InventoryEntry {
                locator: meta.key,
                created_at: Some(meta.stored_at),
                size: Some(meta.size),
            })
            .collect();
        entries.sort_by(|a, b| a.locator.cmp(&b.locator));
        Ok(entries)
    }

    async fn delete(&self, locator: &str) -> Result<(), StorageError> {
        validate_locator(locator)?;
        let meta = self.read_meta(locator).await?;
        fs::remove_file(self.sidecar_path(locator)).await?;

        let still_referenced = self
            .all_meta()
            .await?
            .iter()
            .any(|other| other.digest == meta.digest);
        if !still_referenced {
            match fs::remove_file(self.blob_path(&meta.digest)).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, bytes: &[u8]) -> UploadedFile {
        UploadedFile {
            name: name.to_string(),
            content_type: Some("application/pdf".to_string()),
            document_type: "Transcript".to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn stores_and_resolves_inline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalDocumentStore::new(dir.path());

        let stored = store
            .put("user-uploads/a.pdf", &upload("a.pdf", b"%PDF-a"))
            .await
            .expect("stored");
        assert_eq!(stored.size, 6);

        let resolved = store.resolve("user-uploads/a.pdf").await.expect("resolved");
        assert_eq!(
            resolved,
            ResolvedDocument::Inline {
                bytes: b"%PDF-a".to_vec(),
                content_type: "application/pdf".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn identical_content_shares_one_blob_until_last_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalDocumentStore::new(dir.path());
        store
            .put("user-uploads/one.pdf", &upload("one.pdf", b"same"))
            .await
            .expect("first");
        store
            .put("user-uploads/two.pdf", &upload("two.pdf", b"same"))
            .await
            .expect("second");

        let blob = store.blob_path(&sha256_hex(b"same"));
        assert!(blob.exists());

        store.delete("user-uploads/one.pdf").await.expect("delete one");
        assert!(blob.exists());
        assert!(store.resolve("user-uploads/two.pdf").await.is_ok());

        store.delete("user-uploads/two.pdf").await.expect("delete two");
        assert!(!blob.exists());
        assert!(store.list("user-uploads").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn refuses_to_overwrite_or_escape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalDocumentStore::new(dir.path());
        store
            .put("user-uploads/a.pdf", &upload("a.pdf", b"x"))
            .await
            .expect("stored");

        assert!(store
            .put("user-uploads/a.pdf", &upload("a.pdf", b"y"))
            .await
            .is_err());
        assert!(matches!(
            store.resolve("../outside").await,
            Err(StorageError::InvalidLocator(_))
        ));
        assert!(matches!(
            store.resolve("user-uploads/missing.pdf").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
