//! Document upload and resolution against pluggable object storage.
//!
//! The client-side [`DocumentCollector`] only ever edits the draft's reference list; the
//! server-side [`DocumentIntake`] enforces the upload policy and writes to a
//! [`DocumentStore`]. Removing a reference never deletes the stored object; see
//! [`reconcile`] for collecting unreferenced objects.

mod bucket;
mod local;
mod memory;
pub mod reconcile;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::domain::{DocumentReference, DocumentSet};

pub use bucket::{BucketDocumentStore, BucketResolution};
pub use local::LocalDocumentStore;
pub use memory::MemoryDocumentStore;
pub use reconcile::{DocumentInventory, InventoryEntry, OrphanReconciler, ReconciliationReport};

pub const UPLOAD_PREFIX: &str = "user-uploads";
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// A file as received from the applicant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: Option<String>,
    /// Category label chosen by the applicant (e.g. "Diploma").
    pub document_type: String,
    pub bytes: Vec<u8>,
}

/// What a store reports after accepting an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub locator: String,
    pub size: u64,
    pub content_type: Option<String>,
}

/// How a stored document reaches the admin message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedDocument {
    Inline { bytes: Vec<u8>, content_type: String },
    Link { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment {
    pub reference: DocumentReference,
    pub content: ResolvedDocument,
}

/// Upload capability used by the collector. Implemented server-side by [`DocumentIntake`]
/// and client-side by the HTTP gateway.
#[async_trait]
pub trait DocumentUploader: Send + Sync {
    async fn upload(&self, file: &UploadedFile) -> Result<StoredObject, UploadError>;
}

/// Object storage backend.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(&self, key: &str, file: &UploadedFile) -> Result<StoredObject, StorageError>;
    async fn resolve(&self, locator: &str) -> Result<ResolvedDocument, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("stored object not found: {0}")]
    NotFound(String),
    #[error("invalid storage locator '{0}'")]
    InvalidLocator(String),
    #[error("storage io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file uploaded.")]
    Empty,
    #[error("File is too large. Maximum size is {max_mb} MB.", max_mb = .max / (1024 * 1024))]
    TooLarge { size: u64, max: u64 },
    #[error("Unsupported file type for '{name}'. Allowed types: PDF, JPG, JPEG, PNG.")]
    UnsupportedType { name: String },
    #[error("Upload rejected: {0}")]
    Rejected(String),
    #[error("Upload failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl UploadError {
    /// Policy violations and server rejections are the applicant's to fix.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            UploadError::Empty
                | UploadError::TooLarge { .. }
                | UploadError::UnsupportedType { .. }
                | UploadError::Rejected(_)
        )
    }
}

/// Per-file limits applied before anything reaches storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: ["pdf", "jpg", "jpeg", "png"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl UploadPolicy {
    /// Returns the lower-cased extension the object key will carry.
    pub fn check(&self, file: &UploadedFile) -> Result<String, UploadError> {
        if file.bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        let size = file.bytes.len() as u64;
        if size > self.max_bytes {
            return Err(UploadError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        let extension = file
            .name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| self.allowed_extensions.iter().any(|allowed| allowed == ext))
            .ok_or_else(|| UploadError::UnsupportedType {
                name: file.name.clone(),
            })?;
        Ok(extension)
    }
}

/// Fresh, collision-free key under the upload prefix.
pub fn object_key(extension: &str) -> String {
    format!("{UPLOAD_PREFIX}/{}.{extension}", Uuid::new_v4())
}

pub fn content_type_for_extension(extension: &str) -> mime::Mime {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => mime::APPLICATION_PDF,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "png" => mime::IMAGE_PNG,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

/// Server-side ingestion: policy check, fresh key, store write.
pub struct DocumentIntake {
    store: Arc<dyn DocumentStore>,
    policy: UploadPolicy,
}

impl DocumentIntake {
    pub fn new(store: Arc<dyn DocumentStore>, policy: UploadPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub async fn resolve(
        &self,
        reference: &DocumentReference,
    ) -> Result<ResolvedDocument, StorageError> {
        self.store.resolve(&reference.locator).await
    }

    /// Resolve every reference, dropping (and logging) the ones that fail.
    pub async fn resolve_all(&self, references: &[DocumentReference]) -> ResolutionOutcome {
        let mut outcome = ResolutionOutcome::default();
        for reference in references {
            match self.resolve(reference).await {
                Ok(content) => outcome.resolved.push(ResolvedAttachment {
                    reference: reference.clone(),
                    content,
                }),
                Err(err) => {
                    warn!(
                        locator = %reference.locator,
                        document = %reference.name,
                        error = %err,
                        "document could not be resolved; dropping from notification"
                    );
                    outcome.dropped.push(reference.clone());
                }
            }
        }
        outcome
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionOutcome {
    pub resolved: Vec<ResolvedAttachment>,
    pub dropped: Vec<DocumentReference>,
}

#[async_trait]
impl DocumentUploader for DocumentIntake {
    async fn upload(&self, file: &UploadedFile) -> Result<StoredObject, UploadError> {
        let extension = self.policy.check(file)?;
        let key = object_key(&extension);
        let mut file = file.clone();
        let declared = file
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|ct| ct.parse::<mime::Mime>().is_ok());
        file.content_type = Some(match declared {
            Some(ct) => ct.to_string(),
            None => content_type_for_extension(&extension).to_string(),
        });

        let stored = self.store.put(&key, &file).await?;
        info!(locator = %stored.locator, size = stored.size, "document stored");
        Ok(stored)
    }
}

/// Client-side editor for the draft's document list.
pub struct DocumentCollector<'a> {
    documents: &'a mut DocumentSet,
}

impl<'a> DocumentCollector<'a> {
    pub fn new(documents: &'a mut DocumentSet) -> Self {
        Self { documents }
    }

    /// Upload one file now. The list only grows when the upload succeeds.
    pub async fn upload<U>(
        &mut self,
        uploader: &U,
        file: UploadedFile,
    ) -> Result<DocumentReference, UploadError>
    where
        U: DocumentUploader + ?Sized,
    {
        let stored = uploader.upload(&file).await?;
        let reference = DocumentReference {
            id: Uuid::new_v4().to_string(),
            name: file.name,
            locator: stored.locator,
            document_type: file.document_type,
            content_type: stored.content_type.or(file.content_type),
            size: stored.size,
            upload_date: Utc::now(),
        };
        self.documents.files.push(reference.clone());
        Ok(reference)
    }

    /// Drop the reference from the draft. The stored object is left in place.
    pub fn remove(&mut self, id: &str) -> Option<DocumentReference> {
        let index = self.documents.files.iter().position(|doc| doc.id == id)?;
        Some(self.documents.files.remove(index))
    }

    pub fn documents(&self) -> &[DocumentReference] {
        &self.documents.files
    }
}

/// Rejects keys that could escape the store's namespace.
pub(crate) fn validate_locator(locator: &str) -> Result<(), StorageError> {
    let valid = !locator.is_empty()
        && !locator.starts_with('/')
        && locator
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
        && locator
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidLocator(locator.to_string()))
    }
}
