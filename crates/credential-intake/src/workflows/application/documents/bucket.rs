use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::reconcile::{DocumentInventory, InventoryEntry};
use super::{
    validate_locator, DocumentStore, ResolvedDocument, StorageError, StoredObject, UploadedFile,
};

const LIST_PAGE_SIZE: usize = 1000;

/// How stored objects are handed to the admin message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketResolution {
    /// Time-limited signed link.
    SignedUrl { ttl_secs: u64 },
    /// Stable public asset link; the bucket must be public.
    PublicUrl,
    /// Bytes downloaded and attached inline.
    Download,
}

/// Object bucket behind a Supabase-storage-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct BucketDocumentStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    resolution: BucketResolution,
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    metadata: Option<ListedMetadata>,
}

#[derive(Debug, Deserialize)]
struct ListedMetadata {
    size: Option<u64>,
}

impl BucketDocumentStore {
    pub fn new(
        base_url: &str,
        service_key: &str,
        bucket: &str,
        resolution: BucketResolution,
    ) -> Result<Self, StorageError> {
        let invalid_key = |err: reqwest::header::InvalidHeaderValue| {
            StorageError::Backend(format!("invalid service key: {err}"))
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {service_key}")).map_err(invalid_key)?,
        );
        headers.insert("apikey", HeaderValue::from_str(service_key).map_err(invalid_key)?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| StorageError::Backend(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            resolution,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{key}", self.base_url, self.bucket)
    }

    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{key}",
            self.base_url, self.bucket
        )
    }

    async fn signed_url(&self, key: &str, ttl_secs: u64) -> Result<String, StorageError> {
        let url = format!(
            "{}/storage/v1/object/sign/{}/{key}",
            self.base_url, self.bucket
        );
        let response = self
            .client
            .post(url)
            .json(&json!({ "expiresIn": ttl_secs }))
            .send()
            .await
            .map_err(backend)?;
        let signed: SignedUrlResponse = checked(response, key)
            .await?
            .json()
            .await
            .map_err(backend)?;
        Ok(format!("{}/storage/v1{}", self.base_url, signed.signed_url))
    }

    async fn download(&self, key: &str) -> Result<ResolvedDocument, StorageError> {
        let response = self
            .client
            .get(self.object_url(key))
            .send()
            .await
            .map_err(backend)?;
        let response = checked(response, key).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .unwrap_or(mime::APPLICATION_OCTET_STREAM)
            .to_string();
        let bytes = response.bytes().await.map_err(backend)?;
        Ok(ResolvedDocument::Inline {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

fn backend(err: reqwest::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

async fn checked(response: reqwest::Response, key: &str) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(StorageError::NotFound(key.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::Backend(format!("{key}: status {status}: {body}")))
}

#[async_trait]
impl DocumentStore for BucketDocumentStore {
    async fn put(&self, key: &str, file: &UploadedFile) -> Result<StoredObject, StorageError> {
        validate_locator(key)?;
        let content_type = file
            .content_type
            .clone()
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
        let response = self
            .client
            .post(self.object_url(key))
            .header(CONTENT_TYPE, content_type.as_str())
            .header(CACHE_CONTROL, "3600")
            .header("x-upsert", "false")
            .body(file.bytes.clone())
            .send()
            .await
            .map_err(backend)?;
        checked(response, key).await?;
        debug!(locator = key, bucket = %self.bucket, "object uploaded");

        Ok(StoredObject {
            locator: key.to_string(),
            size: file.bytes.len() as u64,
            content_type: Some(content_type),
        })
    }

    async fn resolve(&self, locator: &str) -> Result<ResolvedDocument, StorageError> {
        validate_locator(locator)?;
        match &self.resolution {
            BucketResolution::SignedUrl { ttl_secs } => Ok(ResolvedDocument::Link {
                url: self.signed_url(locator, *ttl_secs).await?,
            }),
            BucketResolution::PublicUrl => Ok(ResolvedDocument::Link {
                url: self.public_url(locator),
            }),
            BucketResolution::Download => self.download(locator).await,
        }
    }
}

#[async_trait]
impl DocumentInventory for BucketDocumentStore {
    async fn list(&self, prefix: &str) -> Result<Vec<InventoryEntry>, StorageError> {
        let url = format!("{}/storage/v1/object/list/{}", self.base_url, self.bucket);
        let folder = prefix.trim_end_matches('/');
        let mut entries = Vec::new();
        let mut offset = 0;

        loop {
            let response = self
                .client
                .post(&url)
                .json(&json!({
                    "prefix": folder,
                    "limit": LIST_PAGE_SIZE,
                    "offset": offset,
                    "sortBy": { "column": "name", "order": "asc" },
                }))
                .send()
                .await
                .map_err(backend)?;
            let page: Vec<ListedObject> = checked(response, folder)
                .await?
                .json()
                .await
                .map_err(backend)?;
            let fetched = page.len();

            entries.extend(
                page.into_iter()
                    // Folder placeholders carry no id.
                    .filter(|object| object.id.is_some())
                    .map(|object| InventoryEntry {
                        locator: if folder.is_empty() {
                            object.name
                        } else {
                            format!("{folder}/{}", object.name)
                        },
                        created_at: object.created_at,
                        size: object.metadata.and_then(|meta| meta.size),
                    }),
            );

            if fetched < LIST_PAGE_SIZE {
                break;
            }
            offset += fetched;
        }

        Ok(entries)
    }

    async fn delete(&self, locator: &str) -> Result<(), StorageError> {
        validate_locator(locator)?;
        let url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);
        let response = self
            .client
            .delete(url)
            .json(&json!({ "prefixes": [locator] }))
            .send()
            .await
            .map_err(backend)?;
        checked(response, locator).await?;
        Ok(())
    }
}
