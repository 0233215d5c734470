use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored challenge, keyed by normalized email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub email: String,
    #[serde(rename = "hashed_otp")]
    pub hashed_code: String,
    pub expires_at: DateTime<Utc>,
}

/// Persistence for active challenges. `upsert` replaces any record for the same email.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn upsert(&self, record: ChallengeRecord) -> Result<(), ChallengeStoreError>;
    async fn fetch(&self, email: &str) -> Result<Option<ChallengeRecord>, ChallengeStoreError>;
    async fn delete(&self, email: &str) -> Result<(), ChallengeStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ChallengeStoreError {
    #[error("challenge store unavailable: {0}")]
    Unavailable(String),
    #[error("challenge store returned an unreadable record: {0}")]
    Decode(String),
}

#[derive(Default)]
pub struct MemoryChallengeStore {
    records: Mutex<HashMap<String, ChallengeRecord>>,
}

impl MemoryChallengeStore {
    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> ChallengeStoreError {
        ChallengeStoreError::Unavailable("challenge map lock poisoned".to_string())
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn upsert(&self, record: ChallengeRecord) -> Result<(), ChallengeStoreError> {
        let mut records = self.records.lock().map_err(|_| Self::poisoned())?;
        records.insert(record.email.clone(), record);
        Ok(())
    }

    async fn fetch(&self, email: &str) -> Result<Option<ChallengeRecord>, ChallengeStoreError> {
        let records = self.records.lock().map_err(|_| Self::poisoned())?;
        Ok(records.get(email).cloned())
    }

    async fn delete(&self, email: &str) -> Result<(), ChallengeStoreError> {
        let mut records = self.records.lock().map_err(|_| Self::poisoned())?;
        records.remove(email);
        Ok(())
    }
}
