use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::debug;

use super::store::{ChallengeRecord, ChallengeStore, ChallengeStoreError};

const TABLE: &str = "otp_verifications";

/// Challenge store backed by a PostgREST table (`otp_verifications`, unique on `email`).
#[derive(Debug, Clone)]
pub struct RestChallengeStore {
    client: reqwest::Client,
    base_url: String,
}

impl RestChallengeStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ChallengeStoreError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|err| ChallengeStoreError::Unavailable(format!("invalid api key: {err}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|err| ChallengeStoreError::Unavailable(format!("invalid api key: {err}")))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| ChallengeStoreError::Unavailable(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{TABLE}", self.base_url)
    }
}

fn unavailable(err: reqwest::Error) -> ChallengeStoreError {
    ChallengeStoreError::Unavailable(err.to_string())
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ChallengeStoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChallengeStoreError::Unavailable(format!(
        "status {status}: {body}"
    )))
}

#[async_trait]
impl ChallengeStore for RestChallengeStore {
    async fn upsert(&self, record: ChallengeRecord) -> Result<(), ChallengeStoreError> {
        let response = self
            .client
            .post(self.table_url())
            .query(&[("on_conflict", "email")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(&record)
            .send()
            .await
            .map_err(unavailable)?;
        ensure_success(response).await?;
        debug!(email = %record.email, "challenge upserted");
        Ok(())
    }

    async fn fetch(&self, email: &str) -> Result<Option<ChallengeRecord>, ChallengeStoreError> {
        let filter = format!("eq.{email}");
        let response = self
            .client
            .get(self.table_url())
            .query(&[
                ("email", filter.as_str()),
                ("select", "email,hashed_otp,expires_at"),
            ])
            .send()
            .await
            .map_err(unavailable)?;
        let rows: Vec<ChallengeRecord> = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|err| ChallengeStoreError::Decode(err.to_string()))?;
        Ok(rows.into_iter().next())
    }

    async fn delete(&self, email: &str) -> Result<(), ChallengeStoreError> {
        let filter = format!("eq.{email}");
        let response = self
            .client
            .delete(self.table_url())
            .query(&[("email", filter.as_str())])
            .send()
            .await
            .map_err(unavailable)?;
        ensure_success(response).await?;
        Ok(())
    }
}
