//! Email-ownership challenges: issue a one-time code, store only its salted hash, and
//! consume it on the first successful match.

mod rest;
mod store;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::notifications::{NotificationDispatcher, NotificationError};

pub use rest::RestChallengeStore;
pub use store::{ChallengeRecord, ChallengeStore, ChallengeStoreError, MemoryChallengeStore};

pub const DEFAULT_TTL_MINUTES: i64 = 10;
pub const INVALID_CODE_MESSAGE: &str = "Invalid or expired verification code.";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = instant;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map(|now| *now)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Six digits drawn uniformly from 100000..=999999.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
    }
}

/// Hands out a fixed sequence of codes, repeating the last one once exhausted.
#[derive(Debug)]
pub struct FixedCodeGenerator {
    codes: Mutex<Vec<String>>,
}

impl FixedCodeGenerator {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut codes: Vec<String> = codes.into_iter().map(Into::into).collect();
        codes.reverse();
        Self {
            codes: Mutex::new(codes),
        }
    }
}

impl CodeGenerator for FixedCodeGenerator {
    fn generate(&self) -> String {
        let Ok(mut codes) = self.codes.lock() else {
            return String::new();
        };
        if codes.len() > 1 {
            codes.pop().unwrap_or_default()
        } else {
            codes.last().cloned().unwrap_or_default()
        }
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Salted SHA-256 of `code`, encoded as `hex(salt)$hex(digest)`.
pub fn hash_code(code: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill(&mut salt);
    format!("{}${}", hex::encode(salt), hex::encode(digest(&salt, code)))
}

pub fn code_matches(code: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };
    let actual = digest(&salt, code);
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected.iter())
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

fn digest(salt: &[u8], code: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(code.as_bytes());
    hasher.finalize().into()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedChallenge {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Email is required.")]
    MissingEmail,
    #[error("failed to store verification challenge: {0}")]
    Store(#[from] ChallengeStoreError),
    #[error("failed to send verification email: {0}")]
    Delivery(#[source] NotificationError),
}

#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("no active challenge for this email")]
    NotFound,
    #[error("challenge expired")]
    Expired,
    #[error("submitted code does not match")]
    Mismatch,
    #[error("challenge store failure: {0}")]
    Store(#[from] ChallengeStoreError),
}

impl ChallengeError {
    /// Message shown to the applicant. Not-found, expired and mismatch are indistinguishable.
    pub fn user_message(&self) -> &'static str {
        match self {
            ChallengeError::Store(_) => "Unable to verify the code right now. Please try again.",
            _ => INVALID_CODE_MESSAGE,
        }
    }
}

/// Issues, stores and checks one-time email-ownership codes.
pub struct VerificationGate {
    store: Arc<dyn ChallengeStore>,
    notifier: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    generator: Arc<dyn CodeGenerator>,
    ttl: Duration,
}

impl VerificationGate {
    pub fn new(store: Arc<dyn ChallengeStore>, notifier: Arc<NotificationDispatcher>) -> Self {
        Self {
            store,
            notifier,
            clock: Arc::new(SystemClock),
            generator: Arc::new(RandomCodeGenerator),
            ttl: Duration::minutes(DEFAULT_TTL_MINUTES),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Replace any active challenge for `email` and mail the plaintext code.
    pub async fn issue(&self, email: &str) -> Result<IssuedChallenge, VerificationError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(VerificationError::MissingEmail);
        }

        let code = self.generator.generate();
        let expires_at = self.clock.now() + self.ttl;
        self.store
            .upsert(ChallengeRecord {
                email: email.clone(),
                hashed_code: hash_code(&code),
                expires_at,
            })
            .await?;

        self.notifier
            .send_verification_code(&email, &code, self.ttl.num_minutes())
            .await
            .map_err(VerificationError::Delivery)?;

        info!(email = %email, %expires_at, "verification code issued");
        Ok(IssuedChallenge { email, expires_at })
    }

    pub async fn resend(&self, email: &str) -> Result<IssuedChallenge, VerificationError> {
        self.issue(email).await
    }

    /// Consume the challenge for `email` if `code` matches and it has not expired.
    pub async fn verify(&self, email: &str, code: &str) -> Result<(), ChallengeError> {
        let email = normalize_email(email);
        let record = self
            .store
            .fetch(&email)
            .await?
            .ok_or(ChallengeError::NotFound)?;

        if self.clock.now() >= record.expires_at {
            self.store.delete(&email).await?;
            debug!(email = %email, "expired challenge purged");
            return Err(ChallengeError::Expired);
        }

        if !code_matches(code.trim(), &record.hashed_code) {
            warn!(email = %email, "verification code mismatch");
            return Err(ChallengeError::Mismatch);
        }

        self.store.delete(&email).await?;
        info!(email = %email, "email verified");
        Ok(())
    }
}
