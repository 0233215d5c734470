use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::application::documents::BucketResolution;
use crate::workflows::application::payment::PricingPolicy;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Credential value whose contents never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Top-level configuration for the intake service.
///
/// Every external collaborator (mail transport, payment processor, document storage,
/// challenge store) is described here once and constructed once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub mail: MailConfig,
    pub payments: PaymentConfig,
    pub storage: StorageConfig,
    pub verification: VerificationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source. `load` feeds it the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let environment =
            AppEnvironment::from_str(&vars.or_default("APP_ENV", "development"));

        let host = vars.or_default("APP_HOST", "127.0.0.1");
        let port = vars
            .or_default("APP_PORT", "3000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let telemetry = TelemetryConfig {
            log_level: vars.or_default("APP_LOG_LEVEL", "info"),
            format: vars.parsed_with("APP_LOG_FORMAT", LogFormat::Compact, LogFormat::parse)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry,
            mail: MailConfig::from_vars(&vars)?,
            payments: PaymentConfig::from_vars(&vars)?,
            storage: StorageConfig::from_vars(&vars)?,
            verification: VerificationConfig::from_vars(&vars)?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Output layout for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Outbound mail settings shared by verification codes and application notices.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub transport: MailTransportConfig,
    pub from_address: String,
    pub admin_address: String,
    pub organization: String,
}

#[derive(Debug, Clone)]
pub enum MailTransportConfig {
    Smtp(SmtpSettings),
    /// Messages are written to the log instead of being delivered.
    Log,
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
    pub timeout: Duration,
}

impl MailConfig {
    fn from_vars(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let transport = match vars.or_default("MAIL_TRANSPORT", "smtp").to_ascii_lowercase().as_str()
        {
            "smtp" => MailTransportConfig::Smtp(SmtpSettings {
                host: vars.required("SMTP_HOST")?,
                port: vars.parsed("SMTP_PORT", 465)?,
                username: vars.required("SMTP_USERNAME")?,
                password: Secret::new(vars.required("SMTP_PASSWORD")?),
                timeout: Duration::from_secs(vars.parsed("SMTP_TIMEOUT_SECS", 10)?),
            }),
            "log" => MailTransportConfig::Log,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "MAIL_TRANSPORT",
                    value: other.to_string(),
                })
            }
        };

        let from_address = match (vars.get("MAIL_FROM"), &transport) {
            (Some(from), _) => from,
            (None, MailTransportConfig::Smtp(smtp)) => smtp.username.clone(),
            (None, MailTransportConfig::Log) => "no-reply@localhost".to_string(),
        };

        Ok(Self {
            transport,
            from_address,
            admin_address: vars.required("ADMIN_EMAIL")?,
            organization: vars.or_default("ORGANIZATION_NAME", "Center of Education Transition"),
        })
    }
}

/// Payment processor credentials and charge policy.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub secret_key: Secret,
    pub api_base: String,
    pub currency: String,
    pub pricing_policy: PricingPolicy,
}

impl PaymentConfig {
    fn from_vars(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let processor = vars.or_default("PAYMENT_PROCESSOR", "stripe");
        if !processor.eq_ignore_ascii_case("stripe") {
            return Err(ConfigError::InvalidValue {
                key: "PAYMENT_PROCESSOR",
                value: processor,
            });
        }

        Ok(Self {
            secret_key: Secret::new(vars.required("STRIPE_SECRET_KEY")?),
            api_base: vars.or_default("STRIPE_API_BASE", "https://api.stripe.com"),
            currency: vars.or_default("PAYMENT_CURRENCY", "usd").to_ascii_lowercase(),
            pricing_policy: vars.parsed_with(
                "PRICING_POLICY",
                PricingPolicy::default(),
                PricingPolicy::parse,
            )?,
        })
    }
}

/// Which object-storage capability backs uploaded documents.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
}

#[derive(Debug, Clone)]
pub enum StorageBackendConfig {
    Local { root: PathBuf },
    Bucket(BucketSettings),
    Memory,
}

#[derive(Debug, Clone)]
pub struct BucketSettings {
    pub url: String,
    pub service_key: Secret,
    pub bucket: String,
    pub resolution: BucketResolution,
}

impl StorageConfig {
    fn from_vars(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let backend = match vars.or_default("STORAGE_BACKEND", "local").to_ascii_lowercase().as_str()
        {
            "local" => StorageBackendConfig::Local {
                root: PathBuf::from(vars.or_default("STORAGE_ROOT", "./uploads")),
            },
            "bucket" => {
                let ttl_secs: u64 = vars.parsed("SIGNED_URL_TTL_SECS", 60 * 60 * 24 * 30)?;
                let resolution = match vars.or_default("STORAGE_RESOLUTION", "signed").to_ascii_lowercase().as_str() {
                    "signed" => BucketResolution::SignedUrl { ttl_secs },
                    "public" => BucketResolution::PublicUrl,
                    "download" => BucketResolution::Download,
                    other => {
                        return Err(ConfigError::InvalidValue {
                            key: "STORAGE_RESOLUTION",
                            value: other.to_string(),
                        })
                    }
                };
                StorageBackendConfig::Bucket(BucketSettings {
                    url: vars.required("STORAGE_URL")?,
                    service_key: Secret::new(vars.required("STORAGE_SERVICE_KEY")?),
                    bucket: vars.or_default("STORAGE_BUCKET", "attachments"),
                    resolution,
                })
            }
            "memory" => StorageBackendConfig::Memory,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "STORAGE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self { backend })
    }
}

/// Email-ownership challenge settings.
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    pub ttl_minutes: i64,
    pub store: ChallengeStoreConfig,
}

#[derive(Debug, Clone)]
pub enum ChallengeStoreConfig {
    Memory,
    Rest { url: String, api_key: Secret },
}

impl VerificationConfig {
    fn from_vars(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let ttl_minutes: i64 = vars.parsed("VERIFICATION_TTL_MINUTES", 10)?;
        if ttl_minutes <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "VERIFICATION_TTL_MINUTES",
                value: ttl_minutes.to_string(),
            });
        }

        let store = match vars.or_default("CHALLENGE_STORE", "memory").to_ascii_lowercase().as_str() {
            "memory" => ChallengeStoreConfig::Memory,
            "rest" => ChallengeStoreConfig::Rest {
                url: vars.required("CHALLENGE_REST_URL")?,
                api_key: Secret::new(vars.required("CHALLENGE_REST_KEY")?),
            },
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "CHALLENGE_STORE",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self { ttl_minutes, store })
    }
}

struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::MissingVariable(key))
    }

    fn parsed<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
            None => Ok(default),
        }
    }

    fn parsed_with<T>(
        &self,
        key: &'static str,
        default: T,
        parse: fn(&str) -> Option<T>,
    ) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(raw) => parse(&raw).ok_or(ConfigError::InvalidValue { key, value: raw }),
            None => Ok(default),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    MissingVariable(&'static str),
    InvalidValue { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::MissingVariable(key) => {
                write!(f, "{key} is required but was not set")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an unsupported value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::MissingVariable(_)
            | ConfigError::InvalidValue { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn required_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USERNAME", "mailer@example.com"),
            ("SMTP_PASSWORD", "hunter2"),
            ("ADMIN_EMAIL", "staff@example.com"),
            ("STRIPE_SECRET_KEY", "sk_test_123"),
        ])
    }

    fn load_from(vars: &HashMap<&'static str, &'static str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| vars.get(key).map(|value| value.to_string()))
    }

    #[test]
    fn load_uses_defaults_for_optional_settings() {
        let config = load_from(&required_vars()).expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.telemetry.format, LogFormat::Compact);
        assert_eq!(config.mail.from_address, "mailer@example.com");
        assert_eq!(config.payments.currency, "usd");
        assert_eq!(config.payments.pricing_policy, PricingPolicy::CatalogOrClient);
        assert_eq!(config.verification.ttl_minutes, 10);
        assert!(matches!(
            config.storage.backend,
            StorageBackendConfig::Local { .. }
        ));
        match config.mail.transport {
            MailTransportConfig::Smtp(smtp) => {
                assert_eq!(smtp.port, 465);
                assert_eq!(smtp.timeout, Duration::from_secs(10));
            }
            MailTransportConfig::Log => panic!("smtp is the default transport"),
        }
    }

    #[test]
    fn missing_smtp_credential_is_fatal() {
        let mut vars = required_vars();
        vars.remove("SMTP_PASSWORD");

        match load_from(&vars) {
            Err(ConfigError::MissingVariable("SMTP_PASSWORD")) => {}
            other => panic!("expected missing SMTP_PASSWORD, got {other:?}"),
        }
    }

    #[test]
    fn log_transport_does_not_require_smtp_credentials() {
        let vars = HashMap::from([
            ("MAIL_TRANSPORT", "log"),
            ("ADMIN_EMAIL", "staff@example.com"),
            ("STRIPE_SECRET_KEY", "sk_test_123"),
        ]);

        let config = load_from(&vars).expect("log transport loads");
        assert!(matches!(config.mail.transport, MailTransportConfig::Log));
    }

    #[test]
    fn bucket_backend_parses_resolution_mode() {
        let mut vars = required_vars();
        vars.insert("STORAGE_BACKEND", "bucket");
        vars.insert("STORAGE_URL", "https://storage.example.com");
        vars.insert("STORAGE_SERVICE_KEY", "service-role");
        vars.insert("STORAGE_RESOLUTION", "public");

        let config = load_from(&vars).expect("bucket config loads");
        match config.storage.backend {
            StorageBackendConfig::Bucket(bucket) => {
                assert_eq!(bucket.bucket, "attachments");
                assert_eq!(bucket.resolution, BucketResolution::PublicUrl);
            }
            other => panic!("expected bucket backend, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_pricing_policy() {
        let mut vars = required_vars();
        vars.insert("PRICING_POLICY", "whatever");

        assert!(matches!(
            load_from(&vars),
            Err(ConfigError::InvalidValue {
                key: "PRICING_POLICY",
                ..
            })
        ));
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let config = load_from(&required_vars()).expect("config loads");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("sk_test_123"));
    }

    #[test]
    fn load_reads_process_environment_and_accepts_localhost() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        for (key, value) in required_vars() {
            env::set_var(key, value);
        }
        env::set_var("APP_HOST", "localhost");

        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));

        env::remove_var("APP_HOST");
        for key in required_vars().keys() {
            env::remove_var(key);
        }
    }
}
