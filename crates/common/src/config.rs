use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::types::ChannelKind;

/// Where `ProcessingRecord`s are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Redis,
    /// Process-local; only safe with a single worker replica.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Channel this worker delivers on (default: email)
    pub notify_channel: ChannelKind,

    /// Address the push endpoint binds to (default: 0.0.0.0:8080)
    pub listen_addr: SocketAddr,

    /// Processing record store (default: postgres)
    pub store_backend: StoreBackend,

    /// PostgreSQL connection string, required for the postgres backend
    pub database_url: Option<String>,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Redis connection string
    pub redis_url: String,

    /// Delivery attempts before a report is abandoned (default: 5)
    pub max_attempts: u32,

    /// Upper bound on a single send, in milliseconds (default: 10000)
    pub dispatch_timeout_ms: u64,

    /// Age after which a pending claim is presumed crashed (default: 60)
    pub claim_liveness_secs: u64,

    /// How long processing records are kept for dedup (default: 168 = 7 days)
    pub record_retention_hours: u64,

    /// Interval between retention sweeps in seconds (default: 3600)
    pub purge_interval_secs: u64,

    /// Maximum accepted push body size (default: 1 MiB)
    pub max_body_bytes: usize,

    /// Shared secret expected in the push URL's `token` query parameter
    pub push_verification_token: Option<String>,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Twilio account SID for SMS delivery
    pub twilio_account_sid: Option<String>,

    /// Twilio auth token
    pub twilio_auth_token: Option<String>,

    /// SMS sender number
    pub sms_from: Option<String>,

    /// Webhook receiving exhaustion alerts
    pub alert_webhook_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            notify_channel: parse_or(&var, "NOTIFY_CHANNEL", ChannelKind::Email)?,
            listen_addr: parse_or(&var, "LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            store_backend: parse_or(&var, "STORE_BACKEND", StoreBackend::Postgres)?,
            database_url: var("DATABASE_URL"),
            db_max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", 20)?,
            redis_url: var("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            max_attempts: parse_or(&var, "MAX_ATTEMPTS", 5)?,
            dispatch_timeout_ms: parse_or(&var, "DISPATCH_TIMEOUT_MS", 10_000)?,
            claim_liveness_secs: parse_or(&var, "CLAIM_LIVENESS_SECS", 60)?,
            record_retention_hours: parse_or(&var, "RECORD_RETENTION_HOURS", 168)?,
            purge_interval_secs: parse_or(&var, "PURGE_INTERVAL_SECS", 3600)?,
            max_body_bytes: parse_or(&var, "MAX_BODY_BYTES", 1024 * 1024)?,
            push_verification_token: var("PUSH_VERIFICATION_TOKEN").filter(|t| !t.is_empty()),
            resend_api_key: var("RESEND_API_KEY"),
            email_from: var("EMAIL_FROM"),
            twilio_account_sid: var("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: var("TWILIO_AUTH_TOKEN"),
            sms_from: var("SMS_FROM"),
            alert_webhook_url: var("ALERT_WEBHOOK_URL"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would break delivery guarantees.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("MAX_ATTEMPTS must be at least 1");
        }
        if self.dispatch_timeout_ms == 0 {
            anyhow::bail!("DISPATCH_TIMEOUT_MS must be greater than 0");
        }
        // A stale claim may be re-taken, so the previous send must be over by then.
        if self.dispatch_timeout() >= self.claim_liveness() {
            anyhow::bail!(
                "DISPATCH_TIMEOUT_MS ({}) must be shorter than CLAIM_LIVENESS_SECS ({}s)",
                self.dispatch_timeout_ms,
                self.claim_liveness_secs
            );
        }
        if self.store_backend == StoreBackend::Postgres && self.database_url.is_none() {
            anyhow::bail!("DATABASE_URL environment variable is required for the postgres store");
        }
        Ok(())
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn claim_liveness(&self) -> Duration {
        Duration::from_secs(self.claim_liveness_secs)
    }

    pub fn record_retention(&self) -> Duration {
        Duration::from_secs(self.record_retention_hours * 3600)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("STORE_BACKEND", "memory")]).unwrap();
        assert_eq!(config.notify_channel, ChannelKind::Email);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.dispatch_timeout(), Duration::from_secs(10));
        assert_eq!(config.claim_liveness(), Duration::from_secs(60));
        assert_eq!(config.record_retention(), Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.listen_addr.port(), 8080);
        assert!(config.push_verification_token.is_none());
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let config = load(&[("DATABASE_URL", "postgres://localhost/labpush")]).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Postgres);
    }

    #[test]
    fn test_timeout_must_be_below_liveness() {
        let err = load(&[
            ("STORE_BACKEND", "memory"),
            ("DISPATCH_TIMEOUT_MS", "60000"),
            ("CLAIM_LIVENESS_SECS", "60"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("CLAIM_LIVENESS_SECS"));
    }

    #[test]
    fn test_invalid_numbers_are_reported() {
        let err = load(&[("STORE_BACKEND", "memory"), ("MAX_ATTEMPTS", "five")]).unwrap_err();
        assert!(err.to_string().contains("MAX_ATTEMPTS"));

        let err = load(&[("STORE_BACKEND", "memory"), ("MAX_ATTEMPTS", "0")]).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_sms_channel_and_redis_backend() {
        let config = load(&[
            ("NOTIFY_CHANNEL", "sms"),
            ("STORE_BACKEND", "redis"),
            ("REDIS_URL", "redis://cache:6379"),
            ("PUSH_VERIFICATION_TOKEN", ""),
        ])
        .unwrap();
        assert_eq!(config.notify_channel, ChannelKind::Sms);
        assert_eq!(config.store_backend, StoreBackend::Redis);
        assert_eq!(config.redis_url, "redis://cache:6379");
        assert!(config.push_verification_token.is_none());
    }
}
