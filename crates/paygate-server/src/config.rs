use std::env;
use std::time::Duration;

use paygate::config::{
    DEFAULT_MOMO_URL, DEFAULT_PAYOS_URL, DEFAULT_VIETQR_URL, DEFAULT_VNPAY_URL, DEFAULT_VNPAY_VERSION,
    DEFAULT_ZALOPAY_BANKS_URL, DEFAULT_ZALOPAY_URL,
};
use paygate::ProviderConfig;
use url::Url;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 4080;
const DEFAULT_BASE_PATH: &str = "/api/v1";
const DEFAULT_DB_PATH: &str = "./paygate.db";
const DEFAULT_RATE_LIMIT_RPM: u32 = 120;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_FORWARD_TIMEOUT_SECS: u64 = 5;
const DEFAULT_PAYOS_STALE_AFTER_SECS: u64 = 24 * 60 * 60;

#[derive(Clone)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Prefix every API route is mounted under, e.g. `/api/v1`
    pub base_path: String,
    /// SQLite database path
    pub db_path: String,
    /// Vendor endpoints, callback base and timing policy
    pub providers: ProviderConfig,
    /// Token required by `GET /get_users` (None = dev mode, endpoint disabled)
    pub admin_token: Option<String>,
    /// Bearer token required for /metrics endpoint (None = public)
    pub metrics_token: Option<String>,
    /// CORS allowed origins
    pub allowed_origins: Vec<String>,
    /// Rate limit requests per minute
    pub rate_limit_rpm: u32,
    /// Allows wildcard CORS, private IPN hosts and a missing admin token
    pub insecure_dev: bool,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_path", &self.base_path)
            .field("db_path", &self.db_path)
            .field("providers", &self.providers)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field("insecure_dev", &self.insecure_dev)
            .finish()
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|s| !s.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or(var("PORT"), "PORT", DEFAULT_PORT)?;

        let base_path = normalize_base_path(&var("BASE_PATH").unwrap_or_else(|| DEFAULT_BASE_PATH.to_string()));
        let db_path = var("DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let url = |key: &'static str, default: &str| -> Result<String, ConfigError> {
            let value = var(key).unwrap_or_else(|| default.to_string());
            Url::parse(&value).map_err(|_| ConfigError::InvalidUrl(format!("{key}={value}")))?;
            Ok(value.trim_end_matches('/').to_string())
        };

        let public_base_url = url("PUBLIC_BASE_URL", &format!("http://localhost:{port}"))?;

        let providers = ProviderConfig {
            momo_url: url("MOMO_URL", DEFAULT_MOMO_URL)?,
            payos_url: url("PAYOS_URL", DEFAULT_PAYOS_URL)?,
            zalopay_url: url("ZALOPAY_URL", DEFAULT_ZALOPAY_URL)?,
            zalopay_banks_url: url("ZALOPAY_BANKS_URL", DEFAULT_ZALOPAY_BANKS_URL)?,
            vnpay_url: url("VNPAY_URL", DEFAULT_VNPAY_URL)?,
            vnpay_version: var("VNPAY_VERSION").unwrap_or_else(|| DEFAULT_VNPAY_VERSION.to_string()),
            vietqr_url: url("VIETQR_URL", DEFAULT_VIETQR_URL)?,
            callback_base: format!("{public_base_url}{base_path}"),
            request_timeout: Duration::from_secs(parse_or(
                var("PROVIDER_TIMEOUT_SECS"),
                "PROVIDER_TIMEOUT_SECS",
                DEFAULT_PROVIDER_TIMEOUT_SECS,
            )?),
            forward_timeout: Duration::from_secs(parse_or(
                var("FORWARD_TIMEOUT_SECS"),
                "FORWARD_TIMEOUT_SECS",
                DEFAULT_FORWARD_TIMEOUT_SECS,
            )?),
            payos_stale_after: Duration::from_secs(parse_or(
                var("PAYOS_STALE_AFTER_SECS"),
                "PAYOS_STALE_AFTER_SECS",
                DEFAULT_PAYOS_STALE_AFTER_SECS,
            )?),
        };

        if providers.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("PROVIDER_TIMEOUT_SECS", "0".to_string()));
        }
        if providers.forward_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("FORWARD_TIMEOUT_SECS", "0".to_string()));
        }

        let admin_token = var("ADMIN_TOKEN");
        let metrics_token = var("METRICS_TOKEN");

        let allowed_origins: Vec<String> = var("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["http://localhost:3000".to_string()]);

        let rate_limit_rpm = parse_or(var("RATE_LIMIT_RPM"), "RATE_LIMIT_RPM", DEFAULT_RATE_LIMIT_RPM)?;
        if rate_limit_rpm == 0 {
            return Err(ConfigError::InvalidValue("RATE_LIMIT_RPM", "0".to_string()));
        }

        let insecure_dev = var("PAYGATE_INSECURE_DEV")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        if admin_token.is_none() {
            if insecure_dev {
                tracing::warn!("PAYGATE_INSECURE_DEV=true and ADMIN_TOKEN unset: /get_users is disabled");
            } else {
                tracing::error!(
                    "ADMIN_TOKEN is required. Set it to a secure random value (e.g. `openssl rand -hex 32`). \
                     For local development only, set PAYGATE_INSECURE_DEV=true to skip."
                );
                return Err(ConfigError::MissingRequired("ADMIN_TOKEN"));
            }
        }

        // Reject wildcard CORS in production mode
        if allowed_origins.iter().any(|o| o == "*") && !insecure_dev {
            tracing::error!(
                "Wildcard CORS origin '*' is not allowed in production. \
                 Specify explicit origins in ALLOWED_ORIGINS, or set PAYGATE_INSECURE_DEV=true for dev."
            );
            return Err(ConfigError::InvalidUrl(
                "wildcard CORS origin '*' is not allowed in production".to_string(),
            ));
        }

        if metrics_token.is_none() {
            tracing::warn!("METRICS_TOKEN not set, /metrics endpoint is publicly accessible");
        }

        Ok(Self {
            host,
            port,
            base_path,
            db_path,
            providers,
            admin_token,
            metrics_token,
            allowed_origins,
            rate_limit_rpm,
            insecure_dev,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(s) => s.trim().parse().map_err(|_| ConfigError::InvalidValue(key, s)),
        None => Ok(default),
    }
}

/// `api/v1/` and `/api/v1` both become `/api/v1`; an empty path stays empty.
fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
