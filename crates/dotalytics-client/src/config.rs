use dotalytics_core::AppError;
use url::Url;

/// Connection settings for the OpenDota API.
#[derive(Debug, Clone)]
pub struct OpenDotaConfig {
    pub base_url: String,
    /// Outbound request budget per minute (free tier allows 60).
    pub rate_limit_per_minute: usize,
    pub timeout_secs: u64,
}

impl Default for OpenDotaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.opendota.com".to_string(),
            rate_limit_per_minute: 60,
            timeout_secs: 30,
        }
    }
}

impl OpenDotaConfig {
    /// Read configuration from environment variables.
    ///
    /// - `OPENDOTA_BASE_URL` (optional, defaults to the public API)
    /// - `OPENDOTA_RATE_LIMIT_PER_MINUTE` (optional, defaults to 60)
    /// - `OPENDOTA_TIMEOUT_SECS` (optional, defaults to 30)
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("OPENDOTA_BASE_URL") {
            Url::parse(&raw).map_err(|e| {
                AppError::ConfigError(format!("Invalid OPENDOTA_BASE_URL '{raw}': {e}"))
            })?;
            config.base_url = raw.trim_end_matches('/').to_string();
        }
        if let Ok(raw) = std::env::var("OPENDOTA_RATE_LIMIT_PER_MINUTE") {
            config.rate_limit_per_minute = raw.parse().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid OPENDOTA_RATE_LIMIT_PER_MINUTE '{raw}': must be a positive integer"
                ))
            })?;
        }
        if let Ok(raw) = std::env::var("OPENDOTA_TIMEOUT_SECS") {
            config.timeout_secs = raw.parse().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid OPENDOTA_TIMEOUT_SECS '{raw}': must be a positive integer"
                ))
            })?;
        }

        Ok(config)
    }
}
