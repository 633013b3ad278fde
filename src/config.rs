use serde::Deserialize;

use crate::services::job_scheduler_service::cron_expression;

const DEFAULT_CONFIG_PATH: &str = "config/lotfolio.yaml";
const MIN_JWT_SECRET_BYTES: usize = 32;

/// Runtime configuration.
///
/// Sources, later ones winning: built-in defaults, an optional YAML file
/// (`LOTFOLIO_CONFIG`, default `config/lotfolio.yaml`), then environment
/// variables prefixed `LOTFOLIO_` with `__` between nested keys, e.g.
/// `LOTFOLIO_AUTH__JWT_SECRET`. Plain `DATABASE_URL` and `JWT_SECRET` are
/// honoured last.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub market_data: MarketDataConfig,
    pub email: EmailConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LogSettings,
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub remember_me_access_minutes: i64,
    pub remember_me_refresh_days: i64,
    pub reset_token_minutes: i64,
}

// Keep the secret out of logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("access_token_minutes", &self.access_token_minutes)
            .field("refresh_token_days", &self.refresh_token_days)
            .field("remember_me_access_minutes", &self.remember_me_access_minutes)
            .field("remember_me_refresh_days", &self.remember_me_refresh_days)
            .field("reset_token_minutes", &self.reset_token_minutes)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    /// `twelvedata`, `alphavantage` or `none`.
    pub provider: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from_address: String,
    pub from_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: String,
    #[serde(default)]
    pub loki_url: Option<String>,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    pub enabled: bool,
    pub credential_cleanup: String,
    pub corporate_action_detection: String,
    pub performance_snapshots: String,
}

fn default_max_connections() -> u32 {
    10
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let path =
            std::env::var("LOTFOLIO_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let config = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("auth.access_token_minutes", 30)?
            .set_default("auth.refresh_token_days", 7)?
            .set_default("auth.remember_me_access_minutes", 120)?
            .set_default("auth.remember_me_refresh_days", 30)?
            .set_default("auth.reset_token_minutes", 60)?
            .set_default("market_data.provider", "none")?
            .set_default("market_data.cache_ttl_secs", 900)?
            .set_default("email.enabled", false)?
            .set_default("email.host", "localhost")?
            .set_default("email.port", 587)?
            .set_default("email.from_address", "noreply@lotfolio.local")?
            .set_default("email.from_name", "Lotfolio")?
            .set_default("rate_limit.requests_per_window", 20)?
            .set_default("rate_limit.window_secs", 60)?
            .set_default("logging.level", "info")?
            .set_default("logging.environment", "development")?
            .set_default("jobs.enabled", true)?
            .set_default("jobs.credential_cleanup", "@daily")?
            .set_default("jobs.corporate_action_detection", "@hourly")?
            .set_default("jobs.performance_snapshots", "@daily")?
            .add_source(config::File::new(&path, config::FileFormat::Yaml).required(false))
            .add_source(
                config::Environment::with_prefix("LOTFOLIO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database_url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("auth.jwt_secret", std::env::var("JWT_SECRET").ok())?
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.trim().is_empty() {
            return Err("database_url must be set".to_string());
        }
        if self.auth.jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(format!(
                "auth.jwt_secret must be at least {} bytes",
                MIN_JWT_SECRET_BYTES
            ));
        }
        let durations = [
            ("auth.access_token_minutes", self.auth.access_token_minutes),
            ("auth.refresh_token_days", self.auth.refresh_token_days),
            ("auth.remember_me_access_minutes", self.auth.remember_me_access_minutes),
            ("auth.remember_me_refresh_days", self.auth.remember_me_refresh_days),
            ("auth.reset_token_minutes", self.auth.reset_token_minutes),
        ];
        if let Some((key, _)) = durations.iter().find(|(_, value)| *value <= 0) {
            return Err(format!("{} must be positive", key));
        }
        match self.market_data.provider.to_lowercase().as_str() {
            "none" => {}
            "twelvedata" | "alphavantage" => {
                if self.market_data.api_key.as_deref().unwrap_or("").is_empty() {
                    return Err(format!(
                        "market_data.api_key is required for provider {}",
                        self.market_data.provider
                    ));
                }
            }
            other => {
                return Err(format!(
                    "Invalid market_data.provider: {}. Must be 'twelvedata', 'alphavantage' or 'none'",
                    other
                ))
            }
        }
        let schedules = [
            ("jobs.credential_cleanup", &self.jobs.credential_cleanup),
            ("jobs.corporate_action_detection", &self.jobs.corporate_action_detection),
            ("jobs.performance_snapshots", &self.jobs.performance_snapshots),
        ];
        for (key, schedule) in schedules {
            cron_expression(schedule).map_err(|e| format!("{}: {}", key, e))?;
        }
        if self.rate_limit.requests_per_window == 0 || self.rate_limit.window_secs == 0 {
            return Err("rate_limit values must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/lotfolio_test".into(),
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 3000,
            max_connections: 5,
        },
        auth: AuthConfig {
            jwt_secret: "0123456789abcdef0123456789abcdef".into(),
            access_token_minutes: 30,
            refresh_token_days: 7,
            remember_me_access_minutes: 120,
            remember_me_refresh_days: 30,
            reset_token_minutes: 60,
        },
        market_data: MarketDataConfig {
            provider: "none".into(),
            api_key: None,
            cache_ttl_secs: 900,
        },
        email: EmailConfig {
            enabled: false,
            host: "localhost".into(),
            port: 587,
            username: None,
            password: None,
            from_address: "noreply@lotfolio.local".into(),
            from_name: "Lotfolio".into(),
        },
        rate_limit: RateLimitConfig {
            requests_per_window: 20,
            window_secs: 60,
        },
        logging: LogSettings {
            level: "info".into(),
            loki_url: None,
            environment: "test".into(),
        },
        jobs: JobsConfig {
            enabled: false,
            credential_cleanup: "@daily".into(),
            corporate_action_detection: "@hourly".into(),
            performance_snapshots: "@daily".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config_passes() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_unknown_schedule_is_rejected() {
        let mut config = test_config();
        config.jobs.performance_snapshots = "@weekly".into();
        assert!(config.validate().unwrap_err().contains("jobs.performance_snapshots"));
    }

    #[test]
    fn test_short_secret_is_rejected() {
        let mut config = test_config();
        config.auth.jwt_secret = "too-short".into();
        assert!(config.validate().unwrap_err().contains("jwt_secret"));
    }

    #[test]
    fn test_provider_requires_api_key() {
        let mut config = test_config();
        config.market_data.provider = "twelvedata".into();
        assert!(config.validate().is_err());
        config.market_data.api_key = Some("key".into());
        assert!(config.validate().is_ok());
        config.market_data.provider = "yahoo".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let printed = format!("{:?}", test_config().auth);
        assert!(!printed.contains("0123456789abcdef"));
    }
}
