use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogSettings;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub loki_url: Option<String>,
    pub service_name: String,
    pub environment: String,
    pub log_level: String,
}

impl LoggingConfig {
    pub fn from_settings(settings: &LogSettings) -> Self {
        Self {
            loki_url: settings.loki_url.clone().filter(|url| !url.is_empty()),
            service_name: "lotfolio".to_string(),
            environment: settings.environment.clone(),
            // RUST_LOG still wins for ad-hoc debugging
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| settings.level.clone()),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = &self.loki_url {
            url::Url::parse(url).map_err(|e| format!("Invalid loki_url {}: {}", url, e))?;
        }
        if self.log_level.trim().is_empty() {
            return Err("logging.level must not be empty".to_string());
        }
        Ok(())
    }
}

pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    #[cfg(feature = "loki")]
    {
        if let Some(loki_url) = config.loki_url.clone() {
            return init_with_loki(config, &loki_url);
        }
    }

    init_console_only(config)
}

fn init_console_only(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    tracing::info!("📊 Console logging initialized ({})", config.environment);
    Ok(())
}

#[cfg(feature = "loki")]
fn init_with_loki(config: LoggingConfig, loki_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = url::Url::parse(loki_url)?;

    let (loki_layer, task) = tracing_loki::builder()
        .label("service", &config.service_name)?
        .label("environment", &config.environment)?
        .build_url(url)?;

    // Background task that ships log batches to Loki
    tokio::spawn(task);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .with(loki_layer)
        .try_init()?;

    tracing::info!("✅ Loki logging initialized at {}", loki_url);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(loki_url: Option<&str>) -> LogSettings {
        LogSettings {
            level: "debug".into(),
            loki_url: loki_url.map(String::from),
            environment: "test".into(),
        }
    }

    #[test]
    fn test_empty_loki_url_means_console_only() {
        let config = LoggingConfig::from_settings(&settings(Some("")));
        assert!(config.loki_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_loki_url_is_rejected() {
        let config = LoggingConfig::from_settings(&settings(Some("not a url")));
        assert!(config.validate().is_err());
    }
}
