//! Process configuration, read from the environment (and `.env` when present).

use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_REASONING_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_BLIP_MODEL: &str = "Salesforce/blip-image-captioning-large";
pub const DEFAULT_BLIP_REVISION: &str = "refs/pr/18";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub reasoning_model: String,
    /// Hugging Face repository of the local captioning model.
    pub blip_model: String,
    pub blip_revision: String,
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key =
            non_empty("OPENROUTER_API_KEY").ok_or(ConfigError::Missing("OPENROUTER_API_KEY"))?;

        let port = non_empty("PORT")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let log_format = match non_empty("LOG_FORMAT").as_deref() {
            Some("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        };

        Ok(Self {
            api_key,
            base_url: non_empty("OPENROUTER_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            reasoning_model: non_empty("REASONING_MODEL")
                .unwrap_or_else(|| DEFAULT_REASONING_MODEL.to_string()),
            blip_model: non_empty("BLIP_MODEL").unwrap_or_else(|| DEFAULT_BLIP_MODEL.to_string()),
            blip_revision: non_empty("BLIP_REVISION")
                .unwrap_or_else(|| DEFAULT_BLIP_REVISION.to_string()),
            host: non_empty("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            log_format,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_lookup(lookup_from(&[("OPENROUTER_API_KEY", "sk-test")])).unwrap();

        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.reasoning_model, DEFAULT_REASONING_MODEL);
        assert_eq!(config.blip_model, DEFAULT_BLIP_MODEL);
        assert_eq!(config.blip_revision, DEFAULT_BLIP_REVISION);
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_missing_api_key() {
        let err = Config::from_lookup(lookup_from(&[("OPENROUTER_API_KEY", "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("OPENROUTER_API_KEY"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("OPENROUTER_BASE_URL", "http://localhost:9000/v1/"),
            ("REASONING_MODEL", "anthropic/claude-sonnet-4"),
            ("BLIP_MODEL", "Salesforce/blip-image-captioning-base"),
            ("BLIP_REVISION", "main"),
            ("PORT", "not-a-port"),
            ("LOG_FORMAT", "pretty"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "http://localhost:9000/v1");
        assert_eq!(config.reasoning_model, "anthropic/claude-sonnet-4");
        assert_eq!(config.blip_model, "Salesforce/blip-image-captioning-base");
        assert_eq!(config.blip_revision, "main");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }
}
