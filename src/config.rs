use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Filesystem mount whose usage feeds the disk gauge.
    #[serde(default = "default_disk_mount")]
    pub disk_mount: String,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            disk_mount: default_disk_mount(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("config validation error: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.disk_mount.trim().is_empty() {
            return Err(ConfigError::Validation(
                "disk_mount must not be empty".to_string(),
            ));
        }

        let classifier = &self.classifier;
        if classifier.endpoint_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "classifier.endpoint_url must not be empty".to_string(),
            ));
        }
        if !classifier.endpoint_url.starts_with("http://")
            && !classifier.endpoint_url.starts_with("https://")
        {
            return Err(ConfigError::Validation(
                "classifier.endpoint_url must be an http(s) URL".to_string(),
            ));
        }
        if classifier.model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "classifier.model must not be empty".to_string(),
            ));
        }
        if classifier.api_key_env.trim().is_empty() {
            return Err(ConfigError::Validation(
                "classifier.api_key_env must not be empty".to_string(),
            ));
        }
        if classifier.timeout_secs < 1 {
            return Err(ConfigError::Validation(
                "classifier.timeout_secs must be >= 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn default_disk_mount() -> String {
    "/".to_string()
}

fn default_endpoint_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_api_key_env() -> String {
    "ENTROPY_SYNC_API_KEY".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default()
            .validate()
            .expect("built-in defaults must validate");
    }

    #[test]
    fn example_yaml_parses_and_validates() {
        let cfg: Config =
            serde_yaml::from_str(Config::example_yaml()).expect("example config must parse");
        cfg.validate().expect("example config must validate");
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        let mut cfg = Config::default();
        cfg.classifier.endpoint_url = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_http_endpoint_is_rejected() {
        let mut cfg = Config::default();
        cfg.classifier.endpoint_url = "ftp://example.com".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut cfg = Config::default();
        cfg.classifier.timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: Config = serde_yaml::from_str("classifier:\n  model: llama3\n")
            .expect("partial config must parse");
        assert_eq!(cfg.classifier.model, "llama3");
        assert_eq!(cfg.classifier.timeout_secs, 30);
        assert_eq!(cfg.disk_mount, "/");
    }
}
