//! Configuration loading and validation

use crate::error::{AtriumError, AtriumResult, ErrorContext};
use crate::types::{ApiConfig, AtriumConfig, SessionTuning};

use std::path::{Path, PathBuf};

impl Default for AtriumConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            session: SessionTuning::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout_seconds: 30,
            user_agent: "atrium-client/0.1".to_string(),
        }
    }
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            // Sessions are server-side, so validity only needs an
            // occasional confirmation.
            check_interval_secs: 4 * 60 * 60,
            check_jitter_secs: 300,
            gate_warn_secs: 15,
            persist_snapshot: true,
            snapshot_dir: None,
        }
    }
}

impl AtriumConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AtriumResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AtriumError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: AtriumConfig = toml::from_str(&content).map_err(|e| AtriumError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> AtriumResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| AtriumError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| AtriumError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Reject configurations that cannot work at runtime.
    pub fn validate(&self) -> AtriumResult<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(AtriumError::Validation {
                message: "api.base_url must not be empty".to_string(),
                field: Some("api.base_url".to_string()),
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set api.base_url to the backend API root"),
            });
        }

        url::Url::parse(&self.api.base_url).map_err(|e| AtriumError::Config {
            message: format!("api.base_url is not a valid URL: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("validate")
                .with_suggestion("Use an absolute URL like http://localhost:3000/api"),
        })?;

        if self.api.timeout_seconds == 0 {
            return Err(AtriumError::Validation {
                message: "api.timeout_seconds must be greater than 0".to_string(),
                field: Some("api.timeout_seconds".to_string()),
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set api.timeout_seconds to a positive value"),
            });
        }

        if self.session.check_interval_secs == 0 {
            return Err(AtriumError::Validation {
                message: "session.check_interval_secs must be greater than 0".to_string(),
                field: Some("session.check_interval_secs".to_string()),
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set session.check_interval_secs to a positive value"),
            });
        }

        Ok(())
    }
}

impl ApiConfig {
    /// Defaults overlaid with environment variables. `ATRIUM_API_URL`
    /// points the client at a different backend without a config file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("ATRIUM_API_URL") {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }
        config
    }
}

impl SessionTuning {
    /// Directory holding the persisted session snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("atrium")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AtriumConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.check_interval_secs, 14400);
    }

    #[test]
    fn validate_rejects_empty_base_url() {
        let mut config = AtriumConfig::default();
        config.api.base_url = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AtriumError::Validation { field: Some(f), .. } if f == "api.base_url"));
    }

    #[test]
    fn validate_rejects_relative_base_url() {
        let mut config = AtriumConfig::default();
        config.api.base_url = "/api".to_string();
        assert!(matches!(
            config.validate().unwrap_err(),
            AtriumError::Config { .. }
        ));
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        let mut config = AtriumConfig::default();
        config.api.timeout_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = AtriumConfig::default();
        config.session.check_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atrium.toml");

        let mut config = AtriumConfig::default();
        config.api.base_url = "https://erp.example.com/api".to_string();
        config.session.gate_warn_secs = 5;
        config.save_to_file(&path).unwrap();

        let loaded = AtriumConfig::from_file(&path).unwrap();
        assert_eq!(loaded.api.base_url, "https://erp.example.com/api");
        assert_eq!(loaded.session.gate_warn_secs, 5);
        assert_eq!(loaded.api.timeout_seconds, 30);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[api]\nbase_url = \"http://10.0.0.5:3000/api\"\ntimeout_seconds = 10\nuser_agent = \"kiosk\"\n").unwrap();

        let loaded = AtriumConfig::from_file(&path).unwrap();
        assert_eq!(loaded.api.base_url, "http://10.0.0.5:3000/api");
        // Session block omitted entirely, defaults apply.
        assert_eq!(loaded.session.check_jitter_secs, 300);
        assert!(loaded.session.persist_snapshot);
    }

    #[test]
    fn api_config_honors_env_override() {
        std::env::set_var("ATRIUM_API_URL", "http://staging.internal:3000/api");
        let config = ApiConfig::from_env();
        std::env::remove_var("ATRIUM_API_URL");
        assert_eq!(config.base_url, "http://staging.internal:3000/api");
        assert_eq!(config.timeout_seconds, 30);
    }
}
