//! Configuration management for the placement predictor.
//!
//! Settings come from built-in defaults, optionally overlaid by a JSON or
//! TOML file, then by command line flags and environment variables (see
//! `main.rs`).
//!
//! # Example settings.toml
//!
//! ```toml
//! port = 8080
//! data_dir = "/var/lib/placement"
//!
//! [database]
//! name = "placement_predictor"
//! timeout_ms = 1500
//!
//! [model]
//! source = "file"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PredictorError, Result};
use crate::model::ModelSource;
use crate::store::file::COUNTER_FILE;
use crate::store::DEFAULT_MEMORY_EVENTS;

/// Default port, matching the `PORT` fallback of the hosted app.
pub const DEFAULT_PORT: u16 = 5000;

/// Default model file name inside the data directory.
pub const MODEL_FILE: &str = "model.json";

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

/// MongoDB settings. The database tier is enabled only when `uri` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string; never serialized so config dumps can't leak it.
    #[serde(skip_serializing)]
    pub uri: Option<String>,
    /// Database name.
    pub name: String,
    /// Server selection and connect timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: None,
            name: "placement_predictor".to_string(),
            timeout_ms: 2000,
        }
    }
}

impl DatabaseConfig {
    /// Whether a non-blank connection string is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.uri.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

/// Where the predictor's coefficients come from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub source: ModelSource,
    /// Model file for [`ModelSource::File`]; defaults to `<data_dir>/model.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Full application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the counter file, event logs and model file.
    pub data_dir: PathBuf,
    pub database: DatabaseConfig,
    pub model: ModelConfig,
    /// When set, `/debug` and `/admin/*` require a matching `x-admin-token` header.
    #[serde(skip_serializing)]
    pub admin_token: Option<String>,
    /// Lifetime of the visitor cookie.
    pub cookie_max_age_days: i64,
    /// Feedback entries shown on the home page.
    pub recent_feedback: usize,
    /// Event records kept in process memory when no durable tier accepts them.
    pub memory_events: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            data_dir: default_data_dir(),
            database: DatabaseConfig::default(),
            model: ModelConfig::default(),
            admin_token: None,
            cookie_max_age_days: 365,
            recent_feedback: 5,
            memory_events: DEFAULT_MEMORY_EVENTS,
        }
    }
}

impl AppConfig {
    /// Loads a settings file, choosing TOML or JSON by extension.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file can't be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PredictorError::config_with_path(format!("cannot read settings: {e}"), path.to_path_buf())
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let parsed: std::result::Result<Self, String> = if is_toml {
            toml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|e| {
            PredictorError::config_with_path(format!("cannot parse settings: {e}"), path.to_path_buf())
        })
    }

    /// Loads `path` when given, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Propagates [`AppConfig::load`] errors.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Checks values that serde can't.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(PredictorError::invalid_config("host", "must not be empty"));
        }
        if self.database.name.is_empty()
            || self
                .database
                .name
                .chars()
                .any(|c| matches!(c, '/' | '\\' | '.' | ' ' | '"' | '$'))
        {
            return Err(PredictorError::invalid_config(
                "database.name",
                format!("'{}' is not a valid MongoDB database name", self.database.name),
            ));
        }
        if !(1..=60_000).contains(&self.database.timeout_ms) {
            return Err(PredictorError::invalid_config(
                "database.timeout_ms",
                "must be between 1 and 60000",
            ));
        }
        if !(1..=3650).contains(&self.cookie_max_age_days) {
            return Err(PredictorError::invalid_config(
                "cookie_max_age_days",
                "must be between 1 and 3650",
            ));
        }
        if self.memory_events == 0 {
            return Err(PredictorError::invalid_config(
                "memory_events",
                "must be at least 1",
            ));
        }
        if self.admin_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(PredictorError::invalid_config(
                "admin_token",
                "must not be blank when set",
            ));
        }
        Ok(())
    }

    /// Path of the JSON counter file.
    #[must_use]
    pub fn counter_file(&self) -> PathBuf {
        self.data_dir.join(COUNTER_FILE)
    }

    /// Path of the model file.
    #[must_use]
    pub fn model_file(&self) -> PathBuf {
        self.model
            .file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(MODEL_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.host, "0.0.0.0");
        assert!(!config.database.is_configured());
        assert_eq!(config.model.source, ModelSource::Hardcoded);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memory_events_must_be_positive() {
        let config = AppConfig {
            memory_events: 0,
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("memory_events"));
    }

    #[test]
    fn test_paths_follow_data_dir() {
        let config = AppConfig {
            data_dir: PathBuf::from("/srv/app"),
            ..AppConfig::default()
        };
        assert_eq!(config.counter_file(), PathBuf::from("/srv/app/counter.json"));
        assert_eq!(config.model_file(), PathBuf::from("/srv/app/model.json"));
    }

    #[test]
    fn test_load_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.toml");
        std::fs::write(
            &path,
            r#"
port = 8080

[database]
name = "campus"

[model]
source = "fitted"
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.database.name, "campus");
        assert_eq!(config.database.timeout_ms, 2000);
        assert_eq!(config.model.source, ModelSource::Fitted);
    }

    #[test]
    fn test_load_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        std::fs::write(&path, r#"{"data_dir": "/tmp/x", "recent_feedback": 2}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.recent_feedback, 2);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_load_invalid_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        std::fs::write(&path, "{ port: ").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, PredictorError::Config { path: Some(_), .. }));
    }

    #[test]
    fn test_load_or_default_without_path() {
        assert_eq!(AppConfig::load_or_default(None).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.database.name = "bad.name".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.timeout_ms = 0;
        assert!(config.validate().is_err());

        let config = AppConfig {
            cookie_max_age_days: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            admin_token: Some("  ".to_string()),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let mut config = AppConfig {
            admin_token: Some("hunter2".to_string()),
            ..AppConfig::default()
        };
        config.database.uri = Some("mongodb://user:pw@db:27017".to_string());

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("pw@db"));
    }
}
