//! Application configuration loaded from TOML.
//!
//! ```toml
//! [models]
//! heart = "models/heart.json"
//! diabetes = "models/diabetes.toml"
//!
//! [appointments]
//! booking_base_url = "https://example.org/book"
//! ```
//!
//! Relative model paths are resolved against the directory holding the
//! configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::Disease;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to write configuration: {0}")]
    Write(#[from] std::io::Error),
}

/// Artifact path per disease. Absent entries mean the disease is unavailable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diabetes: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kidney: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liver: Option<PathBuf>,
}

impl ModelPaths {
    pub fn get(&self, disease: Disease) -> Option<&Path> {
        let entry = match disease {
            Disease::Heart => &self.heart,
            Disease::Diabetes => &self.diabetes,
            Disease::Kidney => &self.kidney,
            Disease::Liver => &self.liver,
        };
        entry.as_deref()
    }

    pub fn set(&mut self, disease: Disease, path: impl Into<PathBuf>) {
        let entry = match disease {
            Disease::Heart => &mut self.heart,
            Disease::Diabetes => &mut self.diabetes,
            Disease::Kidney => &mut self.kidney,
            Disease::Liver => &mut self.liver,
        };
        *entry = Some(path.into());
    }
}

/// Without a base URL, appointments are recorded with no booking link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_base_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub models: ModelPaths,
    #[serde(default)]
    pub appointments: AppointmentSettings,
    /// Directory relative model paths are resolved against.
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AppConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The configured artifact for `disease`, resolved against the config directory.
    pub fn model_path(&self, disease: Disease) -> Option<PathBuf> {
        let configured = self.models.get(disease)?;
        Some(match &self.base_dir {
            Some(base) if configured.is_relative() => base.join(configured),
            _ => configured.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn relative_model_paths_resolve_against_the_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clinpredict.toml");
        fs::write(
            &path,
            "[models]\nheart = \"models/heart.json\"\nliver = \"/opt/liver.toml\"\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(
            config.model_path(Disease::Heart),
            Some(dir.path().join("models/heart.json"))
        );
        assert_eq!(config.model_path(Disease::Liver), Some(PathBuf::from("/opt/liver.toml")));
        assert_eq!(config.model_path(Disease::Kidney), None);
        assert_eq!(config.appointments.booking_base_url, None);
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn unknown_disease_entry_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[models]\nlung = \"lung.json\"\n").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn save_then_load_keeps_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = AppConfig::default();
        config.models.set(Disease::Diabetes, "diabetes.json");
        config.appointments.booking_base_url = Some("https://clinic.test/book".into());
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.models, config.models);
        assert_eq!(loaded.appointments, config.appointments);
        assert_eq!(loaded.model_path(Disease::Diabetes), Some(dir.path().join("diabetes.json")));
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = AppConfig::load(Path::new("/nonexistent/clinpredict.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/clinpredict.toml"));
    }
}
