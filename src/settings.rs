use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::filename::DEFAULT_OUTPUT_TEMPLATE;
use crate::pdf::{CompressionLevel, ExecutionMode, PageFailurePolicy};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pdfshrink";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid settings in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub level: CompressionLevel,

    #[serde(default)]
    pub fast_mode: bool,

    #[serde(default)]
    pub execution: ExecutionMode,

    #[serde(default)]
    pub page_failure: PageFailurePolicy,

    /// Output file name, see [`crate::filename::compressed_output_path`]
    #[serde(default = "default_output_template")]
    pub output_template: String,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_output_template() -> String {
    DEFAULT_OUTPUT_TEMPLATE.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            level: CompressionLevel::default(),
            fast_mode: false,
            execution: ExecutionMode::default(),
            page_failure: PageFailurePolicy::default(),
            output_template: default_output_template(),
        }
    }
}

/// `<config dir>/pdfshrink/config.yaml`
pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings, falling back to defaults on any problem.
///
/// With no explicit path the default location is used, and a commented
/// defaults file is written there on first run.
pub fn load_settings(explicit: Option<&Path>) -> Settings {
    if let Some(path) = explicit {
        return load_or_default(path);
    }

    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return Settings::default();
    };
    if path.exists() {
        return load_or_default(&path);
    }

    info!("Settings file not found, creating with defaults at {path:?}");
    let settings = Settings::default();
    if let Err(e) = save_settings_to_file(&settings, &path) {
        error!("{e}");
    }
    settings
}

fn load_or_default(path: &Path) -> Settings {
    match load_settings_from_path(path) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e}");
            Settings::default()
        }
    }
}

/// Read and migrate a settings file; the file is rewritten after a migration
pub fn load_settings_from_path(path: &Path) -> Result<Settings, SettingsError> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut settings =
        serde_yaml::from_str::<Settings>(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("Loaded settings from {path:?}");

    if settings.version < CURRENT_VERSION {
        migrate_settings(&mut settings);
        if let Err(e) = save_settings_to_file(&settings, path) {
            warn!("Migrated settings could not be saved: {e}");
        }
    }

    Ok(settings)
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    fs::write(path, generate_settings_yaml(settings)).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Saved settings to {path:?}");
    Ok(())
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let execution = match settings.execution {
        ExecutionMode::Auto => "auto",
        ExecutionMode::Worker => "worker",
        ExecutionMode::Inline => "inline",
    };
    let page_failure = match settings.page_failure {
        PageFailurePolicy::Skip => "skip",
        PageFailurePolicy::Abort => "abort",
    };

    let mut content = String::new();
    content.push_str(&format!("version: {}\n", settings.version));
    content.push('\n');
    content.push_str("# low | medium | high | extreme\n");
    content.push_str(&format!("level: {}\n", settings.level.as_str()));
    content.push_str("# Caps render scale for quicker runs\n");
    content.push_str(&format!("fast_mode: {}\n", settings.fast_mode));
    content.push_str("# auto | worker | inline\n");
    content.push_str(&format!("execution: {execution}\n"));
    content.push_str("# skip: drop pages that fail to render; abort: fail the whole file\n");
    content.push_str(&format!("page_failure: {page_failure}\n"));
    content.push_str("# Placeholders: {{stem}} {{savings}} {{level}}\n");
    content.push_str(&format!(
        "output_template: \"{}\"\n",
        settings.output_template.replace('\\', "\\\\").replace('"', "\\\"")
    ));
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_round_trip_through_generated_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let settings = Settings {
            level: CompressionLevel::Extreme,
            fast_mode: true,
            execution: ExecutionMode::Inline,
            page_failure: PageFailurePolicy::Abort,
            ..Settings::default()
        };
        save_settings_to_file(&settings, &path).unwrap();

        assert_eq!(load_settings_from_path(&path).unwrap(), settings);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let settings: Settings = serde_yaml::from_str("level: high\n").unwrap();
        assert_eq!(settings.level, CompressionLevel::High);
        assert_eq!(settings.version, CURRENT_VERSION);
        assert_eq!(settings.page_failure, PageFailurePolicy::Skip);
        assert_eq!(settings.output_template, DEFAULT_OUTPUT_TEMPLATE);
    }

    #[test]
    fn unknown_level_falls_back_to_medium() {
        let settings: Settings = serde_yaml::from_str("level: ultra\n").unwrap();
        assert_eq!(settings.level, CompressionLevel::Medium);
    }

    #[test]
    fn old_version_is_migrated_and_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 0\nfast_mode: true\n").unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.version, CURRENT_VERSION);
        assert!(settings.fast_mode);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.starts_with(&format!("version: {CURRENT_VERSION}\n")));
    }

    #[test]
    fn broken_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "execution: [not, a, mode]\n").unwrap();

        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Parse { .. })
        ));
        assert_eq!(load_settings(Some(&path)), Settings::default());
    }

    #[test]
    fn missing_explicit_file_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let err = load_settings_from_path(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }
}
