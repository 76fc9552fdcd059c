//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Session settings (pace, rounds, breaths per round, cue volume)
//! - Display theme and language
//!
//! Configuration is stored at `~/.config/breathwork/config.toml`.
//! The session machine only ever sees the [`SessionSettings`] snapshot;
//! theme and language are kept here for the UI.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::{ConfigError, CoreError, Result};
use crate::session::{Rounds, SessionSettings};

pub const AVAILABLE_LANGUAGES: [&str; 7] = ["en", "es", "fr", "it", "de", "pt", "zh"];

/// Slider position that older config files used for "no limit".
const LEGACY_UNBOUNDED_ROUNDS: i64 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// UI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".into()
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            language: default_language(),
        }
    }
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/breathwork/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub ui: UiConfig,
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> std::result::Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    // Numeric fields may also hold a word (rounds = "unbounded");
                    // the typed deserialization afterwards decides.
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            serde_json::Value::String(value.into())
                        }
                    }
                    serde_json::Value::String(_) => match value.parse::<u64>() {
                        Ok(n) => serde_json::Value::Number(n.into()),
                        Err(_) => serde_json::Value::String(value.into()),
                    },
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    serde_json::Value::Null => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing defaults if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is not valid TOML, or if the
    /// default config cannot be written.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if it does not exist.
    ///
    /// Individual out-of-range or mistyped settings fall back to their
    /// defaults instead of failing the whole load.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content).map_err(|e| match e {
                CoreError::Config(ConfigError::ParseFailed(message)) => {
                    ConfigError::LoadFailed {
                        path: path.to_path_buf(),
                        message,
                    }
                    .into()
                }
                other => other,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Parse TOML, keeping every valid field and defaulting the rest.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: toml::Table =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        let defaults = Self::default();

        let session = match table.get("session").and_then(|v| v.as_table()) {
            Some(section) => {
                let d = defaults.session;
                SessionSettings {
                    speed: field(section, "session.speed", d.speed),
                    rounds: rounds_field(section, d.rounds),
                    breaths: field(section, "session.breaths", d.breaths),
                    volume: field(section, "session.volume", d.volume),
                }
                .sanitized()
            }
            None => defaults.session,
        };

        let mut ui = match table.get("ui").and_then(|v| v.as_table()) {
            Some(section) => UiConfig {
                theme: field(section, "ui.theme", defaults.ui.theme),
                language: field(section, "ui.language", defaults.ui.language.clone()),
            },
            None => defaults.ui.clone(),
        };
        if !AVAILABLE_LANGUAGES.contains(&ui.language.as_str()) {
            tracing::warn!(language = %ui.language, "unsupported language, using default");
            ui.language = defaults.ui.language;
        }

        Ok(Self { session, ui })
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value in memory by key, validating the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// or is out of range. `self` is unchanged on error.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a value by key and persist.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.set_value(key, value)?;
        self.save()
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.session.validate()?;
        if !AVAILABLE_LANGUAGES.contains(&self.ui.language.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "ui.language".into(),
                message: format!(
                    "'{}' is not one of {}",
                    self.ui.language,
                    AVAILABLE_LANGUAGES.join(", ")
                ),
            });
        }
        Ok(())
    }
}

fn field<T: serde::de::DeserializeOwned>(section: &toml::Table, key: &str, default: T) -> T {
    let name = key.rsplit('.').next().unwrap_or(key);
    match section.get(name) {
        Some(value) => match value.clone().try_into::<T>() {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(key, %err, "invalid config value, using default");
                default
            }
        },
        None => default,
    }
}

/// Only stored files get the legacy reading; `set_value` goes through
/// plain deserialization and rejects 11 like any other out-of-range count.
fn rounds_field(section: &toml::Table, default: Rounds) -> Rounds {
    match section.get("rounds") {
        Some(toml::Value::Integer(LEGACY_UNBOUNDED_ROUNDS)) => Rounds::Unbounded,
        _ => field(section, "session.rounds", default),
    }
}
