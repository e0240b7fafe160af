//! Settings persistence.
//!
//! Settings live in `settings.json` under the platform config directory. A
//! missing file means "use defaults"; a file that exists but does not parse is
//! an error rather than being silently replaced.

use anyhow::{Context, Result};
use shared::settings::Settings;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of the current settings, consulted once per request.
pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> Result<Settings>;
}

impl SettingsProvider for Settings {
    fn settings(&self) -> Result<Settings> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/settings.json` for this platform.
    pub fn default_location() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("com.local", "XandAI", "XandAI")
            .context("could not determine a config directory")?;
        Ok(Self::new(dirs.config_dir().join("settings.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("malformed settings file {}", self.path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no settings file, using defaults");
                Ok(Settings::default())
            }
            Err(e) => Err(e)
                .with_context(|| format!("failed to read settings from {}", self.path.display())),
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write settings to {}", self.path.display()))
    }

    /// Load, modify, save. Returns the saved settings.
    pub fn update(&self, change: impl FnOnce(&mut Settings)) -> Result<Settings> {
        let mut settings = self.load()?;
        change(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}

impl SettingsProvider for FileSettingsStore {
    fn settings(&self) -> Result<Settings> {
        self.load()
    }
}

/// Stored settings, then environment overrides, then per-invocation overrides.
#[derive(Debug, Clone)]
pub struct LayeredSettings {
    store: FileSettingsStore,
    url: Option<String>,
    model: Option<String>,
}

impl LayeredSettings {
    pub fn new(store: FileSettingsStore, url: Option<String>, model: Option<String>) -> Self {
        Self { store, url, model }
    }
}

impl SettingsProvider for LayeredSettings {
    fn settings(&self) -> Result<Settings> {
        Ok(self
            .store
            .load()?
            .with_env_overrides()
            .with_overrides(self.url.clone(), self.model.clone()))
    }
}
