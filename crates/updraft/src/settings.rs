use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use updraft_core::{LocalBuild, UpdaterConfig};

/// Compiled-in revision string, e.g. `"main:a1b2c3d 20241201"`.
const BUILD_REVISION: Option<&str> = option_env!("UPDRAFT_BUILD_REVISION");
/// Compiled-in object definition hash.
const BUILD_CONTENT_HASH: Option<&str> = option_env!("UPDRAFT_CONTENT_HASH");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub updater: UpdaterConfig,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    /// Replaces the compiled-in build identity, for builds made without one.
    #[serde(default)]
    pub local_build: Option<LocalBuildOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalBuildOverride {
    pub build_date: NaiveDate,
    #[serde(default)]
    pub content_hash: String,
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            updater: UpdaterConfig::default(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
            local_build: None,
        }
    }
}

impl AppSettings {
    /// Read settings, falling back to defaults when the file is missing or
    /// unreadable.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|error| {
                log::warn!("Ignoring invalid settings in {}: {error}", path.display());
                Self::default()
            }),
            Err(error) => {
                log::warn!("Cannot read {}: {error}", path.display());
                Self::default()
            }
        }
    }

    /// Parse settings without falling back, for hot reload where a
    /// half-written file must not replace the running configuration.
    pub fn try_load_from(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Identity of the running build: the settings override when present,
    /// otherwise the revision compiled into the binary.
    pub fn local_build(&self) -> Option<LocalBuild> {
        if let Some(local) = &self.local_build {
            return Some(LocalBuild::new(local.build_date, local.content_hash.clone()));
        }
        LocalBuild::from_revision(BUILD_REVISION?, BUILD_CONTENT_HASH.unwrap_or_default())
    }
}
