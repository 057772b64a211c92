use std::time::Duration;

use serde::{Deserialize, Serialize};
use updraft_release::RepositoryEndpoint;

use crate::extract::ExtractorStrategy;

/// Runtime-adjustable updater settings. A new value can be pushed to a
/// running orchestrator at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Seconds between periodic checks; `0` turns periodic checks off.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    #[serde(default)]
    pub use_prereleases: bool,

    /// Where application releases are published. Left unset, no checks run.
    #[serde(default)]
    pub repository: Option<RepositoryEndpoint>,

    #[serde(default = "default_helper_repository")]
    pub helper_repository: RepositoryEndpoint,

    /// Base name of the helper binary inside its package; `.exe` is appended
    /// on Windows.
    #[serde(default = "default_helper_executable_name")]
    pub helper_executable_name: String,

    #[serde(default)]
    pub extractor: ExtractorStrategy,
}

fn default_refresh_interval_secs() -> u64 {
    3600
}

fn default_helper_repository() -> RepositoryEndpoint {
    RepositoryEndpoint::github("PTDreamer", "copyApp")
}

fn default_helper_executable_name() -> String {
    "copyApp".to_string()
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            use_prereleases: false,
            repository: None,
            helper_repository: default_helper_repository(),
            helper_executable_name: default_helper_executable_name(),
            extractor: ExtractorStrategy::default(),
        }
    }
}

impl UpdaterConfig {
    /// Interval for the periodic timer, or `None` when periodic checks are
    /// off.
    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}
