use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type AssetId = u64;
pub type ReleaseId = u64;

/// A single downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    #[serde(default)]
    pub label: String,
    pub size_bytes: u64,
}

impl Asset {
    /// Text used for platform matching: the label, or the file name when the
    /// release author left the label empty.
    #[must_use]
    pub fn match_text(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.name
        } else {
            &self.label
        }
    }

    /// Case-insensitive substring match of `token` against [`Self::match_text`].
    #[must_use]
    pub fn matches_token(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        self.match_text()
            .to_ascii_lowercase()
            .contains(&token.to_ascii_lowercase())
    }
}

/// Immutable snapshot of a published release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: ReleaseId,
    pub name: String,
    #[serde(default)]
    pub body: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub is_prerelease: bool,
    #[serde(default)]
    pub assets: BTreeMap<AssetId, Asset>,
}

impl Release {
    /// Find an asset by exact file name.
    #[must_use]
    pub fn asset_named(&self, name: &str) -> Option<&Asset> {
        self.assets.values().find(|asset| asset.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub received: u64,
    pub total: u64,
}

impl TransferProgress {
    /// Percentage of the transfer, or `None` while the total is unknown.
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        if self.total == 0 {
            return None;
        }
        let percent = (self.received.min(self.total) * 100) / self.total;
        u8::try_from(percent).ok()
    }
}
