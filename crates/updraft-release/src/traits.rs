use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RepositoryError;
use crate::types::{AssetId, Release, TransferProgress};

/// Remote source of releases and their downloadable assets.
#[async_trait]
pub trait ReleaseRepository: Send + Sync {
    /// Human readable identifier, used in log lines.
    fn describe(&self) -> String;

    /// List published releases in the repository's own order. Prereleases are
    /// filtered out unless `include_prerelease` is set.
    async fn list_releases(&self, include_prerelease: bool)
    -> Result<Vec<Release>, RepositoryError>;

    /// The release the repository marks as latest (never a prerelease).
    async fn latest_release(&self) -> Result<Release, RepositoryError>;

    /// Download the raw bytes of an asset, reporting transfer progress while
    /// the body streams in. The progress sender is dropped when the download
    /// finishes.
    async fn download_asset(
        &self,
        asset_id: AssetId,
        progress: mpsc::Sender<TransferProgress>,
    ) -> Result<Vec<u8>, RepositoryError>;
}
