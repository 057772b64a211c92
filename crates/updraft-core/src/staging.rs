use std::path::{Path, PathBuf};

use log::{debug, warn};
use tokio::io::AsyncWriteExt;

use crate::error::UpdateError;

const STAGING_PREFIX: &str = ".tmp";

/// Per-session working directory holding downloaded archives and their
/// extracted trees.
///
/// The directory outlives the session: the helper reads the extracted
/// application from it after this process exits. Leftovers are removed by
/// [`cleanup_stale_staging`] on the next start.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Create a fresh uniquely named directory under `staging_root`.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn create(staging_root: &Path) -> Result<Self, UpdateError> {
        std::fs::create_dir_all(staging_root).map_err(|error| {
            UpdateError::io_with_path("failed to create staging root", staging_root, &error)
        })?;
        let temp_dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(staging_root)
            .map_err(|error| UpdateError::io("failed to create staging directory", error))?;
        let root = temp_dir.keep();
        debug!("Created staging directory {}", root.display());
        Ok(Self { root })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Extraction target for the application package.
    #[must_use]
    pub fn package_dir(&self) -> PathBuf {
        self.root.join("package")
    }

    /// Extraction target for the helper package.
    #[must_use]
    pub fn helper_dir(&self) -> PathBuf {
        self.root.join("helper")
    }

    /// Write downloaded bytes to a file named after the asset.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub async fn write_asset(&self, asset_name: &str, bytes: &[u8]) -> Result<PathBuf, UpdateError> {
        let path = self.root.join(sanitize_file_name(asset_name));
        let mut file = tokio::fs::File::create(&path).await.map_err(|error| {
            UpdateError::io_with_path("failed to create download file", &path, &error)
        })?;
        file.write_all(bytes).await.map_err(|error| {
            UpdateError::io_with_path("failed to write download data", &path, &error)
        })?;
        file.flush().await.map_err(|error| {
            UpdateError::io_with_path("failed to flush download file", &path, &error)
        })?;
        debug!("Staged {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }
}

fn sanitize_file_name(raw: &str) -> &str {
    Path::new(raw)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && !name.contains(".."))
        .unwrap_or("update-download")
}

/// Remove staging directories left behind by earlier runs. Returns how many
/// were removed.
pub fn cleanup_stale_staging(staging_root: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(staging_root) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() && entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
            debug!("Cleaning up update staging dir: {}", path.display());
            match std::fs::remove_dir_all(&path) {
                Ok(()) => removed += 1,
                Err(error) => warn!("Failed to remove {}: {error}", path.display()),
            }
        }
    }
    removed
}
