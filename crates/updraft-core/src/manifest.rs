use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::debug;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use updraft_release::{Release, ReleaseRepository, RepositoryError};

/// File name of the version descriptor bundled with every release.
pub const MANIFEST_ASSET_NAME: &str = "packageversioninfo.json";

const MANIFEST_DATE_FORMAT: &str = "%Y%m%d %H:%M";
const BUILD_DATE_FORMAT: &str = "%Y%m%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("release has no {MANIFEST_ASSET_NAME} asset")]
    Missing,
    #[error("failed to download version manifest: {0}")]
    Download(#[source] RepositoryError),
    #[error("version manifest is not valid JSON: {0}")]
    Json(String),
    #[error("version manifest has no package_info object")]
    MissingPackageInfo,
    #[error("version manifest date {0:?} does not match yyyyMMdd hh:mm")]
    InvalidDate(String),
}

/// Identity of the build that is currently running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBuild {
    pub build_date: NaiveDate,
    pub content_hash: String,
}

impl LocalBuild {
    #[must_use]
    pub fn new(build_date: NaiveDate, content_hash: impl Into<String>) -> Self {
        Self {
            build_date,
            content_hash: content_hash.into(),
        }
    }

    /// Build from a revision string whose last whitespace separated token is
    /// the build date as `yyyyMMdd`, e.g. `"next:a1b2c3d 20241201"`.
    #[must_use]
    pub fn from_revision(revision: &str, content_hash: impl Into<String>) -> Option<Self> {
        let date = revision.split_whitespace().last()?;
        let build_date = NaiveDate::parse_from_str(date, BUILD_DATE_FORMAT).ok()?;
        Some(Self::new(build_date, content_hash))
    }

    fn build_timestamp(&self) -> NaiveDateTime {
        self.build_date.and_time(NaiveTime::MIN)
    }
}

/// Version facts derived from a release's manifest, relative to the local
/// build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageVersionInfo {
    pub content_hash: String,
    pub content_hash_text: String,
    pub build_date: NaiveDateTime,
    pub is_newer: bool,
    pub content_differs: bool,
}

/// Parse manifest bytes and compare them against `local`.
///
/// # Errors
/// Returns an error when the bytes are not JSON, `package_info` is missing, or
/// its `date` is missing or not in `yyyyMMdd hh:mm` layout.
pub fn parse_manifest(bytes: &[u8], local: &LocalBuild) -> Result<PackageVersionInfo, ManifestError> {
    let document: Value =
        serde_json::from_slice(bytes).map_err(|error| ManifestError::Json(error.to_string()))?;

    let info = document
        .get("package_info")
        .and_then(Value::as_object)
        .ok_or(ManifestError::MissingPackageInfo)?;

    let text_field = |key: &str| {
        info.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let raw_date = text_field("date");
    let build_date = NaiveDateTime::parse_from_str(raw_date.trim(), MANIFEST_DATE_FORMAT)
        .map_err(|_| ManifestError::InvalidDate(raw_date.clone()))?;

    let content_hash = text_field("uavo_hash");
    Ok(PackageVersionInfo {
        is_newer: build_date > local.build_timestamp(),
        content_differs: content_hash != local.content_hash,
        content_hash,
        content_hash_text: text_field("uavo_hash_text"),
        build_date,
    })
}

/// Download the release's manifest asset and evaluate it.
///
/// # Errors
/// Any error means the version info is invalid; callers treat that as "no
/// update" rather than a failure.
pub async fn evaluate_version(
    repository: &dyn ReleaseRepository,
    release: &Release,
    local: &LocalBuild,
) -> Result<PackageVersionInfo, ManifestError> {
    let asset = release
        .asset_named(MANIFEST_ASSET_NAME)
        .ok_or(ManifestError::Missing)?;

    let (progress, _) = mpsc::channel(1);
    let bytes = repository
        .download_asset(asset.id, progress)
        .await
        .map_err(ManifestError::Download)?;

    let info = parse_manifest(&bytes, local)?;
    debug!(
        "Release {} built {} (newer: {}, content differs: {})",
        release.name, info.build_date, info.is_newer, info.content_differs
    );
    Ok(info)
}
