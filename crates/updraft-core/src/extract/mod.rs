//! Archive extraction with streamed progress.
//!
//! Two interchangeable strategies sit behind [`PackageExtractor`]:
//!
//! - [`SequentialStreamExtractor`] drives the system `tar` tool, sizing the
//!   archive from a listing pass and tracking progress from its verbose
//!   output.
//! - [`RandomAccessExtractor`] reads a zip archive in-process, sizing it from
//!   the central directory before writing entries.
//!
//! Both report the directory containing the requested executable so callers
//! can locate the new install root without knowing the archive layout.

mod random_access;
mod sequential;
mod verbose;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use random_access::RandomAccessExtractor;
pub use sequential::SequentialStreamExtractor;
pub use verbose::{VerboseEntry, parse_verbose_line};

/// Progress notifications emitted while an archive is extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractProgress {
    /// File name of the entry about to be written.
    Entry(String),
    /// Overall completion. Never decreases and ends at exactly 100 on
    /// success.
    Percent(u8),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Directory containing the target executable, when the archive held one.
    pub executable_root: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub archive: PathBuf,
    pub destination: PathBuf,
    /// File name of the executable whose directory should be reported.
    pub target_name: String,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("archive does not exist: {}", .0.display())]
    ArchiveMissing(PathBuf),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("archive tool is not available: {0}")]
    ToolUnavailable(String),
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        status: String,
        stderr: String,
    },
    #[error("extraction worker stopped unexpectedly: {0}")]
    Worker(String),
    #[error("extraction was cancelled")]
    Cancelled,
}

impl ExtractError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }
}

/// Which extraction strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorStrategy {
    /// Zip archives use random access, everything else streams through `tar`.
    #[default]
    Auto,
    SequentialStream,
    RandomAccess,
}

impl ExtractorStrategy {
    /// Resolve [`Self::Auto`] against an archive file name.
    #[must_use]
    pub fn resolve_for(self, archive_name: &str) -> Self {
        match self {
            Self::Auto => {
                if archive_name.to_ascii_lowercase().ends_with(".zip") {
                    Self::RandomAccess
                } else {
                    Self::SequentialStream
                }
            }
            other => other,
        }
    }
}

#[async_trait]
pub trait PackageExtractor: Send + Sync {
    /// Extract `request.archive` into `request.destination`.
    ///
    /// Progress is sent on `progress` as entries are written. The token is
    /// checked before each entry; once it fires, no further entries are
    /// written and [`ExtractError::Cancelled`] is returned.
    async fn extract(
        &self,
        request: ExtractRequest,
        progress: mpsc::Sender<ExtractProgress>,
        cancel: CancellationToken,
    ) -> Result<ExtractionResult, ExtractError>;
}

/// Extractor for `strategy` after resolving it for `archive_name`.
#[must_use]
pub fn extractor_for(strategy: ExtractorStrategy, archive_name: &str) -> Box<dyn PackageExtractor> {
    match strategy.resolve_for(archive_name) {
        ExtractorStrategy::RandomAccess => Box::new(RandomAccessExtractor),
        ExtractorStrategy::Auto | ExtractorStrategy::SequentialStream => {
            Box::new(SequentialStreamExtractor::default())
        }
    }
}

/// Turns byte counts into a percentage that only moves forward.
///
/// Intermediate values stop at 99 so the single 100 is reserved for
/// [`ProgressTracker::finish`].
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    total: u64,
    done: u64,
    last: Option<u8>,
}

impl ProgressTracker {
    pub(crate) fn new(total: u64) -> Self {
        Self {
            total,
            done: 0,
            last: None,
        }
    }

    /// Record `bytes` more and return the new percentage if it changed.
    pub(crate) fn advance(&mut self, bytes: u64) -> Option<u8> {
        self.done = self.done.saturating_add(bytes);
        if self.total == 0 {
            return None;
        }
        let raw = (u128::from(self.done) * 100) / u128::from(self.total);
        let percent = u8::try_from(raw.min(99)).unwrap_or(99);
        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }

    pub(crate) fn finish(&mut self) -> u8 {
        self.last = Some(100);
        100
    }
}

/// File name component of an archive entry path, for progress text.
pub(crate) fn entry_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.to_string_lossy().into_owned(),
        |name| name.to_string_lossy().into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{ExtractorStrategy, ProgressTracker, entry_display_name};

    #[test]
    fn tracker_is_monotonic_and_reserves_100_for_finish() {
        let mut tracker = ProgressTracker::new(200);

        assert_eq!(tracker.advance(50), Some(25));
        assert_eq!(tracker.advance(0), None);
        assert_eq!(tracker.advance(150), Some(99));
        assert_eq!(tracker.advance(500), None);
        assert_eq!(tracker.finish(), 100);
    }

    #[test]
    fn tracker_with_unknown_total_only_reports_finish() {
        let mut tracker = ProgressTracker::new(0);

        assert_eq!(tracker.advance(1024), None);
        assert_eq!(tracker.finish(), 100);
    }

    #[test]
    fn auto_strategy_resolves_by_extension() {
        assert_eq!(
            ExtractorStrategy::Auto.resolve_for("app_winx86_64.ZIP"),
            ExtractorStrategy::RandomAccess
        );
        assert_eq!(
            ExtractorStrategy::Auto.resolve_for("app_linux_64.tar.xz"),
            ExtractorStrategy::SequentialStream
        );
        assert_eq!(
            ExtractorStrategy::SequentialStream.resolve_for("app.zip"),
            ExtractorStrategy::SequentialStream
        );
    }

    #[test]
    fn strategy_uses_snake_case_names() {
        let parsed: ExtractorStrategy =
            serde_json::from_str("\"random_access\"").expect("strategy should deserialize");
        assert_eq!(parsed, ExtractorStrategy::RandomAccess);
    }

    #[test]
    fn display_name_is_file_component() {
        assert_eq!(entry_display_name(Path::new("pkg/bin/app")), "app");
        assert_eq!(entry_display_name(Path::new("..")), "..");
    }
}
