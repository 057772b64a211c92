use std::path::Path;

use thiserror::Error;
use updraft_release::RepositoryError;

use crate::extract::ExtractError;
use crate::handoff::HandoffError;

/// Which of the two packages a step was working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Application,
    Helper,
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Application => f.write_str("application"),
            Self::Helper => f.write_str("helper"),
        }
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("{operation} failed: {source}")]
    Repository {
        operation: &'static str,
        #[source]
        source: RepositoryError,
    },

    #[error("No {package} package found for platform {target}")]
    AssetNotFound {
        package: PackageKind,
        target: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract {package} package: {source}")]
    Extraction {
        package: PackageKind,
        #[source]
        source: ExtractError,
    },

    #[error("{package} package does not contain {name}")]
    TargetNotFound { package: PackageKind, name: String },

    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error("Update cancelled")]
    Cancelled,
}

impl UpdateError {
    pub(crate) fn repository(operation: &'static str, source: RepositoryError) -> Self {
        Self::Repository { operation, source }
    }

    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }

    /// Fold extractor cancellation into [`UpdateError::Cancelled`].
    pub(crate) fn extraction(package: PackageKind, source: ExtractError) -> Self {
        match source {
            ExtractError::Cancelled => Self::Cancelled,
            source => Self::Extraction { package, source },
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
