//! Update logic for updraft, independent of any presentation layer:
//! - Version manifest parsing and comparison against the running build.
//! - Release and platform asset selection.
//! - Archive extraction with progress (external `tar` or in-process zip).
//! - Staging directories and the detached helper handoff.
//! - The orchestrator state machine tying these together.

pub mod config;
mod error;
pub mod extract;
mod handoff;
mod manifest;
pub mod orchestrator;
mod selection;
mod staging;

/// Hot-reloadable updater settings.
pub use config::UpdaterConfig;
/// Session error model.
pub use error::{PackageKind, UpdateError};
/// Extractor contract and strategy selection.
pub use extract::{
    ExtractError, ExtractProgress, ExtractRequest, ExtractionResult, ExtractorStrategy,
    PackageExtractor, RandomAccessExtractor, SequentialStreamExtractor, extractor_for,
};
/// Helper process handoff.
pub use handoff::{
    HandoffError, HandoffLauncher, HandoffRequest, ProcessLauncher, current_executable,
};
/// Version manifest model and evaluation.
pub use manifest::{
    LocalBuild, MANIFEST_ASSET_NAME, ManifestError, PackageVersionInfo, evaluate_version,
    parse_manifest,
};
/// Orchestrator, its events, and repository wiring.
pub use orchestrator::{
    GitHubProvider, InstallContext, RepositoryProvider, RunOutcome, SessionEnd,
    UpdateEvent, UpdateOrchestrator, UpdateState, UserIntent, check_for_update,
};
/// Release and asset selection rules.
pub use selection::{select_asset, select_latest_release};
/// Per-session staging directories.
pub use staging::{StagingArea, cleanup_stale_staging};
