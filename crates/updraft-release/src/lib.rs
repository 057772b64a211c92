//! Release repository abstraction for updraft.
//!
//! - Immutable release/asset snapshots.
//! - The [`ReleaseRepository`] seam the update orchestrator talks to.
//! - A GitHub releases implementation with optional basic auth.

mod error;
mod github;
mod traits;
mod types;

pub use error::RepositoryError;
pub use github::{Credentials, GitHubRepository, RepositoryEndpoint};
pub use traits::ReleaseRepository;
pub use types::{Asset, AssetId, Release, ReleaseId, TransferProgress};
