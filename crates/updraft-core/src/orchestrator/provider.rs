use std::sync::Arc;

use updraft_release::{GitHubRepository, ReleaseRepository, RepositoryEndpoint, RepositoryError};

/// Builds repository clients for configured endpoints. The orchestrator asks
/// again whenever the configuration changes.
pub trait RepositoryProvider: Send + Sync {
    /// Client for `endpoint`.
    ///
    /// # Errors
    /// Returns an error if the client cannot be constructed.
    fn connect(
        &self,
        endpoint: &RepositoryEndpoint,
    ) -> Result<Arc<dyn ReleaseRepository>, RepositoryError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GitHubProvider;

impl RepositoryProvider for GitHubProvider {
    fn connect(
        &self,
        endpoint: &RepositoryEndpoint,
    ) -> Result<Arc<dyn ReleaseRepository>, RepositoryError> {
        Ok(Arc::new(GitHubRepository::new(endpoint.clone())?))
    }
}
