use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::RepositoryError;
use crate::traits::ReleaseRepository;
use crate::types::{Asset, AssetId, Release, TransferProgress};

const DEFAULT_HOST: &str = "api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RELEASES_PER_PAGE: u32 = 100;
const JSON_ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Where a release repository lives: API host plus owner/repository name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEndpoint {
    #[serde(default = "default_host")]
    pub host: String,
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

impl RepositoryEndpoint {
    #[must_use]
    pub fn github(owner: &str, repo: &str) -> Self {
        Self {
            host: default_host(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        if !username.is_empty() && !password.is_empty() {
            self.credentials = Some(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            });
        }
        self
    }

    /// Base URL of the repository API. A bare host gets an `https://` scheme.
    #[must_use]
    pub fn repo_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let base = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        format!("{base}/repos/{}/{}", self.owner, self.repo)
    }
}

#[derive(Deserialize)]
struct GitHubAsset {
    id: u64,
    name: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    size: u64,
}

#[derive(Deserialize)]
struct GitHubRelease {
    id: u64,
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

impl GitHubRelease {
    fn into_release(self) -> Release {
        let assets = self
            .assets
            .into_iter()
            .map(|asset| {
                (
                    asset.id,
                    Asset {
                        id: asset.id,
                        name: asset.name,
                        label: asset.label.unwrap_or_default(),
                        size_bytes: asset.size,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        Release {
            id: self.id,
            name: self
                .name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(self.tag_name),
            body: self.body.unwrap_or_default(),
            published_at: self.published_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            is_prerelease: self.prerelease,
            assets,
        }
    }
}

/// [`ReleaseRepository`] backed by the GitHub releases REST API.
#[derive(Clone)]
pub struct GitHubRepository {
    client: reqwest::Client,
    endpoint: RepositoryEndpoint,
}

impl GitHubRepository {
    /// Build a repository client with the default timeouts.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(endpoint: RepositoryEndpoint) -> Result<Self, RepositoryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(format!("updraft/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| RepositoryError::network_from("build http client", error))?;
        Ok(Self::with_client(client, endpoint))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, endpoint: RepositoryEndpoint) -> Self {
        Self { client, endpoint }
    }

    #[must_use]
    pub fn endpoint(&self) -> &RepositoryEndpoint {
        &self.endpoint
    }

    fn get(&self, url: &str, accept: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url).header("Accept", accept);
        match &self.endpoint.credentials {
            Some(credentials) => {
                request.basic_auth(&credentials.username, Some(&credentials.password))
            }
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
        resource: &str,
    ) -> Result<reqwest::Response, RepositoryError> {
        let response = request
            .send()
            .await
            .map_err(|error| RepositoryError::network_from(operation, error))?;
        check_status(response, operation, resource).await
    }
}

async fn check_status(
    response: reqwest::Response,
    operation: &'static str,
    resource: &str,
) -> Result<reqwest::Response, RepositoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            Err(RepositoryError::Auth {
                operation,
                status: status.as_u16(),
            })
        }
        reqwest::StatusCode::NOT_FOUND => Err(RepositoryError::not_found(resource)),
        _ => {
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            Err(RepositoryError::network(
                operation,
                format!("HTTP {status}{body_snippet}"),
            ))
        }
    }
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

#[async_trait]
impl ReleaseRepository for GitHubRepository {
    fn describe(&self) -> String {
        format!("{}/{}", self.endpoint.owner, self.endpoint.repo)
    }

    async fn list_releases(
        &self,
        include_prerelease: bool,
    ) -> Result<Vec<Release>, RepositoryError> {
        let url = format!(
            "{}/releases?per_page={RELEASES_PER_PAGE}",
            self.endpoint.repo_url()
        );
        debug!("Listing releases from {url}");

        let response = self
            .send(self.get(&url, JSON_ACCEPT), "list releases", &url)
            .await?;
        let releases: Vec<GitHubRelease> = response
            .json()
            .await
            .map_err(|error| RepositoryError::parse_from("list releases", error))?;

        Ok(releases
            .into_iter()
            .filter(|release| !release.draft)
            .filter(|release| include_prerelease || !release.prerelease)
            .map(GitHubRelease::into_release)
            .collect())
    }

    async fn latest_release(&self) -> Result<Release, RepositoryError> {
        let url = format!("{}/releases/latest", self.endpoint.repo_url());
        debug!("Fetching latest release from {url}");

        let response = self
            .send(self.get(&url, JSON_ACCEPT), "latest release", &url)
            .await?;
        let release: GitHubRelease = response
            .json()
            .await
            .map_err(|error| RepositoryError::parse_from("latest release", error))?;

        Ok(release.into_release())
    }

    async fn download_asset(
        &self,
        asset_id: AssetId,
        progress: mpsc::Sender<TransferProgress>,
    ) -> Result<Vec<u8>, RepositoryError> {
        let url = format!("{}/releases/assets/{asset_id}", self.endpoint.repo_url());
        let request = self.get(&url, "application/octet-stream");
        let response = self.send(request, "download asset", &url).await?;

        let total = response.content_length().unwrap_or(0);
        let mut received: u64 = 0;
        let mut data = Vec::with_capacity(usize::try_from(total).unwrap_or_default());

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|error| RepositoryError::network_from("download stream", error))?;
            data.extend_from_slice(&chunk);
            received += chunk.len() as u64;
            let _ = progress.send(TransferProgress { received, total }).await;
        }

        info!("Downloaded asset {asset_id}: {received} bytes");
        Ok(data)
    }
}
