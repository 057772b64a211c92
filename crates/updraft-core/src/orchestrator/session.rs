use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use updraft_platform::PlatformTarget;
use updraft_release::{Asset, Release, ReleaseRepository, TransferProgress};

use crate::error::{PackageKind, UpdateError};
use crate::extract::{ExtractProgress, ExtractRequest, ExtractorStrategy, extractor_for};
use crate::handoff::{HandoffLauncher, HandoffRequest};
use crate::selection::select_asset;
use crate::staging::StagingArea;

use super::events::{UpdateEvent, UpdateState};

/// One confirmed update, from asset selection to helper launch.
pub(crate) struct UpdateSession {
    pub(crate) release: Release,
    pub(crate) app_repository: Arc<dyn ReleaseRepository>,
    pub(crate) helper_repository: Arc<dyn ReleaseRepository>,
    pub(crate) target: PlatformTarget,
    pub(crate) helper_executable_name: String,
    pub(crate) extractor: ExtractorStrategy,
    pub(crate) staging_root: PathBuf,
    pub(crate) current_executable: PathBuf,
    pub(crate) launcher: Arc<dyn HandoffLauncher>,
    pub(crate) events: mpsc::Sender<UpdateEvent>,
    pub(crate) state: Arc<watch::Sender<UpdateState>>,
}

struct SelectedPackages {
    application: Asset,
    helper: Asset,
}

impl UpdateSession {
    /// Run every step. Returns the request handed to the launcher once the
    /// helper is running.
    pub(crate) async fn run(
        self,
        cancel: CancellationToken,
    ) -> Result<HandoffRequest, UpdateError> {
        let packages = self.select_packages(&cancel).await?;

        let staging = StagingArea::create(&self.staging_root)?;
        info!("Staging update in {}", staging.path().display());

        let result = self.install(&packages, &staging, &cancel).await;
        if result.as_ref().is_err_and(|error| !error.is_cancelled()) {
            warn!(
                "Update failed, keeping {} for inspection",
                staging.path().display()
            );
        }
        result
    }

    async fn select_packages(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SelectedPackages, UpdateError> {
        self.emit(UpdateEvent::Operation("Looking for update packages".to_string()))
            .await;

        let helper_release = cancellable(cancel, self.helper_repository.latest_release())
            .await?
            .map_err(|error| UpdateError::repository("Fetching helper release", error))?;
        debug!(
            "Helper release {} from {}",
            helper_release.name,
            self.helper_repository.describe()
        );

        let helper = self.pick(PackageKind::Helper, &helper_release)?;
        let application = self.pick(PackageKind::Application, &self.release)?;
        info!(
            "Selected packages {} and {} for {}",
            application.name, helper.name, self.target
        );

        Ok(SelectedPackages {
            application,
            helper,
        })
    }

    fn pick(&self, package: PackageKind, release: &Release) -> Result<Asset, UpdateError> {
        select_asset(&release.assets, &self.target)
            .cloned()
            .ok_or_else(|| UpdateError::AssetNotFound {
                package,
                target: self.target.to_string(),
            })
    }

    async fn install(
        &self,
        packages: &SelectedPackages,
        staging: &StagingArea,
        cancel: &CancellationToken,
    ) -> Result<HandoffRequest, UpdateError> {
        self.state.send_replace(UpdateState::Downloading);
        let helper_archive = self
            .download(
                PackageKind::Helper,
                self.helper_repository.as_ref(),
                &packages.helper,
                staging,
                cancel,
            )
            .await?;
        let app_archive = self
            .download(
                PackageKind::Application,
                self.app_repository.as_ref(),
                &packages.application,
                staging,
                cancel,
            )
            .await?;

        self.state.send_replace(UpdateState::Extracting);
        let app_target = self
            .current_executable
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let app_root = self
            .extract(
                PackageKind::Application,
                &app_archive,
                staging.package_dir(),
                &app_target,
                cancel,
            )
            .await?;
        let helper_root = self
            .extract(
                PackageKind::Helper,
                &helper_archive,
                staging.helper_dir(),
                &self.helper_executable_name,
                cancel,
            )
            .await?;

        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }
        self.state.send_replace(UpdateState::ReadyToHandoff);
        let request = HandoffRequest::from_layout(
            &helper_root,
            &self.helper_executable_name,
            &app_root,
            &self.current_executable,
        )?;
        self.emit(UpdateEvent::Operation("Starting installer".to_string()))
            .await;
        self.launcher.launch(&request)?;
        Ok(request)
    }

    async fn download(
        &self,
        package: PackageKind,
        repository: &dyn ReleaseRepository,
        asset: &Asset,
        staging: &StagingArea,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, UpdateError> {
        self.emit(UpdateEvent::Operation(format!(
            "Downloading {package} package {}",
            asset.name
        )))
        .await;

        let (progress_tx, mut progress_rx) = mpsc::channel::<TransferProgress>(32);
        let forward = async {
            while let Some(progress) = progress_rx.recv().await {
                self.emit(UpdateEvent::ProgressText(format!(
                    "{} of {} bytes downloaded",
                    progress.received, progress.total
                )))
                .await;
                if let Some(percent) = progress.percent() {
                    self.emit(UpdateEvent::Progress(percent)).await;
                }
            }
        };

        let (bytes, ()) = cancellable(cancel, async {
            tokio::join!(repository.download_asset(asset.id, progress_tx), forward)
        })
        .await?;
        let bytes = bytes.map_err(|error| UpdateError::repository("Downloading package", error))?;

        info!("Downloaded {} ({} bytes)", asset.name, bytes.len());
        staging.write_asset(&asset.name, &bytes).await
    }

    async fn extract(
        &self,
        package: PackageKind,
        archive: &Path,
        destination: PathBuf,
        target_name: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, UpdateError> {
        self.emit(UpdateEvent::Operation(format!("Extracting {package} package")))
            .await;

        let archive_name = archive
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extractor = extractor_for(self.extractor, &archive_name);
        let request = ExtractRequest {
            archive: archive.to_path_buf(),
            destination,
            target_name: target_name.to_string(),
        };

        let (progress_tx, mut progress_rx) = mpsc::channel::<ExtractProgress>(64);
        let forward = async {
            while let Some(progress) = progress_rx.recv().await {
                let event = match progress {
                    ExtractProgress::Entry(name) => {
                        UpdateEvent::ProgressText(format!("Extracting {name}"))
                    }
                    ExtractProgress::Percent(percent) => UpdateEvent::Progress(percent),
                };
                self.emit(event).await;
            }
        };

        let (result, ()) = tokio::join!(
            extractor.extract(request, progress_tx, cancel.clone()),
            forward
        );
        let extraction = result.map_err(|error| UpdateError::extraction(package, error))?;

        extraction
            .executable_root
            .ok_or_else(|| UpdateError::TargetNotFound {
                package,
                name: target_name.to_string(),
            })
    }

    async fn emit(&self, event: UpdateEvent) {
        if self.events.send(event).await.is_err() {
            warn!("Update event dropped: presentation channel closed");
        }
    }
}

async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, UpdateError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(UpdateError::Cancelled),
        output = future => Ok(output),
    }
}
