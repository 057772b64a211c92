//! The update state machine.
//!
//! [`UpdateOrchestrator::run`] multiplexes three inputs with `select!`: the
//! periodic check timer, user intents, and configuration updates. A confirmed
//! update runs as a session inside a nested loop that keeps
//! draining intents, so a cancel request reaches the session's
//! [`CancellationToken`] while a download or extraction is in flight.

mod events;
mod provider;
mod session;
mod timer;

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use updraft_platform::{PlatformTarget, executable_name};
use updraft_release::{Release, ReleaseRepository, RepositoryEndpoint, RepositoryError};

use crate::config::UpdaterConfig;
use crate::handoff::HandoffLauncher;
use crate::manifest::{LocalBuild, PackageVersionInfo, evaluate_version};
use crate::selection::select_latest_release;

pub use events::{RunOutcome, SessionEnd, UpdateEvent, UpdateState, UserIntent};
pub use provider::{GitHubProvider, RepositoryProvider};

use session::UpdateSession;
use timer::RefreshTimer;

/// Facts about the running installation that do not change at runtime.
#[derive(Debug, Clone)]
pub struct InstallContext {
    pub local_build: LocalBuild,
    pub target: PlatformTarget,
    /// Parent directory for per-session staging directories.
    pub staging_root: PathBuf,
    pub current_executable: PathBuf,
}

/// Fetch the release that would be offered: the repository's latest release,
/// or the most recently published one when prereleases are allowed.
///
/// # Errors
/// Returns the repository error unchanged.
pub async fn check_for_update(
    repository: &dyn ReleaseRepository,
    use_prereleases: bool,
) -> Result<Option<Release>, RepositoryError> {
    if use_prereleases {
        let releases = repository.list_releases(true).await?;
        Ok(select_latest_release(releases))
    } else {
        repository.latest_release().await.map(Some)
    }
}

struct Repositories {
    application: Option<Arc<dyn ReleaseRepository>>,
    helper: Option<Arc<dyn ReleaseRepository>>,
}

pub struct UpdateOrchestrator {
    context: InstallContext,
    config: UpdaterConfig,
    config_rx: watch::Receiver<UpdaterConfig>,
    provider: Arc<dyn RepositoryProvider>,
    repositories: Repositories,
    launcher: Arc<dyn HandoffLauncher>,
    events: mpsc::Sender<UpdateEvent>,
    state: Arc<watch::Sender<UpdateState>>,
    timer: RefreshTimer,
    announced: Option<Release>,
}

impl UpdateOrchestrator {
    #[must_use]
    pub fn new(
        context: InstallContext,
        config_rx: watch::Receiver<UpdaterConfig>,
        provider: Arc<dyn RepositoryProvider>,
        launcher: Arc<dyn HandoffLauncher>,
        events: mpsc::Sender<UpdateEvent>,
    ) -> Self {
        let config = config_rx.borrow().clone();
        let repositories = connect_repositories(provider.as_ref(), &config);
        let timer = RefreshTimer::new(config.refresh_interval());
        let (state, _) = watch::channel(UpdateState::Idle);

        Self {
            context,
            config,
            config_rx,
            provider,
            repositories,
            launcher,
            events,
            state: Arc::new(state),
            timer,
            announced: None,
        }
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<UpdateState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> UpdateState {
        *self.state.borrow()
    }

    /// Drive the updater until the helper takes over or `intents` closes.
    ///
    /// Pending configuration is applied before intents, and intents before
    /// timer ticks.
    pub async fn run(mut self, mut intents: mpsc::Receiver<UserIntent>) -> RunOutcome {
        let mut config_open = true;

        loop {
            tokio::select! {
                biased;
                changed = self.config_rx.changed(), if config_open => {
                    if changed.is_err() {
                        debug!("Configuration channel closed, keeping current settings");
                        config_open = false;
                    } else {
                        let config = self.config_rx.borrow_and_update().clone();
                        self.apply_config(config);
                    }
                }
                intent = intents.recv() => {
                    let Some(intent) = intent else {
                        debug!("Intent channel closed, stopping updater");
                        return RunOutcome::Shutdown;
                    };
                    if let Some(outcome) = self.handle_intent(intent, &mut intents).await {
                        return outcome;
                    }
                }
                () = self.timer.tick() => {
                    debug!("Periodic update check");
                    self.check().await;
                }
            }
        }
    }

    fn apply_config(&mut self, config: UpdaterConfig) {
        if config == self.config {
            return;
        }
        info!(
            "Updater settings changed (interval: {}s, prereleases: {})",
            config.refresh_interval_secs, config.use_prereleases
        );
        if config.repository != self.config.repository
            || config.helper_repository != self.config.helper_repository
        {
            self.repositories = connect_repositories(self.provider.as_ref(), &config);
        }
        self.timer.set_period(config.refresh_interval());
        self.config = config;
    }

    async fn handle_intent(
        &mut self,
        intent: UserIntent,
        intents: &mut mpsc::Receiver<UserIntent>,
    ) -> Option<RunOutcome> {
        match intent {
            UserIntent::CheckNow => {
                if self.announced.is_some() {
                    debug!("Ignoring manual check while an update is announced");
                } else {
                    self.check().await;
                }
                None
            }
            UserIntent::StartUpdate => {
                let Some(release) = self.announced.take() else {
                    debug!("Ignoring start request with no announced update");
                    return None;
                };
                self.run_session(release, intents).await
            }
            UserIntent::DialogClosed {
                suppress_future_checks,
            } => {
                if self.announced.take().is_some() {
                    self.set_state(UpdateState::Idle);
                }
                self.close_dialog(suppress_future_checks);
                None
            }
            UserIntent::CancelDownload => {
                debug!("Ignoring cancel request with no update in progress");
                None
            }
        }
    }

    fn close_dialog(&mut self, suppress_future_checks: bool) {
        if suppress_future_checks {
            info!("Periodic update checks disabled until restart");
            self.timer.suppress();
        } else {
            self.timer.resume();
        }
    }

    /// Ask the repository for a candidate and announce it if it is newer.
    /// Failures here only mean "no update this time".
    async fn check(&mut self) {
        let Some(repository) = self.repositories.application.clone() else {
            debug!("No application repository configured, skipping update check");
            return;
        };

        self.set_state(UpdateState::Checking);
        match self.find_newer_release(repository.as_ref()).await {
            Some((release, info)) => {
                info!(
                    "Update {} available (built {})",
                    release.name, info.build_date
                );
                self.timer.pause();
                self.set_state(UpdateState::Found);
                self.emit(UpdateEvent::UpdateFound {
                    release_name: release.name.clone(),
                    notes: release.body.clone(),
                    content_differs: info.content_differs,
                })
                .await;
                self.announced = Some(release);
            }
            None => self.set_state(UpdateState::Idle),
        }
    }

    async fn find_newer_release(
        &self,
        repository: &dyn ReleaseRepository,
    ) -> Option<(Release, PackageVersionInfo)> {
        let release = match check_for_update(repository, self.config.use_prereleases).await {
            Ok(Some(release)) => release,
            Ok(None) => {
                debug!("{} has no releases", repository.describe());
                return None;
            }
            Err(error) => {
                debug!(
                    "Update check against {} failed: {error}",
                    repository.describe()
                );
                return None;
            }
        };

        match evaluate_version(repository, &release, &self.context.local_build).await {
            Ok(info) if info.is_newer => Some((release, info)),
            Ok(_) => {
                debug!("Release {} is not newer than this build", release.name);
                None
            }
            Err(error) => {
                debug!("Ignoring release {}: {error}", release.name);
                None
            }
        }
    }

    async fn run_session(
        &mut self,
        release: Release,
        intents: &mut mpsc::Receiver<UserIntent>,
    ) -> Option<RunOutcome> {
        let (Some(app_repository), Some(helper_repository)) = (
            self.repositories.application.clone(),
            self.repositories.helper.clone(),
        ) else {
            self.finish_failed("Update repositories are not configured".to_string())
                .await;
            return None;
        };

        info!("Starting update to {}", release.name);
        let session = UpdateSession {
            release,
            app_repository,
            helper_repository,
            target: self.context.target.clone(),
            helper_executable_name: executable_name(&self.config.helper_executable_name),
            extractor: self.config.extractor,
            staging_root: self.context.staging_root.clone(),
            current_executable: self.context.current_executable.clone(),
            launcher: Arc::clone(&self.launcher),
            events: self.events.clone(),
            state: Arc::clone(&self.state),
        };

        let cancel = CancellationToken::new();
        let mut suppress_after = None;
        let mut intents_open = true;
        let session_run = session.run(cancel.clone());
        tokio::pin!(session_run);

        let result = loop {
            tokio::select! {
                result = &mut session_run => break result,
                intent = intents.recv(), if intents_open => match intent {
                    Some(UserIntent::CancelDownload) => {
                        info!("Update cancelled by user");
                        cancel.cancel();
                    }
                    Some(UserIntent::DialogClosed { suppress_future_checks }) => {
                        info!("Update dialog closed, cancelling update");
                        suppress_after = Some(suppress_future_checks);
                        cancel.cancel();
                    }
                    Some(other) => debug!("Ignoring {other:?} while an update is in progress"),
                    None => {
                        intents_open = false;
                        cancel.cancel();
                    }
                },
            }
        };

        match result {
            Ok(_) => {
                self.set_state(UpdateState::Terminal(SessionEnd::Handoff));
                self.emit(UpdateEvent::HandoffStarted).await;
                return Some(RunOutcome::Handoff);
            }
            Err(error) if error.is_cancelled() => {
                self.set_state(UpdateState::Terminal(SessionEnd::Cancelled));
                self.emit(UpdateEvent::Cancelled).await;
                self.set_state(UpdateState::Idle);
            }
            Err(error) => {
                error!("Update failed: {error}");
                self.finish_failed(error.to_string()).await;
            }
        }

        match suppress_after {
            Some(suppress) => self.close_dialog(suppress),
            None => self.timer.resume(),
        }
        if intents_open {
            None
        } else {
            Some(RunOutcome::Shutdown)
        }
    }

    async fn finish_failed(&mut self, message: String) {
        self.set_state(UpdateState::Terminal(SessionEnd::Failed));
        self.emit(UpdateEvent::Failed(message)).await;
        self.set_state(UpdateState::Idle);
        self.timer.resume();
    }

    fn set_state(&self, state: UpdateState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Update state {previous:?} -> {state:?}");
        }
    }

    async fn emit(&self, event: UpdateEvent) {
        if self.events.send(event).await.is_err() {
            warn!("Update event dropped: presentation channel closed");
        }
    }
}

fn connect_repositories(
    provider: &dyn RepositoryProvider,
    config: &UpdaterConfig,
) -> Repositories {
    let connect = |endpoint: &RepositoryEndpoint| match provider.connect(endpoint) {
        Ok(repository) => Some(repository),
        Err(error) => {
            warn!("Cannot use release repository: {error}");
            None
        }
    };

    Repositories {
        application: config.repository.as_ref().and_then(connect),
        helper: connect(&config.helper_repository),
    }
}
