#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use updraft_core::{
    HandoffError, HandoffLauncher, HandoffRequest, InstallContext, LocalBuild,
    MANIFEST_ASSET_NAME, RepositoryProvider, RunOutcome, UpdateEvent, UpdateOrchestrator,
    UpdateState, UpdaterConfig, UserIntent,
};
use updraft_platform::PlatformTarget;
use updraft_release::{
    Asset, AssetId, Release, ReleaseRepository, RepositoryEndpoint, RepositoryError,
    TransferProgress,
};

pub const APP_EXECUTABLE: &str = "studio";

/// In-memory release repository with call counters.
#[derive(Default)]
pub struct FakeRepository {
    pub name: String,
    pub latest: Option<Release>,
    pub releases: Vec<Release>,
    pub payloads: HashMap<AssetId, Vec<u8>>,
    /// Downloads of these assets report one progress step and then hang.
    pub stalled_assets: Vec<AssetId>,
    pub fail_checks: bool,
    pub latest_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub downloads: Mutex<Vec<AssetId>>,
}

impl FakeRepository {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_latest(mut self, release: Release) -> Self {
        self.latest = Some(release.clone());
        self.releases.push(release);
        self
    }

    pub fn with_payload(mut self, asset_id: AssetId, bytes: Vec<u8>) -> Self {
        self.payloads.insert(asset_id, bytes);
        self
    }

    pub fn downloaded(&self) -> Vec<AssetId> {
        self.downloads.lock().expect("download log should lock").clone()
    }

    pub fn checks(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst) + self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseRepository for FakeRepository {
    fn describe(&self) -> String {
        format!("fake/{}", self.name)
    }

    async fn list_releases(
        &self,
        include_prerelease: bool,
    ) -> Result<Vec<Release>, RepositoryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_checks {
            return Err(RepositoryError::network("list releases", "connection refused"));
        }
        Ok(self
            .releases
            .iter()
            .filter(|release| include_prerelease || !release.is_prerelease)
            .cloned()
            .collect())
    }

    async fn latest_release(&self) -> Result<Release, RepositoryError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_checks {
            return Err(RepositoryError::network("latest release", "connection refused"));
        }
        self.latest
            .clone()
            .ok_or_else(|| {
                RepositoryError::not_found(format!("latest release of {}", self.name))
            })
    }

    async fn download_asset(
        &self,
        asset_id: AssetId,
        progress: mpsc::Sender<TransferProgress>,
    ) -> Result<Vec<u8>, RepositoryError> {
        self.downloads
            .lock()
            .expect("download log should lock")
            .push(asset_id);
        let bytes = self
            .payloads
            .get(&asset_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("asset {asset_id}")))?;
        let total = bytes.len() as u64;

        if self.stalled_assets.contains(&asset_id) {
            let _ = progress
                .send(TransferProgress {
                    received: total / 2,
                    total,
                })
                .await;
            std::future::pending::<()>().await;
        }

        let _ = progress
            .send(TransferProgress {
                received: total,
                total,
            })
            .await;
        Ok(bytes)
    }
}

/// Resolves endpoints to fakes by repository name.
pub struct FakeProvider {
    pub repositories: HashMap<String, Arc<FakeRepository>>,
}

impl RepositoryProvider for FakeProvider {
    fn connect(
        &self,
        endpoint: &RepositoryEndpoint,
    ) -> Result<Arc<dyn ReleaseRepository>, RepositoryError> {
        self.repositories
            .get(&endpoint.repo)
            .map(|repository| Arc::clone(repository) as Arc<dyn ReleaseRepository>)
            .ok_or_else(|| RepositoryError::not_found(endpoint.repo.clone()))
    }
}

#[derive(Default)]
pub struct RecordingLauncher {
    pub requests: Mutex<Vec<HandoffRequest>>,
    pub fail: bool,
}

impl RecordingLauncher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn launched(&self) -> Vec<HandoffRequest> {
        self.requests.lock().expect("launch log should lock").clone()
    }
}

impl HandoffLauncher for RecordingLauncher {
    fn launch(&self, request: &HandoffRequest) -> Result<(), HandoffError> {
        if self.fail {
            return Err(HandoffError::HelperMissing(request.helper_executable.clone()));
        }
        self.requests
            .lock()
            .expect("launch log should lock")
            .push(request.clone());
        Ok(())
    }
}

pub fn asset(id: AssetId, name: &str, label: &str) -> Asset {
    Asset {
        id,
        name: name.to_string(),
        label: label.to_string(),
        size_bytes: 0,
    }
}

pub fn release(id: u64, name: &str, day: u32, assets: Vec<Asset>) -> Release {
    Release {
        id,
        name: name.to_string(),
        body: format!("Notes for {name}"),
        published_at: Utc
            .with_ymd_and_hms(2025, 1, day, 12, 0, 0)
            .single()
            .expect("timestamp should be valid"),
        is_prerelease: false,
        assets: assets
            .into_iter()
            .map(|asset| (asset.id, asset))
            .collect::<BTreeMap<_, _>>(),
    }
}

pub fn manifest(date: &str, hash: &str) -> Vec<u8> {
    format!(
        r#"{{"package_info":{{"date":"{date}","uavo_hash":"{hash}","uavo_hash_text":"objects"}}}}"#
    )
    .into_bytes()
}

pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
    for (name, contents) in files {
        writer
            .start_file(*name, options)
            .expect("zip entry should be started");
        writer
            .write_all(contents)
            .expect("zip entry should be written");
    }
    writer
        .finish()
        .expect("zip archive should be finalized")
        .into_inner()
}

pub fn local_build() -> LocalBuild {
    LocalBuild::new(
        NaiveDate::from_ymd_opt(2024, 12, 1).expect("date should be valid"),
        "xyz",
    )
}

pub fn config_for(app: bool) -> UpdaterConfig {
    UpdaterConfig {
        refresh_interval_secs: 0,
        repository: app.then(|| RepositoryEndpoint::github("acme", "app")),
        helper_repository: RepositoryEndpoint::github("acme", "helper"),
        ..UpdaterConfig::default()
    }
}

/// Application repository with one newer release holding a manifest and a
/// Linux package, plus a helper repository with a Linux helper package.
pub fn standard_repositories() -> (FakeRepository, FakeRepository) {
    let helper_name = updraft_platform::executable_name("copyApp");
    let app = FakeRepository::named("app")
        .with_latest(release(
            10,
            "studio 25.01",
            2,
            vec![
                asset(1, MANIFEST_ASSET_NAME, ""),
                asset(2, "studio_linux_64.zip", "linux_64"),
                asset(3, "studio_winx86_64.zip", "winx86_64"),
            ],
        ))
        .with_payload(1, manifest("20250101 00:00", "abc"))
        .with_payload(
            2,
            zip_bytes(&[
                ("studio/bin/studio", b"new studio"),
                ("studio/share/readme.txt", b"readme"),
            ]),
        );
    let helper = FakeRepository::named("helper")
        .with_latest(release(
            20,
            "copyApp 1.0",
            1,
            vec![asset(30, "copyApp_linux_64.zip", "linux_64")],
        ))
        .with_payload(30, zip_bytes(&[(helper_name.as_str(), b"helper")]));
    (app, helper)
}

pub struct Shutdown {
    pub outcome: RunOutcome,
    /// Events emitted after the last one the test consumed.
    pub events: Vec<UpdateEvent>,
    pub app: Arc<FakeRepository>,
    pub launcher: Arc<RecordingLauncher>,
}

pub struct Harness {
    pub temp: TempDir,
    pub app: Arc<FakeRepository>,
    pub helper: Arc<FakeRepository>,
    pub launcher: Arc<RecordingLauncher>,
    pub intents: mpsc::Sender<UserIntent>,
    pub events: mpsc::Receiver<UpdateEvent>,
    pub config: watch::Sender<UpdaterConfig>,
    pub state: watch::Receiver<UpdateState>,
    pub run: JoinHandle<RunOutcome>,
}

impl Harness {
    pub fn start(
        app: FakeRepository,
        helper: FakeRepository,
        launcher: RecordingLauncher,
        config: UpdaterConfig,
    ) -> Self {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let app = Arc::new(app);
        let helper = Arc::new(helper);
        let launcher = Arc::new(launcher);
        let provider = FakeProvider {
            repositories: HashMap::from([
                ("app".to_string(), Arc::clone(&app)),
                ("helper".to_string(), Arc::clone(&helper)),
            ]),
        };

        let context = InstallContext {
            local_build: local_build(),
            target: PlatformTarget::new("linux", 64),
            staging_root: temp.path().join("cache").join("staging"),
            current_executable: temp
                .path()
                .join("install")
                .join("bin")
                .join(APP_EXECUTABLE),
        };

        let (config_tx, config_rx) = watch::channel(config);
        let (intent_tx, intent_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(256);
        let orchestrator = UpdateOrchestrator::new(
            context,
            config_rx,
            Arc::new(provider),
            Arc::clone(&launcher) as Arc<dyn HandoffLauncher>,
            event_tx,
        );
        let state = orchestrator.subscribe_state();
        let run = tokio::spawn(orchestrator.run(intent_rx));

        Self {
            temp,
            app,
            helper,
            launcher,
            intents: intent_tx,
            events: event_rx,
            config: config_tx,
            state,
            run,
        }
    }

    pub async fn send(&self, intent: UserIntent) {
        self.intents
            .send(intent)
            .await
            .expect("orchestrator should accept intents");
    }

    /// Collect events until one matches `done`, returning all of them.
    pub async fn events_until(
        &mut self,
        done: impl Fn(&UpdateEvent) -> bool,
    ) -> Vec<UpdateEvent> {
        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(30), self.events.recv())
                .await
                .expect("event should arrive in time")
                .expect("event channel should stay open");
            let finished = done(&event);
            seen.push(event);
            if finished {
                return seen;
            }
        }
    }

    pub async fn wait_for_state(&mut self, expected: UpdateState) {
        tokio::time::timeout(
            Duration::from_secs(30),
            self.state.wait_for(|state| *state == expected),
        )
        .await
        .expect("state should be reached in time")
        .expect("state channel should stay open");
    }

    /// Close the intent channel and wait for the orchestrator to stop.
    pub async fn shutdown(self) -> Shutdown {
        let Self {
            intents,
            mut events,
            run,
            app,
            launcher,
            ..
        } = self;
        drop(intents);
        let outcome = run.await.expect("orchestrator task should not panic");
        let mut rest = Vec::new();
        while let Ok(event) = events.try_recv() {
            rest.push(event);
        }
        Shutdown {
            outcome,
            events: rest,
            app,
            launcher,
        }
    }

    pub fn staging_root(&self) -> PathBuf {
        self.temp.path().join("cache").join("staging")
    }
}
