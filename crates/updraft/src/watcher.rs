use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use updraft_core::UpdaterConfig;

use crate::logging::set_debug_logging;
use crate::settings::AppSettings;

pub const SETTINGS_POLL_INTERVAL: Duration = Duration::from_secs(5);

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
}

/// Poll the settings file and push updater changes into `config`. Stops when
/// every receiver is gone.
pub fn spawn_settings_watcher(
    path: PathBuf,
    config: watch::Sender<UpdaterConfig>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_modified = modified_time(&path);
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = config.closed() => {
                    debug!("Settings watcher stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let modified = modified_time(&path);
            if modified == last_modified {
                continue;
            }
            last_modified = modified;

            let settings = match AppSettings::try_load_from(&path) {
                Ok(settings) => settings,
                Err(error) => {
                    warn!(
                        "Keeping current settings, cannot reload {}: {error}",
                        path.display()
                    );
                    continue;
                }
            };

            set_debug_logging(settings.debug_logging);
            let changed = config.send_if_modified(|current| {
                if *current == settings.updater {
                    false
                } else {
                    *current = settings.updater;
                    true
                }
            });
            if changed {
                info!("Reloaded updater settings from {}", path.display());
            }
        }
    })
}
