mod console;
mod logging;
mod settings;
mod single_instance;
mod watcher;

use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};
use updraft_core::{
    GitHubProvider, InstallContext, ProcessLauncher, RunOutcome, UpdateOrchestrator,
    cleanup_stale_staging, current_executable,
};
use updraft_platform::{AppPaths, PlatformTarget};

use crate::settings::AppSettings;
use crate::single_instance::{AcquireError, SingleInstance};

fn fail(message: &str) -> ExitCode {
    error!("{message}");
    eprintln!("updraft: {message}");
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let paths = match std::env::var_os("UPDRAFT_HOME") {
        Some(root) => Ok(AppPaths::rooted_at(root)),
        None => AppPaths::new(),
    };
    let paths = match paths {
        Ok(paths) => paths,
        Err(error) => return fail(&error.to_string()),
    };
    if let Err(error) = paths.ensure_dirs() {
        return fail(&format!("Cannot create application directories: {error}"));
    }

    let settings_path = paths.settings_file();
    let settings = AppSettings::load_from(&settings_path);
    if !settings_path.exists() {
        if let Err(error) = settings.save_to(&settings_path) {
            eprintln!("updraft: cannot write default settings: {error}");
        }
    }
    logging::init_logging(
        &paths.log_file(),
        settings.debug_logging,
        settings.max_log_size_bytes,
    );

    let _instance = match SingleInstance::acquire(&paths.instance_lock_file()) {
        Ok(instance) => instance,
        Err(AcquireError::AlreadyRunning) => {
            warn!("Another instance is already running, exiting");
            eprintln!("updraft: another instance is already running");
            return ExitCode::SUCCESS;
        }
        Err(error) => return fail(&error.to_string()),
    };

    let removed = cleanup_stale_staging(&paths.staging_root());
    if removed > 0 {
        info!("Removed {removed} stale staging directories");
    }

    let Some(local_build) = settings.local_build() else {
        return fail(&format!(
            "Build date unknown; set local_build in {}",
            settings_path.display()
        ));
    };
    let Some(target) = PlatformTarget::current() else {
        return fail("Unsupported platform, no release packages can match it");
    };
    let current_executable = match current_executable() {
        Ok(path) => path,
        Err(error) => return fail(&error.to_string()),
    };
    if settings.updater.repository.is_none() {
        warn!(
            "No application repository configured in {}, update checks are off",
            settings_path.display()
        );
    }

    info!(
        "updraft {} for {target}, build {}",
        env!("CARGO_PKG_VERSION"),
        local_build.build_date
    );
    let context = InstallContext {
        local_build,
        target,
        staging_root: paths.staging_root(),
        current_executable,
    };

    let (config_tx, config_rx) = watch::channel(settings.updater.clone());
    let (intent_tx, intent_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(64);

    let orchestrator = UpdateOrchestrator::new(
        context,
        config_rx,
        Arc::new(GitHubProvider),
        Arc::new(ProcessLauncher),
        event_tx,
    );
    let state = orchestrator.subscribe_state();

    let settings_watcher =
        watcher::spawn_settings_watcher(settings_path, config_tx, watcher::SETTINGS_POLL_INTERVAL);
    let printer = tokio::spawn(console::print_events(event_rx));
    tokio::spawn(console::read_commands(
        BufReader::new(tokio::io::stdin()),
        intent_tx,
    ));

    let outcome = tokio::select! {
        outcome = orchestrator.run(intent_rx) => Some(outcome),
        result = tokio::signal::ctrl_c() => {
            if let Err(error) = result {
                error!("Cannot listen for interrupts: {error}");
            }
            if state.borrow().is_session_active() {
                warn!("Interrupted during an update, the staged files are kept");
            }
            None
        }
    };

    settings_watcher.abort();
    let _ = printer.await;

    match outcome {
        Some(RunOutcome::Handoff) => {
            info!("Helper is running, exiting so it can replace the installation");
            std::process::exit(0);
        }
        Some(RunOutcome::Shutdown) => {
            info!("Console closed, stopping");
            ExitCode::SUCCESS
        }
        None => {
            info!("Interrupted, stopping");
            // Blocking stdin read would keep the runtime alive.
            std::process::exit(130);
        }
    }
}
