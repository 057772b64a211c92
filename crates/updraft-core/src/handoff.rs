use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;
use updraft_platform::Detach;

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("Helper executable not found at {}", .0.display())]
    HelperMissing(PathBuf),

    #[error("Cannot derive {what} from {}", path.display())]
    Layout { what: &'static str, path: PathBuf },

    #[error("Failed to locate the running executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("Failed to prepare helper {}: {source}", path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start helper {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything the helper needs to replace the installed application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRequest {
    pub helper_executable: PathBuf,
    /// Freshly extracted application tree.
    pub new_app_dir: PathBuf,
    /// Directory the running application was installed into.
    pub install_dir: PathBuf,
    /// Binary to relaunch once files are in place.
    pub current_executable: PathBuf,
}

impl HandoffRequest {
    /// Derive the request from extraction results and the running binary.
    ///
    /// The new application dir is the parent of the directory holding the new
    /// executable, mirroring how the install dir is the parent of the
    /// directory holding the running one.
    ///
    /// # Errors
    /// Returns an error when either executable directory has no parent.
    pub fn from_layout(
        helper_root: &Path,
        helper_executable_name: &str,
        package_executable_root: &Path,
        current_executable: &Path,
    ) -> Result<Self, HandoffError> {
        let new_app_dir = package_executable_root
            .parent()
            .ok_or_else(|| HandoffError::Layout {
                what: "new application directory",
                path: package_executable_root.to_path_buf(),
            })?;
        let install_dir = current_executable
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| HandoffError::Layout {
                what: "install directory",
                path: current_executable.to_path_buf(),
            })?;

        Ok(Self {
            helper_executable: helper_root.join(helper_executable_name),
            new_app_dir: new_app_dir.to_path_buf(),
            install_dir: install_dir.to_path_buf(),
            current_executable: current_executable.to_path_buf(),
        })
    }

    /// Helper arguments in the order it expects them.
    #[must_use]
    pub fn arguments(&self) -> [&Path; 3] {
        [
            &self.new_app_dir,
            &self.install_dir,
            &self.current_executable,
        ]
    }
}

/// Starts the helper that finishes the install after this process exits.
pub trait HandoffLauncher: Send + Sync {
    /// Spawn the helper detached from this process. Returning `Ok` means the
    /// caller should exit promptly.
    ///
    /// # Errors
    /// Returns an error if the helper cannot be started.
    fn launch(&self, request: &HandoffRequest) -> Result<(), HandoffError>;
}

/// Launches the helper as a real detached OS process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl HandoffLauncher for ProcessLauncher {
    fn launch(&self, request: &HandoffRequest) -> Result<(), HandoffError> {
        let helper = &request.helper_executable;
        if !helper.is_file() {
            return Err(HandoffError::HelperMissing(helper.clone()));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(helper, std::fs::Permissions::from_mode(0o755)).map_err(
                |source| HandoffError::Permissions {
                    path: helper.clone(),
                    source,
                },
            )?;
        }

        let child = std::process::Command::new(helper)
            .args(request.arguments())
            .detach()
            .spawn()
            .map_err(|source| HandoffError::Spawn {
                path: helper.clone(),
                source,
            })?;

        info!(
            "Started helper {} (pid {}) to install {} into {}",
            helper.display(),
            child.id(),
            request.new_app_dir.display(),
            request.install_dir.display()
        );
        Ok(())
    }
}

/// Path of the running binary.
///
/// # Errors
/// Returns an error if the OS cannot report it.
pub fn current_executable() -> Result<PathBuf, HandoffError> {
    std::env::current_exe().map_err(HandoffError::CurrentExe)
}
