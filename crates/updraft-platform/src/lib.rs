mod commands;
mod paths;
mod target;

pub use commands::{Detach, HideWindow};
pub use paths::{AppPaths, AppPathsError};
pub use target::{OsFamily, PlatformTarget, executable_name, host_word_size};
