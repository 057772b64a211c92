use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    Windows,
    MacOs,
}

impl OsFamily {
    #[must_use]
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Self::Linux)
        } else if cfg!(target_os = "windows") {
            Some(Self::Windows)
        } else if cfg!(target_os = "macos") {
            Some(Self::MacOs)
        } else {
            None
        }
    }

    /// Token release authors put in asset labels for this OS.
    #[must_use]
    pub fn asset_token(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "winx86",
            Self::MacOs => "osx",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Linux => "Linux",
            Self::Windows => "Windows",
            Self::MacOs => "macOS",
        }
    }

    #[must_use]
    pub fn executable_suffix(self) -> &'static str {
        match self {
            Self::Windows => ".exe",
            Self::Linux | Self::MacOs => "",
        }
    }
}

/// OS token plus pointer width, used to pick the right package from a
/// release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformTarget {
    os_token: String,
    word_size: u8,
}

impl PlatformTarget {
    #[must_use]
    pub fn new(os_token: impl Into<String>, word_size: u8) -> Self {
        Self {
            os_token: os_token.into(),
            word_size,
        }
    }

    /// Target for the running host, or `None` on an OS that has no packages.
    #[must_use]
    pub fn current() -> Option<Self> {
        OsFamily::current().map(|os| Self::new(os.asset_token(), host_word_size()))
    }

    #[must_use]
    pub fn os_token(&self) -> &str {
        &self.os_token
    }

    #[must_use]
    pub fn word_size(&self) -> u8 {
        self.word_size
    }

    /// `<os>_<word size>`, e.g. `linux_64`.
    #[must_use]
    pub fn preferred_token(&self) -> String {
        format!("{}_{}", self.os_token, self.word_size)
    }

    /// `<os>_32` on a 64-bit host, which can run 32-bit packages.
    #[must_use]
    pub fn compatible_token(&self) -> Option<String> {
        (self.word_size == 64).then(|| format!("{}_32", self.os_token))
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.preferred_token())
    }
}

#[must_use]
pub fn host_word_size() -> u8 {
    if cfg!(target_pointer_width = "64") {
        64
    } else {
        32
    }
}

/// Append the platform executable suffix (`.exe` on Windows) to `base`.
#[must_use]
pub fn executable_name(base: &str) -> String {
    let suffix = OsFamily::current().map_or("", OsFamily::executable_suffix);
    if suffix.is_empty() || base.ends_with(suffix) {
        base.to_string()
    } else {
        format!("{base}{suffix}")
    }
}
