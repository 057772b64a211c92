/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    /// A newer build is available and waits for confirmation.
    UpdateFound {
        release_name: String,
        notes: String,
        /// The new build ships a different object definition set.
        content_differs: bool,
    },
    /// Headline for the step now running.
    Operation(String),
    /// Detail line, e.g. bytes received or the entry being extracted.
    ProgressText(String),
    Progress(u8),
    Failed(String),
    Cancelled,
    /// The helper is running; this process is about to exit.
    HandoffStarted,
}

/// Requests coming from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIntent {
    StartUpdate,
    CancelDownload,
    DialogClosed { suppress_future_checks: bool },
    CheckNow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Handoff,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdateState {
    #[default]
    Idle,
    Checking,
    /// An update was announced and the user has not answered yet.
    Found,
    Downloading,
    Extracting,
    ReadyToHandoff,
    Terminal(SessionEnd),
}

impl UpdateState {
    #[must_use]
    pub fn is_session_active(self) -> bool {
        matches!(
            self,
            Self::Downloading | Self::Extracting | Self::ReadyToHandoff
        )
    }
}

/// Why [`super::UpdateOrchestrator::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The helper was started; the process should exit now.
    Handoff,
    /// The intent channel closed.
    Shutdown,
}
