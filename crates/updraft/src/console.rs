//! Line-oriented presentation layer: prints update events to stdout and turns
//! typed commands into user intents.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use updraft_core::{UpdateEvent, UserIntent};

const HELP: &str =
    "Commands: yes (install), no (later), never (stop asking), cancel, check, quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Intent(UserIntent),
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Option<Command> {
    let command = match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "update" => Command::Intent(UserIntent::StartUpdate),
        "n" | "no" | "later" => Command::Intent(UserIntent::DialogClosed {
            suppress_future_checks: false,
        }),
        "never" => Command::Intent(UserIntent::DialogClosed {
            suppress_future_checks: true,
        }),
        "c" | "cancel" => Command::Intent(UserIntent::CancelDownload),
        "check" => Command::Intent(UserIntent::CheckNow),
        "h" | "help" | "?" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        _ => return None,
    };
    Some(command)
}

/// One or more lines of text for `event`.
pub fn render_event(event: &UpdateEvent) -> String {
    match event {
        UpdateEvent::UpdateFound {
            release_name,
            notes,
            content_differs,
        } => {
            let mut text = format!("Update available: {release_name}\n");
            if !notes.trim().is_empty() {
                text.push_str(notes.trim_end());
                text.push('\n');
            }
            if *content_differs {
                text.push_str(
                    "This update changes the object definitions; \
                     matching firmware may be required.\n",
                );
            }
            text.push_str("Install now? [yes/no/never]");
            text
        }
        UpdateEvent::Operation(text) => format!("==> {text}"),
        UpdateEvent::ProgressText(text) => format!("    {text}"),
        UpdateEvent::Progress(percent) => format!("    {percent:>3}%"),
        UpdateEvent::Failed(message) => format!("Update failed: {message}"),
        UpdateEvent::Cancelled => "Update cancelled".to_string(),
        UpdateEvent::HandoffStarted => "Installer started, exiting".to_string(),
    }
}

/// Print events until the orchestrator drops its sender.
pub async fn print_events(mut events: mpsc::Receiver<UpdateEvent>) {
    let mut last_percent = None;
    while let Some(event) = events.recv().await {
        if let UpdateEvent::Progress(percent) = event {
            if last_percent == Some(percent) {
                continue;
            }
            last_percent = Some(percent);
        } else if matches!(event, UpdateEvent::Operation(_)) {
            last_percent = None;
        }

        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", render_event(&event));
        let _ = stdout.flush();
    }
}

/// Forward commands from `input` until it ends, the user quits, or the
/// orchestrator stops listening.
pub async fn read_commands<R>(input: R, intents: mpsc::Sender<UserIntent>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                log::debug!("Console input closed");
                return;
            }
            Err(error) => {
                log::warn!("Cannot read console input: {error}");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Some(Command::Intent(intent)) => {
                if intents.send(intent).await.is_err() {
                    return;
                }
            }
            Some(Command::Help) => println!("{HELP}"),
            Some(Command::Quit) => return,
            None => println!("Unknown command {:?}. {HELP}", line.trim()),
        }
    }
}
