use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, trace};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use updraft_platform::HideWindow;

use super::verbose::{VerboseEntry, parse_verbose_line};
use super::{
    ExtractError, ExtractProgress, ExtractRequest, ExtractionResult, PackageExtractor,
    ProgressTracker, entry_display_name,
};

const STDERR_TAIL_LINES: usize = 20;

/// Extracts through the system `tar` tool, one member at a time.
///
/// A listing pass sums member sizes first; the extraction pass then turns
/// each verbose output line into an entry notification and a percentage.
#[derive(Debug, Clone, Default)]
pub struct SequentialStreamExtractor {
    tool: Option<PathBuf>,
}

impl SequentialStreamExtractor {
    /// Use a specific `tar` binary instead of looking one up on `PATH`.
    #[must_use]
    pub fn with_tool(tool: impl Into<PathBuf>) -> Self {
        Self {
            tool: Some(tool.into()),
        }
    }

    fn resolve_tool(&self) -> Result<PathBuf, ExtractError> {
        match &self.tool {
            Some(tool) => Ok(tool.clone()),
            None => which::which("tar")
                .map_err(|error| ExtractError::ToolUnavailable(error.to_string())),
        }
    }

    async fn list_members(
        tool: &Path,
        archive: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<VerboseEntry>, ExtractError> {
        let mut command = Command::new(tool);
        command
            .arg("-tvvf")
            .arg(archive)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .hide_window();

        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ExtractError::Cancelled),
            output = command.output() => output.map_err(|error| {
                ExtractError::io_with_path("failed to run tar listing", tool, &error)
            })?,
        };

        if !output.status.success() {
            return Err(ExtractError::ToolFailed {
                tool: "tar",
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(parse_verbose_line)
            .collect())
    }
}

#[async_trait]
impl PackageExtractor for SequentialStreamExtractor {
    async fn extract(
        &self,
        request: ExtractRequest,
        progress: mpsc::Sender<ExtractProgress>,
        cancel: CancellationToken,
    ) -> Result<ExtractionResult, ExtractError> {
        if !request.archive.is_file() {
            return Err(ExtractError::ArchiveMissing(request.archive));
        }
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let tool = self.resolve_tool()?;
        tokio::fs::create_dir_all(&request.destination)
            .await
            .map_err(|error| {
                ExtractError::io_with_path(
                    "failed to create extraction directory",
                    &request.destination,
                    &error,
                )
            })?;

        let members = Self::list_members(&tool, &request.archive, &cancel).await?;
        let total: u64 = members.iter().filter_map(|member| member.size).sum();
        // bsdtar echoes `x path` during extraction, without sizes.
        let listed_sizes: HashMap<&Path, u64> = members
            .iter()
            .filter_map(|member| Some((member.path.as_path(), member.size?)))
            .collect();
        let target = OsStr::new(&request.target_name);
        let mut executable_root = members
            .iter()
            .find(|member| is_target(member, target))
            .and_then(|member| member_parent(&request.destination, member));

        debug!(
            "Extracting {} ({} members, {total} bytes) into {}",
            request.archive.display(),
            members.len(),
            request.destination.display()
        );

        let mut child = Command::new(&tool)
            .arg("-xvvf")
            .arg(&request.archive)
            .arg("-C")
            .arg(&request.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .hide_window()
            .spawn()
            .map_err(|error| ExtractError::io_with_path("failed to start tar", &tool, &error))?;

        let mut stdout = child.stdout.take().map(BufReader::new);
        let mut stderr = child.stderr.take().map(BufReader::new);
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let mut stderr_tail: Vec<String> = Vec::new();
        let mut tracker = ProgressTracker::new(total);

        while stdout.is_some() || stderr.is_some() {
            let (line, from_stderr) = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = child.kill().await;
                    debug!("Extraction of {} cancelled", request.archive.display());
                    return Err(ExtractError::Cancelled);
                }
                line = read_line_lossy(stdout.as_mut(), &mut stdout_buf), if stdout.is_some() => {
                    let line = line.map_err(|error| ExtractError::io("failed to read tar output", error))?;
                    if line.is_none() {
                        stdout = None;
                    }
                    (line, false)
                }
                line = read_line_lossy(stderr.as_mut(), &mut stderr_buf), if stderr.is_some() => {
                    let line = line.map_err(|error| ExtractError::io("failed to read tar output", error))?;
                    if line.is_none() {
                        stderr = None;
                    }
                    (line, true)
                }
            };

            let Some(line) = line else {
                continue;
            };

            let Some(member) = parse_verbose_line(&line) else {
                trace!("Skipping tar output line: {line}");
                if from_stderr && !line.trim().is_empty() {
                    if stderr_tail.len() == STDERR_TAIL_LINES {
                        stderr_tail.remove(0);
                    }
                    stderr_tail.push(line);
                }
                continue;
            };

            if !member.is_dir {
                let _ = progress
                    .send(ExtractProgress::Entry(entry_display_name(&member.path)))
                    .await;
            }
            if is_target(&member, target) {
                executable_root = member_parent(&request.destination, &member);
            }
            let bytes = member
                .size
                .or_else(|| listed_sizes.get(member.path.as_path()).copied())
                .unwrap_or(0);
            if let Some(percent) = tracker.advance(bytes) {
                let _ = progress.send(ExtractProgress::Percent(percent)).await;
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|error| ExtractError::io("failed to wait for tar", error))?;
        if !status.success() {
            return Err(ExtractError::ToolFailed {
                tool: "tar",
                status: status.to_string(),
                stderr: stderr_tail.join("\n"),
            });
        }

        let _ = progress
            .send(ExtractProgress::Percent(tracker.finish()))
            .await;
        debug!("Extraction complete to {}", request.destination.display());

        Ok(ExtractionResult { executable_root })
    }
}

fn is_target(member: &VerboseEntry, target: &OsStr) -> bool {
    !member.is_dir && member.path.file_name() == Some(target)
}

fn member_parent(destination: &Path, member: &VerboseEntry) -> Option<PathBuf> {
    destination.join(&member.path).parent().map(Path::to_path_buf)
}

/// Read one line, replacing invalid UTF-8. Partial reads stay in `buf`, so the
/// future can be dropped by `select!` and polled again later.
async fn read_line_lossy<R>(
    reader: Option<&mut R>,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(None);
    };
    let read = reader.read_until(b'\n', buf).await?;
    if read == 0 && buf.is_empty() {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\r', '\n'])
        .to_string();
    buf.clear();
    Ok(Some(line))
}
