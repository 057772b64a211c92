use std::ffi::OsStr;
use std::fs::File;
use std::path::Path;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    ExtractError, ExtractProgress, ExtractRequest, ExtractionResult, PackageExtractor,
    ProgressTracker, entry_display_name,
};

/// Extracts zip archives in-process on the blocking pool.
///
/// The central directory is read once to total the uncompressed sizes, then
/// entries are written in archive order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomAccessExtractor;

#[async_trait]
impl PackageExtractor for RandomAccessExtractor {
    async fn extract(
        &self,
        request: ExtractRequest,
        progress: mpsc::Sender<ExtractProgress>,
        cancel: CancellationToken,
    ) -> Result<ExtractionResult, ExtractError> {
        if !request.archive.is_file() {
            return Err(ExtractError::ArchiveMissing(request.archive));
        }

        tokio::task::spawn_blocking(move || extract_zip(&request, &progress, &cancel))
            .await
            .map_err(|error| ExtractError::Worker(error.to_string()))?
    }
}

fn extract_zip(
    request: &ExtractRequest,
    progress: &mpsc::Sender<ExtractProgress>,
    cancel: &CancellationToken,
) -> Result<ExtractionResult, ExtractError> {
    let dest = &request.destination;
    let file = File::open(&request.archive).map_err(|error| {
        ExtractError::io_with_path("failed to open zip file", &request.archive, &error)
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| ExtractError::zip("failed to read zip archive", error))?;

    let mut total = 0u64;
    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|error| ExtractError::zip("failed to read zip entry", error))?;
        total = total.saturating_add(entry.size());
    }

    if cancel.is_cancelled() {
        return Err(ExtractError::Cancelled);
    }
    std::fs::create_dir_all(dest).map_err(|error| {
        ExtractError::io_with_path("failed to create extraction directory", dest, &error)
    })?;

    let target = OsStr::new(&request.target_name);
    let mut tracker = ProgressTracker::new(total);
    let mut executable_root = None;

    for i in 0..archive.len() {
        if cancel.is_cancelled() {
            debug!("Extraction of {} cancelled", request.archive.display());
            return Err(ExtractError::Cancelled);
        }

        let mut entry = archive
            .by_index(i)
            .map_err(|error| ExtractError::zip("failed to read zip entry", error))?;
        let size = entry.size();
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path");
            tracker.advance(size);
            continue;
        };
        let out_path = dest.join(&name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                ExtractError::io_with_path(
                    "failed to create extraction directory",
                    &out_path,
                    &error,
                )
            })?;
        } else {
            let _ = progress.blocking_send(ExtractProgress::Entry(entry_display_name(&name)));

            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|error| {
                    ExtractError::io_with_path(
                        "failed to create extraction parent directory",
                        parent,
                        &error,
                    )
                })?;
            }
            let mut outfile = File::create(&out_path).map_err(|error| {
                ExtractError::io_with_path("failed to create extracted file", &out_path, &error)
            })?;
            std::io::copy(&mut entry, &mut outfile).map_err(|error| {
                ExtractError::io_with_path("failed to extract archive entry", &out_path, &error)
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    let _ =
                        std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
                }
            }

            if name.file_name() == Some(target) {
                executable_root = out_path.parent().map(Path::to_path_buf);
            }
        }

        if let Some(percent) = tracker.advance(size) {
            let _ = progress.blocking_send(ExtractProgress::Percent(percent));
        }
    }

    let _ = progress.blocking_send(ExtractProgress::Percent(tracker.finish()));
    debug!("Extraction complete to {}", dest.display());

    Ok(ExtractionResult { executable_root })
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;

    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::RandomAccessExtractor;
    use crate::extract::{ExtractError, ExtractProgress, ExtractRequest, PackageExtractor};

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let zip_file = std::fs::File::create(path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(zip_file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        for (name, contents) in files {
            writer
                .start_file(*name, options)
                .expect("file entry should be started");
            writer
                .write_all(contents)
                .expect("file entry should be written");
        }
        writer.finish().expect("zip archive should be finalized");
    }

    fn request(root: &Path, archive: &Path, target: &str) -> ExtractRequest {
        ExtractRequest {
            archive: archive.to_path_buf(),
            destination: root.join("out"),
            target_name: target.to_string(),
        }
    }

    async fn drain(mut rx: mpsc::Receiver<ExtractProgress>) -> Vec<ExtractProgress> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn extracts_files_and_reports_executable_root() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let archive = temp.path().join("pkg.zip");
        write_zip(
            &archive,
            &[
                ("pkg/bin/app", b"binary-content"),
                ("pkg/share/readme.txt", b"hello"),
            ],
        );
        let (tx, rx) = mpsc::channel(64);
        let collector = tokio::spawn(drain(rx));

        let result = RandomAccessExtractor
            .extract(
                request(temp.path(), &archive, "app"),
                tx,
                CancellationToken::new(),
            )
            .await
            .expect("zip should extract");
        let events = collector.await.expect("collector should finish");

        let out = temp.path().join("out");
        assert_eq!(result.executable_root, Some(out.join("pkg").join("bin")));
        assert_eq!(
            std::fs::read(out.join("pkg/bin/app")).expect("extracted file should be readable"),
            b"binary-content"
        );
        assert!(events.contains(&ExtractProgress::Entry("readme.txt".to_string())));

        let percents: Vec<u8> = events
            .iter()
            .filter_map(|event| match event {
                ExtractProgress::Percent(p) => Some(*p),
                ExtractProgress::Entry(_) => None,
            })
            .collect();
        assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(percents.last(), Some(&100));
    }

    #[tokio::test]
    async fn missing_target_leaves_root_unset() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let archive = temp.path().join("pkg.zip");
        write_zip(&archive, &[("pkg/other", b"x")]);
        let (tx, _rx) = mpsc::channel(64);

        let result = RandomAccessExtractor
            .extract(
                request(temp.path(), &archive, "app"),
                tx,
                CancellationToken::new(),
            )
            .await
            .expect("zip should extract");

        assert!(result.executable_root.is_none());
    }

    #[tokio::test]
    async fn unsafe_paths_are_skipped() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let archive = temp.path().join("unsafe.zip");
        write_zip(&archive, &[("../outside.txt", b"should not be extracted")]);
        let (tx, _rx) = mpsc::channel(64);

        RandomAccessExtractor
            .extract(
                request(temp.path(), &archive, "app"),
                tx,
                CancellationToken::new(),
            )
            .await
            .expect("zip extraction should not fail");

        assert!(!temp.path().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn cancelled_token_stops_extraction_and_extractor_stays_usable() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let archive = temp.path().join("pkg.zip");
        let names: Vec<String> = (0..32).map(|i| format!("pkg/file{i:02}")).collect();
        let files: Vec<(&str, &[u8])> = names
            .iter()
            .map(|name| (name.as_str(), b"payload".as_slice()))
            .collect();
        write_zip(&archive, &files);

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    if matches!(event, ExtractProgress::Entry(_)) {
                        cancel.cancel();
                    }
                }
            })
        };

        let result = RandomAccessExtractor
            .extract(request(temp.path(), &archive, "app"), tx, cancel)
            .await;
        canceller.await.expect("canceller should finish");

        assert!(matches!(result, Err(ExtractError::Cancelled)));
        assert!(!temp.path().join("out/pkg/file31").exists());

        // Room for every entry and percent event of the full run.
        let (tx, _rx) = mpsc::channel(128);
        let retry = RandomAccessExtractor
            .extract(
                ExtractRequest {
                    destination: temp.path().join("retry"),
                    ..request(temp.path(), &archive, "file31")
                },
                tx,
                CancellationToken::new(),
            )
            .await
            .expect("extractor should work after a cancelled run");
        assert_eq!(
            retry.executable_root,
            Some(temp.path().join("retry").join("pkg"))
        );
    }

    #[tokio::test]
    async fn missing_archive_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let (tx, _rx) = mpsc::channel(8);

        let result = RandomAccessExtractor
            .extract(
                request(temp.path(), &temp.path().join("absent.zip"), "app"),
                tx,
                CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(ExtractError::ArchiveMissing(_))));
    }
}
