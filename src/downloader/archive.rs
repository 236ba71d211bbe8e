//! ZIP archive download and CSV extraction

use crate::downloader::progress::{LogProgress, ProgressReporter};
use crate::errors::{AnsError, Result};
use futures::StreamExt;
use reqwest::Client;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// The CSV left on disk after a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    /// Extracted CSV, owned by the caller from here on
    pub csv_path: PathBuf,
    /// Name of the archive it came from (already deleted)
    pub archive_name: String,
    /// Bytes received for the archive
    pub bytes_downloaded: u64,
}

/// Downloads ZIP archives and extracts their single CSV payload
#[derive(Clone)]
pub struct ArchiveFetcher {
    client: Client,
    download_dir: PathBuf,
    progress: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for ArchiveFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveFetcher")
            .field("download_dir", &self.download_dir)
            .finish_non_exhaustive()
    }
}

impl ArchiveFetcher {
    pub fn new(client: Client, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            download_dir: download_dir.into(),
            progress: Arc::new(LogProgress::default()),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Download `url`, extract its CSV and delete the archive.
    ///
    /// Repeated calls for the same URL download again.
    pub async fn fetch(&self, url: &str) -> Result<LocalArtifact> {
        let (archive_path, bytes_downloaded) = self.download(url).await?;
        let archive_name = file_name_from_url(url);

        let extracted = {
            let archive_path = archive_path.clone();
            let download_dir = self.download_dir.clone();
            tokio::task::spawn_blocking(move || extract_csv(&archive_path, &download_dir)).await?
        };

        match extracted {
            Ok(csv_path) => {
                tokio::fs::remove_file(&archive_path).await?;
                debug!("Removed archive {}", archive_path.display());
                Ok(LocalArtifact {
                    csv_path,
                    archive_name,
                    bytes_downloaded,
                })
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&archive_path).await {
                    warn!(
                        "Failed to remove archive {}: {}",
                        archive_path.display(),
                        remove_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Stream the response body into the download directory
    pub async fn download(&self, url: &str) -> Result<(PathBuf, u64)> {
        tokio::fs::create_dir_all(&self.download_dir).await?;

        let file_name = file_name_from_url(url);
        let archive_path = self.download_dir.join(&file_name);

        debug!("Downloading archive from: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| AnsError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnsError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length().unwrap_or(0);
        self.progress.start(&file_name, total);

        let progress = self.progress.as_ref();
        let written = match stream_to_file(response, url, &archive_path, progress).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&archive_path).await;
                return Err(e);
            }
        };

        self.progress.finish(&file_name);
        debug!("Archive written to {}", archive_path.display());
        Ok((archive_path, written))
    }
}

async fn stream_to_file(
    response: reqwest::Response,
    url: &str,
    path: &Path,
    progress: &dyn ProgressReporter,
) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| AnsError::Request {
            url: url.to_string(),
            source,
        })?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        progress.advance(chunk.len() as u64);
    }

    file.flush().await?;
    Ok(written)
}

/// Extract the first `.csv` entry (case-insensitive) of `zip_path` into `dest_dir`.
///
/// Archives on the ANS server carry one CSV each. When more than one is
/// present the first in archive order wins and the rest are ignored.
pub fn extract_csv(zip_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let archive_name = zip_path.display().to_string();
    let file = File::open(zip_path)?;
    let mut archive = ZipArchive::new(file).map_err(|source| AnsError::Archive {
        archive: archive_name.clone(),
        source,
    })?;

    let mut csv_entries = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index(index).map_err(|source| AnsError::Archive {
            archive: archive_name.clone(),
            source,
        })?;
        if !entry.is_dir() && entry.name().to_ascii_lowercase().ends_with(".csv") {
            csv_entries.push(index);
        }
    }

    let index = match csv_entries.as_slice() {
        [] => {
            return Err(AnsError::NoCsvEntry {
                archive: archive_name,
            })
        }
        [only] => *only,
        [first, rest @ ..] => {
            warn!(
                "{} contains {} CSV files, using the first one",
                archive_name,
                rest.len() + 1
            );
            *first
        }
    };

    let mut entry = archive.by_index(index).map_err(|source| AnsError::Archive {
        archive: archive_name.clone(),
        source,
    })?;

    let relative = entry
        .enclosed_name()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| AnsError::UnsafeEntryPath {
            archive: archive_name.clone(),
            entry: entry.name().to_string(),
        })?;

    let csv_path = dest_dir.join(relative);
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut out = File::create(&csv_path)?;
    std::io::copy(&mut entry, &mut out)?;

    info!("CSV extracted: {}", csv_path.display());
    Ok(csv_path)
}

fn file_name_from_url(url: &str) -> String {
    let path = url.split(&['?', '#'][..]).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "download.zip".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::zip_bytes;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<(String, u64)>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn start(&self, name: &str, total: u64) {
            self.events.lock().unwrap().push((format!("start {}", name), total));
        }

        fn advance(&self, bytes: u64) {
            self.events.lock().unwrap().push(("advance".to_string(), bytes));
        }

        fn finish(&self, name: &str) {
            self.events.lock().unwrap().push((format!("finish {}", name), 0));
        }
    }

    async fn serve(server: &MockServer, route: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("http://h/202401/pda-024-icb-AC-2024_01.zip"),
            "pda-024-icb-AC-2024_01.zip"
        );
        assert_eq!(file_name_from_url("http://h/2021/4T2021.zip?x=1"), "4T2021.zip");
        assert_eq!(file_name_from_url("http://h/dir/"), "download.zip");
    }

    #[tokio::test]
    async fn test_fetch_extracts_csv_and_removes_zip() {
        let server = MockServer::start().await;
        let csv = b"ID;VALUE\n1;\"a;b\"\n2;c\n".to_vec();
        serve(&server, "/202401/data.zip", zip_bytes(&[("data.csv", &csv)])).await;

        let temp_dir = TempDir::new().unwrap();
        let fetcher = ArchiveFetcher::new(Client::new(), temp_dir.path().join("dl"));
        let url = format!("{}/202401/data.zip", server.uri());

        let artifact = fetcher.fetch(&url).await.unwrap();
        assert_eq!(artifact.csv_path, temp_dir.path().join("dl").join("data.csv"));
        assert_eq!(std::fs::read(&artifact.csv_path).unwrap(), csv);
        assert_eq!(artifact.archive_name, "data.zip");
        assert!(artifact.bytes_downloaded > 0);
        assert!(!temp_dir.path().join("dl").join("data.zip").exists());
    }

    #[tokio::test]
    async fn test_fetch_reports_progress() {
        let server = MockServer::start().await;
        let body = zip_bytes(&[("x.CSV", b"A\n1\n")]);
        let size = body.len() as u64;
        serve(&server, "/x.zip", body).await;

        let temp_dir = TempDir::new().unwrap();
        let progress = Arc::new(RecordingProgress::default());
        let fetcher =
            ArchiveFetcher::new(Client::new(), temp_dir.path()).with_progress(progress.clone());
        fetcher
            .fetch(&format!("{}/x.zip", server.uri()))
            .await
            .unwrap();

        let events = progress.events.lock().unwrap();
        assert_eq!(events.first().unwrap(), &("start x.zip".to_string(), size));
        assert_eq!(events.last().unwrap().0, "finish x.zip");
        let advanced: u64 = events
            .iter()
            .filter(|(e, _)| e == "advance")
            .map(|(_, n)| n)
            .sum();
        assert_eq!(advanced, size);
    }

    #[tokio::test]
    async fn test_fetch_without_csv_is_format_error() {
        let server = MockServer::start().await;
        serve(&server, "/empty.zip", zip_bytes(&[("readme.txt", b"hello")])).await;

        let temp_dir = TempDir::new().unwrap();
        let fetcher = ArchiveFetcher::new(Client::new(), temp_dir.path());
        let err = fetcher
            .fetch(&format!("{}/empty.zip", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, AnsError::NoCsvEntry { .. }));
        assert_eq!(err.kind(), crate::errors::ErrorKind::Format);
        assert!(!temp_dir.path().join("empty.zip").exists());
    }

    #[tokio::test]
    async fn test_fetch_corrupt_archive() {
        let server = MockServer::start().await;
        serve(&server, "/bad.zip", b"this is not a zip".to_vec()).await;

        let temp_dir = TempDir::new().unwrap();
        let fetcher = ArchiveFetcher::new(Client::new(), temp_dir.path());
        let err = fetcher
            .fetch(&format!("{}/bad.zip", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, AnsError::Archive { .. }));
    }

    #[tokio::test]
    async fn test_fetch_missing_archive_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let fetcher = ArchiveFetcher::new(Client::new(), temp_dir.path());
        let url = format!("{}/missing.zip", server.uri());
        let err = fetcher.fetch(&url).await.unwrap_err();

        match err {
            AnsError::HttpStatus { url: failed, status } => {
                assert_eq!(failed, url);
                assert_eq!(status, 404);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!temp_dir.path().join("missing.zip").exists());
    }

    #[test]
    fn test_extract_picks_first_csv_in_archive_order() {
        let temp_dir = TempDir::new().unwrap();
        let zip_path = temp_dir.path().join("multi.zip");
        std::fs::write(
            &zip_path,
            zip_bytes(&[
                ("notes.txt", b"n"),
                ("nested/second.csv", b"B\n2\n"),
                ("first.csv", b"A\n1\n"),
            ]),
        )
        .unwrap();

        let out_dir = temp_dir.path().join("out");
        let csv_path = extract_csv(&zip_path, &out_dir).unwrap();
        assert_eq!(csv_path, out_dir.join("nested").join("second.csv"));
        assert_eq!(std::fs::read_to_string(csv_path).unwrap(), "B\n2\n");
        assert!(!out_dir.join("first.csv").exists());
    }

    #[test]
    fn test_extract_rejects_path_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let zip_path = temp_dir.path().join("evil.zip");
        std::fs::write(&zip_path, zip_bytes(&[("../../evil.csv", b"A\n1\n")])).unwrap();

        let err = extract_csv(&zip_path, &temp_dir.path().join("out")).unwrap_err();
        assert!(matches!(err, AnsError::UnsafeEntryPath { .. }));
    }
}
