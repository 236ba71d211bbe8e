//! Dataset builders: validate, fan out over archives, merge
//!
//! Each dataset family (beneficiaries, financial statements) turns a
//! validated request into a list of [`ArchiveDescriptor`]s. The shared
//! [`DatasetBuilder`] fetches them one after another and hands the
//! extracted CSVs to the [`CsvMerger`](crate::merge::CsvMerger).

pub mod beneficiaries;
pub mod filter;
pub mod financial;
pub mod table;

pub use beneficiaries::{BeneficiaryRequest, Beneficiaries};
pub use filter::{filter_by_registration, FilterReport};
pub use financial::{FinancialRequest, FinancialStatements};
pub use table::{MergedDataset, RowBatches, Table};

use crate::config::FailurePolicy;
use crate::downloader::ArchiveFetcher;
use crate::errors::{AnsError, Result};
use crate::merge::CsvMerger;
use crate::models::RegionCode;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One archive to fetch, derived from (region, period)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDescriptor {
    pub region: Option<RegionCode>,
    pub period: String,
    pub url: String,
}

impl ArchiveDescriptor {
    pub fn label(&self) -> String {
        match self.region {
            Some(region) => format!("{} {}", region, self.period),
            None => self.period.clone(),
        }
    }
}

/// Sequential fetch-then-merge pipeline shared by the dataset families
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    fetcher: ArchiveFetcher,
    merger: CsvMerger,
    policy: FailurePolicy,
}

impl DatasetBuilder {
    pub fn new(fetcher: ArchiveFetcher, merger: CsvMerger, policy: FailurePolicy) -> Self {
        Self {
            fetcher,
            merger,
            policy,
        }
    }

    /// Fetch every archive in order and return the extracted CSV paths.
    ///
    /// `ranged` selects the [`FailurePolicy::Auto`] behaviour.
    pub async fn fetch_all(
        &self,
        descriptors: &[ArchiveDescriptor],
        ranged: bool,
    ) -> Result<Vec<PathBuf>> {
        let skip_failures = self.policy.skips_failures(ranged);
        let mut csv_paths = Vec::with_capacity(descriptors.len());

        for (index, descriptor) in descriptors.iter().enumerate() {
            info!(
                "Downloading archive {}/{}: {}",
                index + 1,
                descriptors.len(),
                descriptor.url
            );

            match self.fetcher.fetch(&descriptor.url).await {
                Ok(artifact) => csv_paths.push(artifact.csv_path),
                Err(e) => {
                    let err = AnsError::Download {
                        target: descriptor.label(),
                        source: Box::new(e),
                    };
                    if !skip_failures {
                        return Err(err);
                    }
                    warn!("✗ {}", err);
                }
            }
        }

        if csv_paths.is_empty() {
            return Err(AnsError::NothingDownloaded);
        }

        info!(
            "Fetched {} of {} archives",
            csv_paths.len(),
            descriptors.len()
        );
        Ok(csv_paths)
    }

    /// Fetch all archives and merge them into `output`
    pub async fn build(
        &self,
        descriptors: &[ArchiveDescriptor],
        ranged: bool,
        output: &Path,
    ) -> Result<MergedDataset> {
        let csv_paths = self.fetch_all(descriptors, ranged).await?;

        let merger = self.merger.clone();
        let inputs = csv_paths.clone();
        let output = output.to_path_buf();
        let merged_to = output.clone();
        let report =
            tokio::task::spawn_blocking(move || merger.merge(&inputs, &merged_to)).await??;

        Ok(MergedDataset::new(output, report, csv_paths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::test_support::zip_bytes;
    use reqwest::Client;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with(archives: &[(&str, &str)]) -> MockServer {
        let server = MockServer::start().await;
        for (name, csv) in archives {
            let csv_name = name.replace(".zip", ".csv");
            Mock::given(method("GET"))
                .and(path(format!("/{}", name)))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_bytes(zip_bytes(&[(csv_name.as_str(), csv.as_bytes())])),
                )
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        server
    }

    fn descriptors(server: &MockServer, names: &[&str]) -> Vec<ArchiveDescriptor> {
        names
            .iter()
            .map(|name| ArchiveDescriptor {
                region: Some(RegionCode::AC),
                period: name.to_string(),
                url: format!("{}/{}", server.uri(), name),
            })
            .collect()
    }

    fn builder(dir: &Path, policy: FailurePolicy) -> DatasetBuilder {
        DatasetBuilder::new(
            ArchiveFetcher::new(Client::new(), dir.join("dl")),
            CsvMerger::new(2),
            policy,
        )
    }

    #[tokio::test]
    async fn test_build_merges_in_descriptor_order() {
        let server = server_with(&[("a.zip", "ID\n1\n2\n"), ("b.zip", "ID\n3\n")]).await;
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.csv");

        let dataset = builder(dir.path(), FailurePolicy::Auto)
            .build(&descriptors(&server, &["b.zip", "a.zip"]), true, &out)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "ID\n3\n1\n2\n");
        assert_eq!(dataset.report().rows_written, 3);
        assert_eq!(dataset.artifacts().len(), 2);
    }

    #[tokio::test]
    async fn test_ranged_build_skips_failed_archive() {
        let server = server_with(&[("a.zip", "ID\n1\n"), ("c.zip", "ID\n3\n")]).await;
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.csv");

        builder(dir.path(), FailurePolicy::Auto)
            .build(&descriptors(&server, &["a.zip", "b.zip", "c.zip"]), true, &out)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "ID\n1\n3\n");
    }

    #[tokio::test]
    async fn test_single_period_fails_fast() {
        let server = server_with(&[("a.zip", "ID\n1\n")]).await;
        let dir = TempDir::new().unwrap();

        let err = builder(dir.path(), FailurePolicy::Auto)
            .fetch_all(&descriptors(&server, &["missing.zip", "a.zip"]), false)
            .await
            .unwrap_err();

        match err {
            AnsError::Download { target, source } => {
                assert_eq!(target, "AC missing.zip");
                assert_eq!(source.kind(), ErrorKind::Network);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_explicit_policies_override_auto() {
        let server = server_with(&[("a.zip", "ID\n1\n")]).await;
        let dir = TempDir::new().unwrap();
        let items = descriptors(&server, &["missing.zip", "a.zip"]);

        let paths = builder(dir.path(), FailurePolicy::SkipFailed)
            .fetch_all(&items, false)
            .await
            .unwrap();
        assert_eq!(paths.len(), 1);

        let err = builder(dir.path(), FailurePolicy::FailFast)
            .fetch_all(&items, true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Download);
    }

    #[tokio::test]
    async fn test_nothing_downloaded() {
        let server = server_with(&[]).await;
        let dir = TempDir::new().unwrap();

        let err = builder(dir.path(), FailurePolicy::SkipFailed)
            .fetch_all(&descriptors(&server, &["x.zip", "y.zip"]), true)
            .await
            .unwrap_err();
        assert!(matches!(err, AnsError::NothingDownloaded));
    }

    #[test]
    fn test_descriptor_label() {
        let with_region = ArchiveDescriptor {
            region: Some(RegionCode::SP),
            period: "202401".to_string(),
            url: String::new(),
        };
        assert_eq!(with_region.label(), "SP 202401");

        let without = ArchiveDescriptor {
            region: None,
            period: "4T2021".to_string(),
            url: String::new(),
        };
        assert_eq!(without.label(), "4T2021");
    }
}
