//! Quarterly financial statements (`demonstracoes_contabeis`)

use super::filter::{filter_by_registration, FilterReport};
use super::{ArchiveDescriptor, DatasetBuilder, MergedDataset};
use crate::config::Config;
use crate::downloader::{ArchiveFetcher, LogProgress};
use crate::errors::{AnsError, Result};
use crate::listing::RemoteListing;
use crate::merge::CsvMerger;
use crate::models::{PeriodSelection, QuarterPeriod, RegistrationCode};
use crate::paths::PathBuilder;
use reqwest::Client;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct FinancialRequest {
    pub target_quarter: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    /// Keep only these operators; empty keeps everything
    pub registration_codes: Vec<String>,
    pub output: Option<PathBuf>,
}

impl FinancialRequest {
    pub fn for_quarter(quarter: impl Into<String>) -> Self {
        Self {
            target_quarter: Some(quarter.into()),
            ..Self::default()
        }
    }

    pub fn for_range(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: Some(start.into()),
            end: Some(end.into()),
            ..Self::default()
        }
    }

    pub fn registration_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registration_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }
}

/// Client for the quarterly financial statement archives
#[derive(Debug)]
pub struct FinancialStatements {
    listing: RemoteListing,
    dataset_url: String,
    paths: PathBuilder,
    builder: DatasetBuilder,
    identifier_column: String,
    download_dir: PathBuf,
}

impl FinancialStatements {
    pub fn new(config: &Config) -> Result<Self> {
        let client = config.http_client().map_err(|source| AnsError::Request {
            url: config.base_url.clone(),
            source,
        })?;
        let fetcher = ArchiveFetcher::new(client.clone(), &config.download_dir)
            .with_progress(Arc::new(LogProgress::default()));
        Ok(Self::with_fetcher(config, client, fetcher))
    }

    pub fn with_fetcher(config: &Config, client: Client, fetcher: ArchiveFetcher) -> Self {
        Self {
            listing: RemoteListing::new(client),
            dataset_url: config.financial_url(),
            paths: PathBuilder::new(&config.base_url, &config.financial),
            builder: DatasetBuilder::new(
                fetcher,
                CsvMerger::new(config.chunk_rows),
                config.failure_policy,
            ),
            identifier_column: config.identifier_column.clone(),
            download_dir: config.download_dir.clone(),
        }
    }

    /// Years published on the server, ascending
    pub async fn available_years(&self) -> Result<Vec<i32>> {
        let entries = self.listing.fetch_entries(&self.dataset_url).await?;
        let mut years: Vec<i32> = entries
            .iter()
            .filter(|entry| entry.is_dir)
            .map(|entry| entry.stem())
            .filter(|stem| stem.len() == 4 && stem.bytes().all(|b| b.is_ascii_digit()))
            .filter_map(|stem| stem.parse().ok())
            .collect();
        years.sort_unstable();
        years.dedup();
        Ok(years)
    }

    /// Fetch, merge and optionally filter the requested quarters
    pub async fn build_dataset(&self, request: &FinancialRequest) -> Result<MergedDataset> {
        let selection = PeriodSelection::<QuarterPeriod>::from_args(
            request.target_quarter.as_deref(),
            request.start.as_deref(),
            request.end.as_deref(),
        )?;
        let codes = RegistrationCode::parse_set(&request.registration_codes)?;

        let descriptors: Vec<ArchiveDescriptor> = selection
            .periods()
            .into_iter()
            .map(|quarter| ArchiveDescriptor {
                region: None,
                period: quarter.to_string(),
                url: self.paths.url(&self.paths.financial_path(quarter)),
            })
            .collect();

        let output = request
            .output
            .clone()
            .unwrap_or_else(|| self.default_output(&selection));

        info!(
            "Building financial statement dataset: {} quarters -> {}",
            descriptors.len(),
            output.display()
        );

        let dataset = self
            .builder
            .build(&descriptors, selection.is_range(), &output)
            .await?;

        if !codes.is_empty() {
            self.filter(&dataset, codes).await?;
        }
        Ok(dataset)
    }

    /// Restrict a merged dataset to the given operators, rewriting it in place
    pub async fn filter(
        &self,
        dataset: &MergedDataset,
        codes: BTreeSet<RegistrationCode>,
    ) -> Result<FilterReport> {
        let path = dataset.path().to_path_buf();
        let column = self.identifier_column.clone();
        tokio::task::spawn_blocking(move || filter_by_registration(&path, &column, &codes)).await?
    }

    fn default_output(&self, selection: &PeriodSelection<QuarterPeriod>) -> PathBuf {
        let periods = match selection {
            PeriodSelection::Single(q) => q.to_string(),
            PeriodSelection::Range { start, end } => format!("{}_{}", start, end),
        };
        self.download_dir
            .join(format!("demonstracoes_contabeis_{}.csv", periods))
    }
}
