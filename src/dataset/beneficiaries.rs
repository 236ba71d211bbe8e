//! Consolidated beneficiary counts, one archive per state and month

use super::{ArchiveDescriptor, DatasetBuilder, MergedDataset};
use crate::availability::AvailabilityIndex;
use crate::config::Config;
use crate::downloader::{ArchiveFetcher, LogProgress};
use crate::errors::{AnsError, Result};
use crate::listing::RemoteListing;
use crate::merge::CsvMerger;
use crate::models::{MonthPeriod, PeriodSelection, RegionCode};
use crate::paths::PathBuilder;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Parameters of a beneficiary dataset build, as given by the caller
#[derive(Debug, Clone, Default)]
pub struct BeneficiaryRequest {
    pub regions: Vec<String>,
    pub target_period: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub output: Option<PathBuf>,
}

impl BeneficiaryRequest {
    pub fn for_period<S: Into<String>>(regions: &[&str], period: S) -> Self {
        Self {
            regions: regions.iter().map(|r| r.to_string()).collect(),
            target_period: Some(period.into()),
            ..Self::default()
        }
    }

    pub fn for_range<S: Into<String>>(regions: &[&str], start: S, end: S) -> Self {
        Self {
            regions: regions.iter().map(|r| r.to_string()).collect(),
            start: Some(start.into()),
            end: Some(end.into()),
            ..Self::default()
        }
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }
}

/// Client for the beneficiary dataset.
///
/// The monthly folders on the server are indexed once, when the client is
/// connected; call [`Beneficiaries::connect`] again to refresh them.
#[derive(Debug)]
pub struct Beneficiaries {
    paths: PathBuilder,
    builder: DatasetBuilder,
    availability: AvailabilityIndex,
    download_dir: PathBuf,
}

impl Beneficiaries {
    pub async fn connect(config: &Config) -> Result<Self> {
        let client = config.http_client().map_err(|source| AnsError::Request {
            url: config.base_url.clone(),
            source,
        })?;
        let fetcher = ArchiveFetcher::new(client.clone(), &config.download_dir)
            .with_progress(Arc::new(LogProgress::default()));
        Self::connect_with(config, client, fetcher).await
    }

    /// Connect with a caller-supplied client and fetcher
    pub async fn connect_with(
        config: &Config,
        client: Client,
        fetcher: ArchiveFetcher,
    ) -> Result<Self> {
        let listing = RemoteListing::new(client);
        let availability =
            AvailabilityIndex::discover(&listing, &config.beneficiaries_url()).await?;

        Ok(Self {
            paths: PathBuilder::new(&config.base_url, &config.beneficiaries),
            builder: DatasetBuilder::new(
                fetcher,
                CsvMerger::new(config.chunk_rows),
                config.failure_policy,
            ),
            availability,
            download_dir: config.download_dir.clone(),
        })
    }

    pub fn availability(&self) -> &AvailabilityIndex {
        &self.availability
    }

    pub fn info(&self) -> String {
        self.availability.summary()
    }

    /// Validate `request`, fetch every (state, month) archive and merge them.
    ///
    /// All arguments are checked before the first archive request is made.
    pub async fn build_dataset(&self, request: &BeneficiaryRequest) -> Result<MergedDataset> {
        let selection = PeriodSelection::<MonthPeriod>::from_args(
            request.target_period.as_deref(),
            request.start.as_deref(),
            request.end.as_deref(),
        )?;
        let regions = RegionCode::parse_list(&request.regions)?;
        let periods = selection.periods();

        self.warn_unlisted(&periods);

        let descriptors = self.descriptors(&regions, &periods);
        let output = request
            .output
            .clone()
            .unwrap_or_else(|| self.default_output(&regions, &selection));

        info!(
            "Building beneficiary dataset: {} states x {} months -> {}",
            regions.len(),
            periods.len(),
            output.display()
        );

        self.builder
            .build(&descriptors, selection.is_range(), &output)
            .await
    }

    /// Fetch and extract archives without merging; returns the CSV paths.
    ///
    /// Failures are handled as in [`build_dataset`](Self::build_dataset)
    /// for the same selection.
    pub async fn download_raw_data(
        &self,
        regions: &[RegionCode],
        selection: &PeriodSelection<MonthPeriod>,
    ) -> Result<Vec<PathBuf>> {
        if regions.is_empty() {
            return Err(AnsError::EmptyRegionList);
        }
        let periods = selection.periods();
        self.warn_unlisted(&periods);
        let descriptors = self.descriptors(regions, &periods);
        self.builder
            .fetch_all(&descriptors, selection.is_range())
            .await
    }

    fn descriptors(
        &self,
        regions: &[RegionCode],
        periods: &[MonthPeriod],
    ) -> Vec<ArchiveDescriptor> {
        regions
            .iter()
            .flat_map(|&region| {
                periods.iter().map(move |&period| {
                    let path = self.paths.beneficiary_path(region, period);
                    ArchiveDescriptor {
                        region: Some(region),
                        period: period.to_string(),
                        url: self.paths.url(&path),
                    }
                })
            })
            .collect()
    }

    fn warn_unlisted(&self, periods: &[MonthPeriod]) {
        if self.availability.is_empty() {
            return;
        }
        for period in periods.iter().filter(|p| !self.availability.contains(p)) {
            warn!(
                "Period {} is not listed on the server ({})",
                period,
                self.availability.date_range_summary()
            );
        }
    }

    fn default_output(
        &self,
        regions: &[RegionCode],
        selection: &PeriodSelection<MonthPeriod>,
    ) -> PathBuf {
        let regions = regions
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join("-");
        let periods = match selection {
            PeriodSelection::Single(p) => p.to_string(),
            PeriodSelection::Range { start, end } => format!("{}_{}", start, end),
        };
        self.download_dir
            .join(format!("beneficiarios_{}_{}.csv", regions, periods))
    }
}
