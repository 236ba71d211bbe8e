//! Remote archive path derivation

use crate::config::{join_url, DatasetSource};
use crate::errors::Result;
use crate::models::{MonthPeriod, QuarterPeriod, RegionCode};

/// Derives archive paths below one dataset endpoint. Pure, no I/O.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    dataset_url: String,
    archive_template: String,
}

impl PathBuilder {
    pub fn new(base_url: &str, source: &DatasetSource) -> Self {
        Self {
            dataset_url: source.url(base_url),
            archive_template: source.archive_template.clone(),
        }
    }

    /// `{period}/pda-024-icb-{region}-{year}_{month}.zip`
    pub fn beneficiary_path(&self, region: RegionCode, period: MonthPeriod) -> String {
        let archive = self
            .archive_template
            .replace("{region}", region.as_str())
            .replace("{year}", &format!("{:04}", period.year()))
            .replace("{month}", &period.month_str());
        format!("{}/{}", period, archive)
    }

    /// `{year}/{quarter}T{year}.zip`
    pub fn financial_path(&self, period: QuarterPeriod) -> String {
        let archive = self
            .archive_template
            .replace("{quarter}", &period.quarter().to_string())
            .replace("{year}", &format!("{:04}", period.year()));
        format!("{:04}/{}", period.year(), archive)
    }

    /// Same as [`beneficiary_path`](Self::beneficiary_path) from a raw `YYYYMM` token
    pub fn beneficiary_path_for(&self, region: RegionCode, token: &str) -> Result<String> {
        Ok(self.beneficiary_path(region, token.parse()?))
    }

    /// Same as [`financial_path`](Self::financial_path) from a raw `{q}T{yyyy}` token
    pub fn financial_path_for(&self, token: &str) -> Result<String> {
        Ok(self.financial_path(token.parse()?))
    }

    /// Absolute URL for a path produced by this builder
    pub fn url(&self, path: &str) -> String {
        join_url(&self.dataset_url, path)
    }
}
