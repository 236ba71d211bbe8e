//! Discovery of the monthly folders published on the server

use crate::errors::Result;
use crate::listing::RemoteListing;
use crate::models::{MonthPeriod, RemoteEntry};
use serde::Serialize;
use tracing::{debug, info, warn};

pub const NO_DATA: &str = "No data available";

/// Sorted, immutable set of periods discovered from a directory listing
#[derive(Debug, Clone)]
pub struct AvailabilityIndex {
    source_url: String,
    periods: Vec<MonthPeriod>,
}

/// Serializable snapshot of an index, used by `ansdata info --json`
#[derive(Debug, Serialize)]
pub struct AvailabilityReport {
    pub source: String,
    pub months_available: usize,
    pub first: Option<String>,
    pub last: Option<String>,
    pub periods: Vec<String>,
}

impl AvailabilityIndex {
    /// Fetch the listing at `source_url` and index its period folders
    pub async fn discover(listing: &RemoteListing, source_url: &str) -> Result<Self> {
        let entries = listing.fetch_entries(source_url).await?;
        let index = Self::from_entries(source_url, &entries);
        info!(
            "Discovered {} monthly folders at {}",
            index.periods.len(),
            source_url
        );
        Ok(index)
    }

    /// Keep directory entries whose first six characters are digits
    pub fn from_entries(source_url: &str, entries: &[RemoteEntry]) -> Self {
        let mut periods: Vec<MonthPeriod> = entries
            .iter()
            .filter(|entry| entry.is_dir && has_period_prefix(entry.stem()))
            .filter_map(|entry| match entry.stem()[..6].parse::<MonthPeriod>() {
                Ok(period) => Some(period),
                Err(_) => {
                    warn!("Ignoring folder with invalid month: {}", entry.name);
                    None
                }
            })
            .collect();

        periods.sort();
        periods.dedup();
        debug!("Indexed periods: {:?}", periods);

        Self {
            source_url: source_url.to_string(),
            periods,
        }
    }

    /// Periods in chronological order
    pub fn periods(&self) -> &[MonthPeriod] {
        &self.periods
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn contains(&self, period: &MonthPeriod) -> bool {
        self.periods.binary_search(period).is_ok()
    }

    pub fn first(&self) -> Option<MonthPeriod> {
        self.periods.first().copied()
    }

    pub fn last(&self) -> Option<MonthPeriod> {
        self.periods.last().copied()
    }

    pub fn date_range_summary(&self) -> String {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => format!(
                "data available from {} to {}",
                first.label(),
                last.label()
            ),
            _ => NO_DATA.to_string(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Beneficiary data available:\n  {}\n  {} months available\n  Source: {}",
            self.date_range_summary(),
            self.periods.len(),
            self.source_url
        )
    }

    pub fn report(&self) -> AvailabilityReport {
        AvailabilityReport {
            source: self.source_url.clone(),
            months_available: self.periods.len(),
            first: self.first().map(|p| p.to_string()),
            last: self.last().map(|p| p.to_string()),
            periods: self.periods.iter().map(|p| p.to_string()).collect(),
        }
    }
}

fn has_period_prefix(name: &str) -> bool {
    name.len() >= 6 && name.as_bytes()[..6].iter().all(|b| b.is_ascii_digit())
}
