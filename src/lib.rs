//! Client for the ANS (Agência Nacional de Saúde Suplementar) open-data server.
//!
//! Discovers the published periods, downloads and unpacks the ZIP archives
//! for beneficiary counts and quarterly financial statements, and merges the
//! extracted CSV files into a single `;`-delimited dataset.

pub mod availability;
pub mod config;
pub mod dataset;
pub mod downloader;
pub mod errors;
pub mod listing;
pub mod merge;
pub mod models;
pub mod paths;

#[cfg(test)]
mod test_support;

pub use availability::AvailabilityIndex;
pub use config::{Config, DatasetSource, FailurePolicy};
pub use dataset::{
    Beneficiaries, BeneficiaryRequest, FinancialRequest, FinancialStatements, MergedDataset, Table,
};
pub use errors::{AnsError, ErrorKind, Result};
pub use merge::{CsvMerger, MergeReport};
pub use models::{MonthPeriod, QuarterPeriod, RegionCode, RegistrationCode};
