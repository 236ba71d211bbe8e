//! Error types for ANS dataset acquisition

use crate::models::{RegionCode, RegistrationCode};
use thiserror::Error;

/// Coarse classification of [`AnsError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad caller input, raised before any network access
    Validation,
    /// Transport or HTTP status failure
    Network,
    /// Archive could not be read or holds no CSV payload
    Format,
    /// A single fetch failed during a dataset build
    Download,
    /// Local filesystem or CSV failure
    Io,
}

#[derive(Error, Debug)]
pub enum AnsError {
    #[error("provide either a target period or both start and end, not both")]
    ConflictingPeriodArgs,

    #[error("invalid state: {code}, allowed states are: {}", format_regions(.valid))]
    InvalidRegion {
        code: String,
        valid: Vec<RegionCode>,
    },

    #[error("at least one state code is required")]
    EmptyRegionList,

    #[error("invalid period '{0}'")]
    InvalidPeriod(String),

    #[error("invalid period range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },

    #[error("invalid registration code '{0}'")]
    InvalidRegistrationCode(String),

    #[error("column '{0}' not found in merged dataset")]
    MissingIdentifierColumn(String),

    #[error("registration codes not found in merged dataset: [{}]", format_codes(.0))]
    UnknownRegistrationCodes(Vec<RegistrationCode>),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("no CSV file found in ZIP archive {archive}")]
    NoCsvEntry { archive: String },

    #[error("failed to read ZIP archive {archive}: {source}")]
    Archive {
        archive: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("ZIP archive {archive} has unsafe entry path '{entry}'")]
    UnsafeEntryPath { archive: String, entry: String },

    #[error("failed to download {target}: {source}")]
    Download {
        target: String,
        #[source]
        source: Box<AnsError>,
    },

    #[error("no CSV files were downloaded")]
    NothingDownloaded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AnsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnsError::ConflictingPeriodArgs
            | AnsError::InvalidRegion { .. }
            | AnsError::EmptyRegionList
            | AnsError::InvalidPeriod(_)
            | AnsError::InvalidRange { .. }
            | AnsError::InvalidRegistrationCode(_)
            | AnsError::MissingIdentifierColumn(_)
            | AnsError::UnknownRegistrationCodes(_) => ErrorKind::Validation,
            AnsError::Request { .. } | AnsError::HttpStatus { .. } => ErrorKind::Network,
            AnsError::NoCsvEntry { .. }
            | AnsError::Archive { .. }
            | AnsError::UnsafeEntryPath { .. } => ErrorKind::Format,
            AnsError::Download { .. } | AnsError::NothingDownloaded => ErrorKind::Download,
            AnsError::Io(_) | AnsError::Csv(_) | AnsError::Task(_) => ErrorKind::Io,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

fn format_regions(regions: &[RegionCode]) -> String {
    regions
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_codes(codes: &[RegistrationCode]) -> String {
    codes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, AnsError>;
