//! Archive download, extraction and progress reporting

pub mod archive;
pub mod progress;

pub use archive::{extract_csv, ArchiveFetcher, LocalArtifact};
pub use progress::{BarProgress, LogProgress, ProgressReporter};
