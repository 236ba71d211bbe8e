use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ansdata")]
#[command(about = "Download and merge ANS open data (beneficiaries and financial statements)")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show which monthly beneficiary folders are published
    Info {
        /// Print the availability report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build a merged beneficiary dataset for states and months
    Beneficiaries {
        /// State codes, e.g. SP or AC,RR (repeatable)
        #[arg(short, long = "region", required = true, value_delimiter = ',')]
        regions: Vec<String>,

        /// Single month (YYYYMM)
        #[arg(short, long)]
        period: Option<String>,

        /// First month of a range (YYYYMM)
        #[arg(long)]
        start: Option<String>,

        /// Last month of a range (YYYYMM)
        #[arg(long)]
        end: Option<String>,

        /// Merged CSV path (defaults to a name in the download directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the first N rows of the merged dataset in batches of this size
        #[arg(long)]
        chunks: Option<usize>,

        /// Only download and extract, skip the merge
        #[arg(long)]
        raw: bool,
    },

    /// Build a merged financial statement dataset for quarters
    Financial {
        /// Single quarter, e.g. 4T2021
        #[arg(short, long)]
        quarter: Option<String>,

        /// First quarter of a range
        #[arg(long)]
        start: Option<String>,

        /// Last quarter of a range
        #[arg(long)]
        end: Option<String>,

        /// Keep only these operator registration codes (REG_ANS)
        #[arg(long = "registration", value_delimiter = ',')]
        registration: Vec<String>,

        /// Merged CSV path (defaults to a name in the download directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List years with published financial statements
    Years,
}
