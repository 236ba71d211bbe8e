use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use ansdata::config::Config;
use ansdata::dataset::{Beneficiaries, BeneficiaryRequest, FinancialRequest, FinancialStatements};
use ansdata::downloader::{ArchiveFetcher, BarProgress};
use ansdata::models::{MonthPeriod, PeriodSelection, RegionCode};

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Set default log level to INFO if not specified
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "ansdata=info");
    }

    // Initialize logging to both console and file
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let file_appender = tracing_appender::rolling::never(".", "ansdata.log");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(EnvFilter::from_default_env()),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;

    let client = config
        .http_client()
        .context("Failed to build HTTP client")?;
    let fetcher = ArchiveFetcher::new(client.clone(), &config.download_dir)
        .with_progress(Arc::new(BarProgress::new()));

    match &cli.command {
        Commands::Info { json } => {
            let beneficiaries = Beneficiaries::connect_with(&config, client, fetcher).await?;
            if *json {
                let report = beneficiaries.availability().report();
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", beneficiaries.info());
            }
        }

        Commands::Beneficiaries {
            regions,
            period,
            start,
            end,
            output,
            chunks,
            raw,
        } => {
            let beneficiaries = Beneficiaries::connect_with(&config, client, fetcher).await?;

            if *raw {
                let selection = PeriodSelection::<MonthPeriod>::from_args(
                    period.as_deref(),
                    start.as_deref(),
                    end.as_deref(),
                )?;
                let regions = RegionCode::parse_list(regions)?;
                let paths = beneficiaries.download_raw_data(&regions, &selection).await?;
                for path in paths {
                    println!("{}", path.display());
                }
                return Ok(());
            }

            let request = BeneficiaryRequest {
                regions: regions.clone(),
                target_period: period.clone(),
                start: start.clone(),
                end: end.clone(),
                output: output.clone(),
            };

            match beneficiaries.build_dataset(&request).await {
                Ok(dataset) => {
                    let report = dataset.report();
                    info!(
                        "Merged {} files ({} skipped), {} rows into {}",
                        report.files_merged,
                        report.files_skipped.len(),
                        report.rows_written,
                        dataset.path().display()
                    );

                    if let Some(size) = chunks {
                        let batches = dataset.batches(*size)?;
                        println!("{}", batches.headers().iter().collect::<Vec<_>>().join(";"));
                        for (index, batch) in batches.enumerate() {
                            println!("batch {}: {} rows", index + 1, batch?.len());
                        }
                    }
                    println!("{}", dataset.path().display());
                }
                Err(e) => {
                    error!("Beneficiary dataset build failed: {}", e);
                    return Err(e.into());
                }
            }
        }

        Commands::Financial {
            quarter,
            start,
            end,
            registration,
            output,
        } => {
            let statements = FinancialStatements::with_fetcher(&config, client, fetcher);
            let request = FinancialRequest {
                target_quarter: quarter.clone(),
                start: start.clone(),
                end: end.clone(),
                registration_codes: registration.clone(),
                output: output.clone(),
            };

            match statements.build_dataset(&request).await {
                Ok(dataset) => {
                    info!(
                        "Financial statements merged into {}",
                        dataset.path().display()
                    );
                    println!("{}", dataset.path().display());
                }
                Err(e) => {
                    error!("Financial statement build failed: {}", e);
                    return Err(e.into());
                }
            }
        }

        Commands::Years => {
            let statements = FinancialStatements::with_fetcher(&config, client, fetcher);
            let years = statements.available_years().await?;
            println!(
                "{}",
                years
                    .iter()
                    .map(|y| y.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            );
        }
    }

    Ok(())
}
