use std::path::PathBuf;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::catalog::{CatalogClient, ProductCache};
use crate::cli::args::{Cli, Commands};
use crate::config::Settings;
use crate::error::Result;
use crate::normalize::{clean_dir, platforms_in_dir, to_store_format};
use crate::pipeline::{self, UpdateOptions};
use crate::remote::{stop_all_jobs, Session};
use crate::store::{write_chunks, ObservationStore};
use crate::utils::constants::BULK_LOAD_STEM;

pub async fn run(cli: Cli) -> Result<()> {
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Update {
            backfill,
            stations,
            workdir,
            poll_interval,
            max_attempts,
        } => {
            let opts = UpdateOptions {
                backfill,
                stations,
                workdir,
                poll_interval: Duration::from_secs(
                    poll_interval.unwrap_or(settings.poll_interval_secs),
                ),
                max_attempts,
                silent: cli.quiet,
            };

            // Store and session failures are fatal before any job is
            // submitted; a job nothing will collect is a quota leak.
            let store = ObservationStore::connect(&settings.graph).await?;
            let session = Session::login(&settings.remote).await?;

            let result = pipeline::run_update(&settings, &store, &session, &opts).await;
            session.logout().await;
            let report = result?;

            println!(
                "Ingested {} observations ({} duplicates skipped) from {} rows",
                report.written, report.duplicates, report.total
            );
        }

        Commands::Backfill {
            stations,
            check,
            record_dates,
            workdir,
            poll_interval,
            max_attempts,
        } => {
            let opts = UpdateOptions {
                backfill: true,
                stations: None,
                workdir,
                poll_interval: Duration::from_secs(
                    poll_interval.unwrap_or(settings.poll_interval_secs),
                ),
                max_attempts,
                silent: cli.quiet,
            };

            let store = ObservationStore::connect(&settings.graph).await?;
            let session = Session::login(&settings.remote).await?;

            let result = if check {
                match record_dates {
                    Some(path) => {
                        pipeline::check_and_backfill(&settings, &store, &session, &path, &opts)
                            .await
                    }
                    None => Err(crate::error::IngestError::MissingData(
                        "--check requires --record-dates".to_string(),
                    )),
                }
            } else {
                let candidates = stations.unwrap_or_default();
                pipeline::execute_backfill(&settings, &store, &session, &candidates, &opts).await
            };
            session.logout().await;
            result?;

            println!("Backfill complete");
        }

        Commands::Normalize {
            input_dir,
            output_dir,
            chunk_size,
        } => {
            let output_dir =
                output_dir.unwrap_or_else(|| PathBuf::from(&settings.graph.import_dir));
            let catalog = CatalogClient::new(&settings);
            let platforms = platforms_in_dir(&input_dir)?;
            info!(platforms = ?platforms, "fetching layer metadata");

            let mut cache = ProductCache::new(&catalog);
            let products = cache.fetch_all(&platforms).await?;

            let rows = clean_dir(&input_dir, products)?;
            let observations = to_store_format(&rows);
            let paths = write_chunks(
                &observations,
                &output_dir,
                BULK_LOAD_STEM,
                chunk_size.unwrap_or(settings.chunk_size),
            )?;

            println!(
                "Wrote {} observations to {} chunk files in {}",
                observations.len(),
                paths.len(),
                output_dir.display()
            );
        }

        Commands::InitDb { dir, use_path } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&settings.graph.import_dir));
            let store = ObservationStore::connect(&settings.graph).await?;
            store.init_indexes().await?;
            let loaded = store.bulk_load(&dir, use_path).await?;
            println!("Initialized store from {} chunk files", loaded);
        }

        Commands::StopJobs => {
            let session = Session::login(&settings.remote).await?;
            let result = stop_all_jobs(&session).await;
            session.logout().await;
            let deleted = result?;

            if deleted == 0 {
                println!("No jobs to stop");
            } else {
                println!("Deleted {} jobs", deleted);
            }
        }
    }

    Ok(())
}
