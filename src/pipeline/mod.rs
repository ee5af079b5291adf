//! The workflow per invocation: plan missing windows, submit extraction
//! jobs, wait for and download the results, normalize them, and ingest.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogClient, ProductCache};
use crate::config::Settings;
use crate::error::{IngestError, Result};
use crate::models::{Geometry, PointSet};
use crate::normalize::{clean_dir, to_store_format};
use crate::planner::backfill::{classify_candidates, load_record_dates, reissue, stations_needing_backfill};
use crate::planner::{gap_windows, plan_jobs};
use crate::remote::{wait_all, Session};
use crate::store::{IngestReport, ObservationStore};
use crate::utils::constants::{record_date_cutoff, CANONICAL_ELEMENTS};

pub struct UpdateOptions {
    /// Re-extract from the historical epoch instead of advancing from the
    /// store's latest timestamps.
    pub backfill: bool,
    /// Restrict the extraction geometry to these stations.
    pub stations: Option<Vec<String>>,
    /// Download directory. A temporary directory is used when unset.
    pub workdir: Option<PathBuf>,
    pub poll_interval: Duration,
    pub max_attempts: Option<u32>,
    pub silent: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            backfill: false,
            stations: None,
            workdir: None,
            poll_interval: Duration::from_secs(3600),
            max_attempts: None,
            silent: false,
        }
    }
}

/// Incremental update: close the gap between the store's latest observation
/// per (platform, indicator) and today.
pub async fn run_update(
    settings: &Settings,
    store: &ObservationStore,
    session: &Session,
    opts: &UpdateOptions,
) -> Result<IngestReport> {
    let catalog = CatalogClient::new(settings);

    let latest = store.latest_per_indicator().await?;
    if latest.is_empty() {
        warn!("store reports no observations; nothing to advance from (bootstrap with init-db)");
        return Ok(IngestReport::default());
    }
    let windows = gap_windows(&latest, opts.backfill);

    let roster = catalog.fetch_stations().await?;
    let mut points = PointSet::from_stations(&roster);
    if let Some(stations) = &opts.stations {
        points = points.filter(stations);
        if points.is_empty() {
            return Err(IngestError::StationNotFound {
                station: stations.join(", "),
            });
        }
    }
    let geometry = Geometry::Point(points);

    let platforms: Vec<String> = {
        let mut p: Vec<String> = windows.iter().map(|w| w.platform.clone()).collect();
        p.sort();
        p.dedup();
        p
    };
    let mut cache = ProductCache::new(&catalog);
    let products = cache.fetch_all(&platforms).await?;

    let today = Utc::now().date_naive();
    let mut jobs = plan_jobs(&windows, products, &geometry, today)?;
    if jobs.is_empty() {
        info!("all platforms are current; nothing to request");
        return Ok(IngestReport::default());
    }

    for job in &mut jobs {
        job.submit(session).await?;
    }
    info!("New jobs have been launched. Waiting for them to complete...");

    // Keep the TempDir guard alive until ingestion is done.
    let tmp;
    let dir: &Path = match &opts.workdir {
        Some(d) => d,
        None => {
            tmp = tempfile::tempdir()?;
            tmp.path()
        }
    };

    wait_all(jobs, session, dir, opts.poll_interval, opts.max_attempts).await?;

    let rows = clean_dir(dir, products)?;
    let observations = to_store_format(&rows);
    info!(
        observations = observations.len(),
        "starting upload to the store"
    );
    let report = store.ingest(&observations, opts.silent).await?;
    info!(
        written = report.written,
        duplicates = report.duplicates,
        "upload complete"
    );
    Ok(report)
}

/// Copy a partner's full observation history to a collocated station,
/// re-identified under the new station id.
pub async fn backfill_collocated(
    store: &ObservationStore,
    station: &str,
    partner: &str,
    silent: bool,
) -> Result<IngestReport> {
    let now = Utc::now().timestamp();

    let mut history = Vec::new();
    for element in CANONICAL_ELEMENTS {
        debug!(element = %element, partner = %partner, "querying partner history");
        history.extend(store.query_station(partner, 0, now, element).await?);
    }
    if history.is_empty() {
        warn!(partner, "partner has no history to copy");
    }

    let reissued = reissue(&history, station);
    store.ingest(&reissued, silent).await
}

/// Backfill a set of candidate stations: collocated candidates are serviced
/// by copying, isolated ones by a fresh remote extraction from the epoch.
pub async fn execute_backfill(
    settings: &Settings,
    store: &ObservationStore,
    session: &Session,
    candidates: &[String],
    opts: &UpdateOptions,
) -> Result<()> {
    let catalog = CatalogClient::new(settings);
    let roster = catalog.fetch_stations().await?;
    let classified = classify_candidates(candidates, &roster)?;

    for (station, partner) in &classified.collocated {
        info!(station = %station, partner = %partner, "backfilling from collocated partner");
        backfill_collocated(store, station, partner, opts.silent).await?;
    }

    if !classified.isolated.is_empty() {
        info!(stations = ?classified.isolated, "backfilling isolated stations remotely");
        let isolated_opts = UpdateOptions {
            backfill: true,
            stations: Some(classified.isolated.clone()),
            workdir: opts.workdir.clone(),
            poll_interval: opts.poll_interval,
            max_attempts: opts.max_attempts,
            silent: opts.silent,
        };
        run_update(settings, store, session, &isolated_opts).await?;
    }

    Ok(())
}

/// Scan the first-record-date file against the roster and backfill whichever
/// stations need it.
pub async fn check_and_backfill(
    settings: &Settings,
    store: &ObservationStore,
    session: &Session,
    record_dates: &Path,
    opts: &UpdateOptions,
) -> Result<()> {
    let record_dates = load_record_dates(record_dates)?;
    let catalog = CatalogClient::new(settings);
    let roster = catalog.fetch_stations().await?;

    let candidates = stations_needing_backfill(&roster, &record_dates, record_date_cutoff());
    if candidates.is_empty() {
        info!("no stations need backfilling");
        return Ok(());
    }

    info!(count = candidates.len(), stations = ?candidates, "stations needing backfill");
    execute_backfill(settings, store, session, &candidates, opts).await
}
