//! Decides, per platform and indicator, what date range is still missing and
//! turns that into the minimal set of extraction jobs.

pub mod backfill;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Days, NaiveDate};
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::models::{Geometry, Product};
use crate::remote::ExtractionJob;
use crate::utils::constants::{backfill_epoch, NOISE_LAYER_PATTERNS};

/// The missing window for one (platform, element) pair. Windows always end
/// "today", so only the start date is carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapWindow {
    pub platform: String,
    pub element: String,
    pub start: NaiveDate,
}

/// Compute the next fetch window per (platform, element) from the store's
/// latest timestamps: one day after the maximum, or the historical epoch in
/// backfill mode.
pub fn gap_windows(
    latest: &HashMap<(String, String), i64>,
    backfill: bool,
) -> Vec<GapWindow> {
    let mut windows: Vec<GapWindow> = latest
        .iter()
        .map(|((platform, element), timestamp)| {
            let start = if backfill {
                backfill_epoch()
            } else {
                DateTime::from_timestamp(*timestamp, 0)
                    .map(|dt| dt.date_naive() + Days::new(1))
                    .unwrap_or_else(backfill_epoch)
            };
            GapWindow {
                platform: platform.clone(),
                element: element.clone(),
                start,
            }
        })
        .collect();

    windows.sort_by(|a, b| (&a.platform, &a.element).cmp(&(&b.platform, &b.element)));
    info!(pairs = windows.len(), "found missing data");
    windows
}

/// Whether a layer key matches an indicator and is worth requesting.
fn layer_matches(key: &str, element: &str) -> bool {
    key.to_lowercase().contains(&element.to_lowercase())
        && !NOISE_LAYER_PATTERNS.iter().any(|p| key.contains(p))
}

/// Merge all windows that share a platform into a single extraction job
/// naming only the layers implied by the missing indicators.
///
/// Invariant: the indicators of one platform must agree on a single start
/// date. Divergence means the store is in a state the planner cannot merge
/// into one request, and it fails loudly instead of picking a date.
pub fn plan_jobs(
    windows: &[GapWindow],
    products: &HashMap<String, Product>,
    geometry: &Geometry,
    today: NaiveDate,
) -> Result<Vec<ExtractionJob>> {
    let mut by_platform: BTreeMap<&str, Vec<&GapWindow>> = BTreeMap::new();
    for w in windows {
        by_platform.entry(w.platform.as_str()).or_default().push(w);
    }

    let mut jobs = Vec::new();
    for (platform, group) in by_platform {
        let product = products.get(platform).ok_or_else(|| {
            IngestError::MissingData(format!("no layer metadata for {}", platform))
        })?;

        let starts: BTreeSet<NaiveDate> = group.iter().map(|w| w.start).collect();
        if starts.len() != 1 {
            return Err(IngestError::InconsistentGap {
                platform: platform.to_string(),
                dates: starts.into_iter().collect(),
            });
        }
        let start = *starts.iter().next().unwrap();
        if start > today {
            debug!(platform, "already current, nothing to request");
            continue;
        }

        let mut layers: BTreeSet<String> = BTreeSet::new();
        for w in &group {
            for (key, _) in product.data_layers() {
                if layer_matches(key, &w.element) {
                    layers.insert(key.clone());
                }
            }
        }
        if layers.is_empty() {
            debug!(platform, "no requestable layers for the missing indicators");
            continue;
        }

        let name = format!(
            "{}_{}_{}",
            platform,
            start.format("%Y%m%d"),
            today.format("%Y%m%d")
        );
        let layers: Vec<String> = layers.into_iter().collect();
        let job = ExtractionJob::new(
            name,
            vec![platform.to_string(); layers.len()],
            layers,
            start,
            today,
            geometry.clone(),
        )?;
        jobs.push(job);
    }

    Ok(jobs)
}
