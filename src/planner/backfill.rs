//! Classification of newly-registered stations and servicing of collocated
//! ones by copying a partner's history.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use tracing::info;

use crate::error::{IngestError, Result};
use crate::models::{station::collocation_groups, Observation, Station};
use crate::utils::constants::DEFAULT_UNITS;

/// How a backfill candidate will be serviced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Exactly one other station shares the candidate's coordinates; its
    /// history is copied.
    Collocated { partner: String },
    /// No coincident partner; a fresh remote extraction is required.
    Isolated,
}

#[derive(Debug, Default)]
pub struct ClassifiedCandidates {
    pub collocated: Vec<(String, String)>,
    pub isolated: Vec<String>,
}

/// Classify one candidate against the full roster.
///
/// Groups of three or more stations at one point are ambiguous: there is no
/// rule for picking which partner to copy from, so classification fails
/// rather than guessing.
pub fn classify_candidate(station: &str, roster: &[Station]) -> Result<Classification> {
    let target = roster
        .iter()
        .find(|s| s.station == station)
        .ok_or_else(|| IngestError::StationNotFound {
            station: station.to_string(),
        })?;

    let groups = collocation_groups(roster);
    match groups.get(&target.coordinate_key()) {
        None => Ok(Classification::Isolated),
        Some(members) if members.len() == 2 => {
            let partner = members
                .iter()
                .find(|m| *m != station)
                .cloned()
                .ok_or_else(|| IngestError::StationNotFound {
                    station: station.to_string(),
                })?;
            Ok(Classification::Collocated { partner })
        }
        Some(members) => Err(IngestError::AmbiguousCollocation {
            station: station.to_string(),
            group: members.clone(),
        }),
    }
}

pub fn classify_candidates(
    candidates: &[String],
    roster: &[Station],
) -> Result<ClassifiedCandidates> {
    let mut out = ClassifiedCandidates::default();
    for candidate in candidates {
        match classify_candidate(candidate, roster)? {
            Classification::Collocated { partner } => {
                info!(station = %candidate, partner = %partner, "collocated");
                out.collocated.push((candidate.clone(), partner));
            }
            Classification::Isolated => {
                info!(station = %candidate, "isolated");
                out.isolated.push(candidate.clone());
            }
        }
    }
    Ok(out)
}

/// Re-emit a partner's observation history under a new station id. The
/// derived identity is recomputed for every row; values, timestamps,
/// platforms and indicators are untouched. Blank units are normalized to
/// `unitless` as they would be on the ingest path.
pub fn reissue(rows: &[Observation], station: &str) -> Vec<Observation> {
    rows.iter()
        .map(|row| {
            let units = if row.units.trim().is_empty() {
                DEFAULT_UNITS.to_string()
            } else {
                row.units.clone()
            };
            Observation::new(
                station.to_string(),
                row.timestamp,
                row.platform.clone(),
                row.element.clone(),
                row.value,
                units,
            )
        })
        .collect()
}

/// Load the `{station: "YYYY-MM-DD"}` first-record-date file used by the
/// check-backfill mode.
pub fn load_record_dates(path: &Path) -> Result<HashMap<String, String>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Stations that need backfilling: missing from the record-date file, or
/// with an unparsable date, or with a first record after the cutoff.
pub fn stations_needing_backfill(
    roster: &[Station],
    record_dates: &HashMap<String, String>,
    cutoff: NaiveDate,
) -> Vec<String> {
    roster
        .iter()
        .filter(|s| match record_dates.get(&s.station) {
            None => true,
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(d) => d > cutoff,
                Err(_) => true,
            },
        })
        .map(|s| s.station.clone())
        .collect()
}
