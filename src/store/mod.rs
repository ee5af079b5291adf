//! The graph store: one `Station` node per station, one `Observation` node
//! per derived identity, linked by a timestamped `OBSERVES` relationship.

pub mod chunk_writer;

pub use chunk_writer::write_chunks;

use std::collections::HashMap;
use std::path::Path;

use neo4rs::{query, Graph};
use tracing::{debug, info};

use crate::config::GraphSettings;
use crate::error::{IngestError, Result};
use crate::models::Observation;
use crate::utils::constants::{BULK_LOAD_STEM, PROGRESS_REPORT_EVERY};
use crate::utils::progress::ProgressReporter;

/// Outcome of one ingest batch. Duplicates are expected on window replays
/// and are never batch-level failures.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub total: usize,
    pub written: usize,
    pub duplicates: usize,
}

pub struct ObservationStore {
    graph: Graph,
}

/// The driver surfaces a uniqueness-constraint rejection as a server error;
/// there is no dedicated variant to match on, so the Neo4j status text is
/// inspected instead.
fn is_constraint_violation(e: &neo4rs::Error) -> bool {
    let msg = e.to_string();
    msg.contains("ConstraintValidation") || msg.contains("already exists")
}

impl ObservationStore {
    /// Connect to the store. An unreachable store or bad credentials fail
    /// here, before any remote job is submitted.
    pub async fn connect(settings: &GraphSettings) -> Result<Self> {
        let graph = Graph::new(&settings.uri, &settings.user, &settings.password).await?;
        Ok(Self { graph })
    }

    /// Create the uniqueness constraints and the relationship timestamp
    /// index. Idempotent.
    pub async fn init_indexes(&self) -> Result<()> {
        self.graph
            .run(query(
                "CREATE CONSTRAINT obsIdConstraint IF NOT EXISTS \
                 FOR (obs:Observation) REQUIRE obs.id IS UNIQUE",
            ))
            .await?;
        self.graph
            .run(query(
                "CREATE CONSTRAINT stationConstraint IF NOT EXISTS \
                 FOR (s:Station) REQUIRE s.name IS UNIQUE",
            ))
            .await?;
        self.graph
            .run(query(
                "CREATE INDEX timestampIndex IF NOT EXISTS \
                 FOR ()-[o:OBSERVES]-() ON (o.timestamp)",
            ))
            .await?;
        Ok(())
    }

    /// First-time population from chunk files pre-staged in the store's
    /// import directory by `write_chunks`. Returns how many files were
    /// loaded.
    pub async fn bulk_load(&self, dir: &Path, use_path: bool) -> Result<usize> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(BULK_LOAD_STEM))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        for path in &paths {
            let f_path = if use_path {
                path.to_string_lossy().to_string()
            } else {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| {
                        IngestError::InvalidFormat(format!("bad chunk file name: {:?}", path))
                    })?;
                format!("file:///{}", name)
            };
            info!(file = %f_path, "bulk loading");
            self.graph
                .run(
                    query(
                        "LOAD CSV WITH HEADERS FROM $f_path AS line \
                         MERGE (station:Station {name: line.station}) \
                         CREATE (obs:Observation {id: line.id, platform: line.platform, \
                                 element: line.element, value: toFloat(line.value), \
                                 units: toString(line.units)}) \
                         CREATE (station)-[:OBSERVES {timestamp: toInteger(line.timestamp)}]->(obs)",
                    )
                    .param("f_path", f_path),
                )
                .await?;
        }
        Ok(paths.len())
    }

    /// Write a batch of observations, one transaction per row. A uniqueness
    /// rejection on a row is recovered locally: logged, counted, skipped.
    pub async fn ingest(&self, observations: &[Observation], silent: bool) -> Result<IngestReport> {
        let mut report = IngestReport {
            total: observations.len(),
            ..Default::default()
        };
        let progress =
            ProgressReporter::new(observations.len() as u64, "Uploading observations", silent);

        for (idx, obs) in observations.iter().enumerate() {
            if idx % PROGRESS_REPORT_EVERY == 0 {
                progress.update(idx as u64);
                debug!(
                    "{:2.3}% of new observations uploaded",
                    (idx as f64 / observations.len() as f64) * 100.0
                );
            }

            let q = query(
                "MERGE (s:Station {name: $station}) \
                 CREATE (o:Observation {id: $id, platform: $platform, element: $element, \
                         value: $value, units: $units}) \
                 MERGE (s)-[:OBSERVES {timestamp: $timestamp}]->(o)",
            )
            .param("station", obs.station.as_str())
            .param("id", obs.id.as_str())
            .param("platform", obs.platform.as_str())
            .param("element", obs.element.as_str())
            .param("value", obs.value)
            .param("units", obs.units.as_str())
            .param("timestamp", obs.timestamp);

            match self.graph.run(q).await {
                Ok(()) => report.written += 1,
                Err(e) if is_constraint_violation(&e) => {
                    debug!(id = %obs.id, "duplicate observation skipped");
                    report.duplicates += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        progress.finish_with_message(&format!(
            "Uploaded {} observations ({} duplicates skipped)",
            report.written, report.duplicates
        ));
        Ok(report)
    }

    /// Maximum observed timestamp per (platform, element). The gap
    /// detector's only feedback signal.
    pub async fn latest_per_indicator(&self) -> Result<HashMap<(String, String), i64>> {
        let q = query(
            "MATCH (s:Station)-[o:OBSERVES]->(obs:Observation) \
             RETURN obs.platform AS platform, obs.element AS element, \
                    max(o.timestamp) AS time",
        );
        let mut latest = HashMap::new();
        let mut stream = self.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            let platform: String = get_column(&row, "platform")?;
            let element: String = get_column(&row, "element")?;
            let time: i64 = get_column(&row, "time")?;
            latest.insert((platform, element), time);
        }
        Ok(latest)
    }

    /// Full history read for one station and indicator over a time range.
    /// Used by the collocated backfill path.
    pub async fn query_station(
        &self,
        station: &str,
        start_time: i64,
        end_time: i64,
        element: &str,
    ) -> Result<Vec<Observation>> {
        let q = query(
            "MATCH (obs:Observation)<-[o:OBSERVES]-(s:Station) \
             WHERE o.timestamp >= $start_time AND o.timestamp <= $end_time \
               AND s.name = $station AND obs.element = $element \
             RETURN s.name AS station, o.timestamp AS timestamp, \
                    obs.platform AS platform, obs.element AS element, \
                    obs.value AS value, obs.units AS units",
        )
        .param("station", station)
        .param("start_time", start_time)
        .param("end_time", end_time)
        .param("element", element);

        let mut rows = Vec::new();
        let mut stream = self.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            rows.push(Observation::new(
                get_column(&row, "station")?,
                get_column(&row, "timestamp")?,
                get_column(&row, "platform")?,
                get_column(&row, "element")?,
                get_column(&row, "value")?,
                get_column(&row, "units")?,
            ));
        }
        Ok(rows)
    }
}

fn get_column<T: serde::de::DeserializeOwned>(row: &neo4rs::Row, name: &str) -> Result<T> {
    row.get::<T>(name)
        .map_err(|e| IngestError::InvalidFormat(format!("store row column {}: {}", name, e)))
}
