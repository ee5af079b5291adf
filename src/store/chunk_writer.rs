//! Stages the observation table as fixed-size CSV chunks for the store's
//! bulk loader. Files above a few thousand rows make `LOAD CSV` unhappy, so
//! the table is broken up rather than written whole.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{IngestError, Result};
use crate::models::Observation;

/// Write `observations` as `{stem}_{n}.csv` files of at most `chunk_size`
/// rows each, returning the paths written.
pub fn write_chunks(
    observations: &[Observation],
    dir: &Path,
    stem: &str,
    chunk_size: usize,
) -> Result<Vec<PathBuf>> {
    if chunk_size == 0 {
        return Err(IngestError::InvalidFormat(
            "chunk size must be at least 1".to_string(),
        ));
    }
    std::fs::create_dir_all(dir)?;

    let mut paths = Vec::new();
    for (n, chunk) in observations.chunks(chunk_size).enumerate() {
        let path = dir.join(format!("{}_{}.csv", stem, n));
        let mut writer = csv::Writer::from_path(&path)?;
        for obs in chunk {
            writer.serialize(obs)?;
        }
        writer.flush()?;
        paths.push(path);
    }

    info!(
        files = paths.len(),
        rows = observations.len(),
        "staged observation chunks"
    );
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observations(n: usize) -> Vec<Observation> {
        (0..n)
            .map(|i| {
                Observation::new(
                    "aceabsar".to_string(),
                    1_686_355_200 + i as i64 * 86_400,
                    "MOD13A1.061".to_string(),
                    "NDVI".to_string(),
                    0.5,
                    "unitless".to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn test_chunking_row_counts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_chunks(&observations(5), dir.path(), "data_init", 2).unwrap();

        assert_eq!(paths.len(), 3);
        assert!(paths[0].ends_with("data_init_0.csv"));

        let mut rows = 0;
        for path in &paths {
            let mut reader = csv::Reader::from_path(path).unwrap();
            rows += reader.deserialize::<Observation>().count();
        }
        assert_eq!(rows, 5);
    }

    #[test]
    fn test_chunks_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let original = observations(3);
        let paths = write_chunks(&original, dir.path(), "data_init", 10).unwrap();
        assert_eq!(paths.len(), 1);

        let mut reader = csv::Reader::from_path(&paths[0]).unwrap();
        let restored: Vec<Observation> = reader
            .deserialize::<Observation>()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_chunks(&observations(1), dir.path(), "data_init", 0).is_err());
    }
}
