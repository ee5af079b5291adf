use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

/// Connection settings for the Neo4j store.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    /// Import directory scanned by the bulk loader (`LOAD CSV`).
    pub import_dir: String,
}

/// Credentials and endpoint for the extraction-job API.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSettings {
    pub stations_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub graph: GraphSettings,
    pub remote: RemoteSettings,
    pub catalog: CatalogSettings,
    /// Seconds between polling passes while waiting on extraction jobs.
    pub poll_interval_secs: u64,
    /// Rows per file when staging observations for bulk load.
    pub chunk_size: usize,
}

impl Settings {
    /// Load settings from an optional TOML file, then the `SATELLITE_*`
    /// environment (nested keys separated by `__`, e.g.
    /// `SATELLITE_GRAPH__PASSWORD`). Environment wins over file values.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("graph.uri", "bolt://localhost:7687")?
            .set_default("graph.user", "neo4j")?
            .set_default("graph.password", "")?
            .set_default("graph.import_dir", "/var/lib/neo4j/import")?
            .set_default(
                "remote.base_url",
                "https://appeears.earthdatacloud.nasa.gov/api",
            )?
            .set_default("remote.username", "")?
            .set_default("remote.password", "")?
            .set_default(
                "catalog.stations_url",
                "https://mesonet.climate.umt.edu/api/v2/stations?type=csv",
            )?
            .set_default("poll_interval_secs", 3600i64)?
            .set_default("chunk_size", 5000i64)?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }

        let settings = builder
            .add_source(Environment::with_prefix("SATELLITE").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.poll_interval_secs, 3600);
        assert_eq!(settings.chunk_size, 5000);
        assert!(settings.remote.base_url.starts_with("https://"));
    }

    #[test]
    fn test_file_overrides_defaults() {
        use std::io::Write;
        let mut f = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(f, "poll_interval_secs = 60").unwrap();
        writeln!(f, "[graph]").unwrap();
        writeln!(f, "uri = \"bolt://db.example.org:7687\"").unwrap();
        let settings = Settings::load(Some(f.path())).unwrap();
        assert_eq!(settings.poll_interval_secs, 60);
        assert_eq!(settings.graph.uri, "bolt://db.example.org:7687");
    }
}
