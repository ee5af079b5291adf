use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use satellite_ingest::models::{Layer, Observation, Product, Station};
use satellite_ingest::normalize::{clean_dir, to_store_format};
use satellite_ingest::planner::backfill::{classify_candidate, reissue, Classification};
use satellite_ingest::store::write_chunks;

fn layer(fill: f64, min: f64, max: f64, units: &str) -> Layer {
    Layer {
        add_offset: None,
        available: true,
        data_type: "float32".to_string(),
        description: String::new(),
        fill_value: fill,
        is_qa: false,
        layer: String::new(),
        scale_factor: None,
        units: units.to_string(),
        valid_max: max,
        valid_min: min,
    }
}

fn fixture_products() -> HashMap<String, Product> {
    let mut products = HashMap::new();

    let mut ndvi = BTreeMap::new();
    ndvi.insert(
        "_500m_16_days_NDVI".to_string(),
        layer(-3000.0, -0.2, 1.0, "NDVI"),
    );
    products.insert(
        "MOD13A1.061".to_string(),
        Product::new("MOD13A1.061".to_string(), ndvi),
    );

    let mut et = BTreeMap::new();
    et.insert("ET_500m".to_string(), layer(32767.0, 0.0, 32700.0, "kg/m^2"));
    products.insert(
        "MOD16A2.061".to_string(),
        Product::new("MOD16A2.061".to_string(), et),
    );

    let mut smap = BTreeMap::new();
    smap.insert(
        "Geophysical_Data_sm_surface".to_string(),
        layer(-9999.0, 0.0, 0.9, "m^3/m^3"),
    );
    products.insert(
        "SPL4SMGP.006".to_string(),
        Product::new("SPL4SMGP.006".to_string(), smap),
    );

    products
}

fn write_file(dir: &Path, name: &str, contents: &str) {
    let mut f = std::fs::File::create(dir.join(name)).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
}

/// A download directory the way a completed extraction job leaves it: one
/// CSV per product, wide format, with some invalid cells.
fn fixture_download_dir() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp directory");

    write_file(
        dir.path(),
        "mt-mesonet-MOD13A1-061-results.csv",
        "ID,Date,MOD13A1_061__500m_16_days_NDVI\n\
         aceabsar,2023-06-10,0.65\n\
         aceabsar,2023-06-26,-3000\n\
         acecrow,2023-06-10,0.40\n",
    );
    write_file(
        dir.path(),
        "mt-mesonet-MOD16A2-061-results.csv",
        "ID,Date,MOD16A2_061_ET_500m\n\
         aceabsar,2023-06-10,40\n\
         acecrow,2023-06-10,32767\n",
    );
    write_file(
        dir.path(),
        "mt-mesonet-SPL4SMGP-006-results.csv",
        "ID,Date,SPL4SMGP_006_Geophysical_Data_sm_surface_0,SPL4SMGP_006_Geophysical_Data_sm_surface_1\n\
         aceabsar,2023-06-10,0.2,0.4\n",
    );

    dir
}

#[test]
fn test_normalize_end_to_end() {
    let dir = fixture_download_dir();
    let products = fixture_products();

    let rows = clean_dir(dir.path(), &products).unwrap();
    let observations = to_store_format(&rows);

    // 3 NDVI rows (one masked to the sentinel) + 2 ET rows (one masked)
    // + 1 daily-mean soil moisture row.
    assert_eq!(observations.len(), 6);

    let by_id: HashMap<&str, &Observation> = observations
        .iter()
        .map(|o| (o.id.as_str(), o))
        .collect();

    let ndvi = by_id["aceabsar_1686355200_MOD13A1.061_NDVI"];
    assert_eq!(ndvi.value, 0.65);
    assert_eq!(ndvi.units, "unitless");

    // Fill value became the missing sentinel, unscaled.
    let masked = by_id["aceabsar_1687737600_MOD13A1.061_NDVI"];
    assert_eq!(masked.value, -9999.0);

    // 8-day composite ET is a daily rate now.
    let et = by_id["aceabsar_1686355200_MOD16A2.061_ET"];
    assert_eq!(et.value, 5.0);

    // Sub-daily soil moisture collapsed to the daily mean of valid hours.
    let sm = by_id["aceabsar_1686355200_SPL4SMGP.006_sm_surface"];
    assert!((sm.value - 0.3).abs() < 1e-12);
    assert_eq!(sm.element, "sm_surface");
}

#[test]
fn test_normalization_is_repeatable() {
    let dir = fixture_download_dir();
    let products = fixture_products();

    let first = to_store_format(&clean_dir(dir.path(), &products).unwrap());
    let second = to_store_format(&clean_dir(dir.path(), &products).unwrap());

    assert_eq!(first, second);
}

#[test]
fn test_overlapping_windows_deduplicate() {
    let dir = fixture_download_dir();
    // A second job whose window overlaps the first re-exports the same day.
    write_file(
        dir.path(),
        "mt-mesonet2-MOD13A1-061-results.csv",
        "ID,Date,MOD13A1_061__500m_16_days_NDVI\n\
         aceabsar,2023-06-10,0.65\n",
    );

    let products = fixture_products();
    let observations = to_store_format(&clean_dir(dir.path(), &products).unwrap());

    let ndvi_count = observations
        .iter()
        .filter(|o| o.id == "aceabsar_1686355200_MOD13A1.061_NDVI")
        .count();
    assert_eq!(ndvi_count, 1);
}

#[test]
fn test_chunked_staging() {
    let dir = fixture_download_dir();
    let products = fixture_products();
    let observations = to_store_format(&clean_dir(dir.path(), &products).unwrap());

    let out = TempDir::new().unwrap();
    let paths = write_chunks(&observations, out.path(), "data_init", 4).unwrap();
    assert_eq!(paths.len(), 2);

    let mut restored = Vec::new();
    for path in &paths {
        let mut reader = csv::Reader::from_path(path).unwrap();
        for row in reader.deserialize::<Observation>() {
            restored.push(row.unwrap());
        }
    }
    assert_eq!(restored, observations);
}

#[test]
fn test_collocated_station_backfill_copy() {
    // S1 and S2 share a point; the store has history only for S1.
    let roster = vec![
        Station::new("S1".to_string(), 45.0, -110.0),
        Station::new("S2".to_string(), 45.0, -110.0),
        Station::new("elsewhere".to_string(), 47.0, -112.0),
    ];

    assert_eq!(
        classify_candidate("S2", &roster).unwrap(),
        Classification::Collocated {
            partner: "S1".to_string()
        }
    );

    let day = |d: u32| {
        NaiveDate::from_ymd_opt(2023, 6, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp()
    };
    let s1_history = vec![
        Observation::new(
            "S1".to_string(),
            day(10),
            "MOD13A1.061".to_string(),
            "NDVI".to_string(),
            0.65,
            "unitless".to_string(),
        ),
        Observation::new(
            "S1".to_string(),
            day(10),
            "MOD16A2.061".to_string(),
            "ET".to_string(),
            5.0,
            "kg/m^2".to_string(),
        ),
    ];

    let copied = reissue(&s1_history, "S2");

    assert_eq!(copied.len(), s1_history.len());
    for (original, copy) in s1_history.iter().zip(&copied) {
        assert_eq!(copy.station, "S2");
        assert_eq!(copy.timestamp, original.timestamp);
        assert_eq!(copy.platform, original.platform);
        assert_eq!(copy.element, original.element);
        assert_eq!(copy.value, original.value);
        assert_eq!(copy.units, original.units);
        assert_eq!(
            copy.id,
            original.id.replacen("S1", "S2", 1),
            "identity re-derived under the new station"
        );
    }
    // The partner's rows are untouched.
    assert!(s1_history.iter().all(|o| o.station == "S1"));
}

#[test]
fn test_three_stations_at_one_point_is_an_error() {
    let roster = vec![
        Station::new("S1".to_string(), 45.0, -110.0),
        Station::new("S2".to_string(), 45.0, -110.0),
        Station::new("S3".to_string(), 45.0, -110.0),
    ];

    assert!(classify_candidate("S2", &roster).is_err());
}
