//! Turns raw wide-format export files into a long-format stream of rows:
//! one per (station, date, layer), with invalid cells nulled and sub-daily
//! products collapsed to daily means.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::models::{Layer, Product};
use crate::utils::constants::SUBDAILY_PRODUCT_MARKER;

/// One cleaned long-format row. `value: None` means the cell was missing or
/// invalid; the sentinel substitution happens later, at the store boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRow {
    pub station: String,
    pub date: NaiveDate,
    pub element: String,
    pub value: Option<f64>,
    pub platform: String,
    pub units: Option<String>,
}

/// Infer the product identifier from an export filename. Stems look like
/// `mt-mesonet-MOD13A1-061-results`, giving `MOD13A1.061`.
pub fn product_from_filename(path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| IngestError::InvalidFormat(format!("bad export path: {:?}", path)))?;
    let parts: Vec<&str> = stem.split('-').collect();
    if parts.len() < 3 {
        return Err(IngestError::InvalidFormat(format!(
            "cannot infer product from filename: {}",
            stem
        )));
    }
    Ok(format!(
        "{}.{}",
        parts[parts.len() - 3],
        parts[parts.len() - 2]
    ))
}

/// A selected data column in a raw export: where it is, which layer's
/// metadata governs it, and (for sub-daily products) which hour it carries.
struct ColumnBinding<'a> {
    index: usize,
    element: String,
    layer: &'a Layer,
    hour: Option<u32>,
}

/// Cleans one raw export file against its product's layer metadata.
pub struct Cleaner<'a> {
    path: &'a Path,
    platform: String,
    product: &'a Product,
    is_subdaily: bool,
}

impl<'a> Cleaner<'a> {
    pub fn new(path: &'a Path, product: &'a Product, is_subdaily: bool) -> Result<Self> {
        let platform = product_from_filename(path)?;
        Ok(Self {
            path,
            platform,
            product,
            is_subdaily,
        })
    }

    /// Column-name prefix the export adds to every layer column.
    fn prefix(&self) -> String {
        format!("{}_", self.platform.replace('.', "_"))
    }

    /// Bind the file's columns to layer metadata: the intersection of present
    /// columns and non-QA layers, plus hour-suffixed variants for sub-daily
    /// products.
    fn bind_columns(&self, headers: &csv::StringRecord) -> Vec<ColumnBinding<'_>> {
        let prefix = self.prefix();
        let mut bindings = Vec::new();

        for (index, raw_header) in headers.iter().enumerate() {
            let name = raw_header.strip_prefix(&prefix).unwrap_or(raw_header);

            if let Some(layer) = self.product.layers.get(name) {
                if !layer.is_qa {
                    bindings.push(ColumnBinding {
                        index,
                        element: name.to_string(),
                        layer,
                        hour: None,
                    });
                }
                continue;
            }

            if self.is_subdaily {
                if let Some((base, hour)) = split_hour_suffix(name) {
                    if let Some(layer) = self.product.layers.get(base) {
                        if !layer.is_qa {
                            bindings.push(ColumnBinding {
                                index,
                                element: base.to_string(),
                                layer,
                                hour: Some(hour),
                            });
                        }
                    }
                }
            }
        }

        bindings
    }

    /// Null invalid cells and pivot wide to long. Sub-daily values are
    /// additionally collapsed to a daily mean per (station, date, element);
    /// a day with no valid hourly values is dropped, not recorded as null.
    pub fn clean(&self) -> Result<Vec<LongRow>> {
        let mut reader = csv::Reader::from_path(self.path)?;
        let headers = reader.headers()?.clone();
        let bindings = self.bind_columns(&headers);

        let id_idx = column_index(&headers, "ID")?;
        let date_idx = column_index(&headers, "Date")?;

        let mut rows = Vec::new();
        // (station, date, element) -> valid hourly values seen so far
        let mut subdaily: BTreeMap<(String, NaiveDate, String), Vec<f64>> = BTreeMap::new();

        for record in reader.records() {
            let record = record?;
            let station = record
                .get(id_idx)
                .ok_or_else(|| IngestError::InvalidFormat("row without ID".to_string()))?
                .to_string();
            let raw_date = record
                .get(date_idx)
                .ok_or_else(|| IngestError::InvalidFormat("row without Date".to_string()))?;
            let date = parse_export_date(raw_date)?;

            for binding in &bindings {
                let cell = record.get(binding.index).unwrap_or("");
                let mut value = cell.trim().parse::<f64>().ok();

                // Three independent masks, every layer column.
                if let Some(v) = value {
                    if v > binding.layer.valid_max {
                        value = None;
                    }
                }
                if let Some(v) = value {
                    if v < binding.layer.valid_min {
                        value = None;
                    }
                }
                if let Some(v) = value {
                    if v == binding.layer.fill_value {
                        value = None;
                    }
                }

                if binding.hour.is_some() {
                    if let Some(v) = value {
                        subdaily
                            .entry((station.clone(), date, binding.element.clone()))
                            .or_default()
                            .push(v);
                    }
                } else {
                    rows.push(LongRow {
                        station: station.clone(),
                        date,
                        element: binding.element.clone(),
                        value,
                        platform: self.platform.clone(),
                        units: layer_units(binding.layer),
                    });
                }
            }
        }

        for ((station, date, element), values) in subdaily {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let units = self.product.layers.get(&element).and_then(layer_units);
            rows.push(LongRow {
                station,
                date,
                element,
                value: Some(mean),
                platform: self.platform.clone(),
                units,
            });
        }

        debug!(file = ?self.path, rows = rows.len(), "cleaned export");
        Ok(rows)
    }
}

fn layer_units(layer: &Layer) -> Option<String> {
    if layer.units.trim().is_empty() {
        None
    } else {
        Some(layer.units.clone())
    }
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| IngestError::InvalidFormat(format!("export without a {} column", name)))
}

/// Export Date cells are `YYYY-MM-DD`, occasionally with a time suffix.
fn parse_export_date(raw: &str) -> Result<NaiveDate> {
    let day = raw.get(..10).unwrap_or(raw);
    Ok(NaiveDate::parse_from_str(day, "%Y-%m-%d")?)
}

/// Split a trailing `_{hour}` index (0..24) off a sub-daily column name.
fn split_hour_suffix(name: &str) -> Option<(&str, u32)> {
    let (base, suffix) = name.rsplit_once('_')?;
    let hour: u32 = suffix.parse().ok()?;
    if hour < 24 {
        Some((base, hour))
    } else {
        None
    }
}

/// The distinct products represented in a download directory, inferred from
/// the filenames.
pub fn platforms_in_dir(dir: &Path) -> Result<Vec<String>> {
    let mut platforms = std::collections::BTreeSet::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e == "csv").unwrap_or(false) {
            platforms.insert(product_from_filename(&path)?);
        }
    }
    Ok(platforms.into_iter().collect())
}

/// Clean every export file in a directory (one job's worth of downloads,
/// possibly spanning products) into a single combined long table.
pub fn clean_dir(dir: &Path, products: &HashMap<String, Product>) -> Result<Vec<LongRow>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|p| p.extension().map(|e| e == "csv").unwrap_or(false))
        .collect();
    paths.sort();

    let mut rows = Vec::new();
    for path in &paths {
        let platform = product_from_filename(path)?;
        let product = products.get(&platform).ok_or_else(|| {
            IngestError::MissingData(format!("no layer metadata for {}", platform))
        })?;
        let is_subdaily = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.contains(SUBDAILY_PRODUCT_MARKER))
            .unwrap_or(false);

        info!(file = ?path, platform = %platform, "cleaning export");
        let cleaner = Cleaner::new(path, product, is_subdaily)?;
        rows.extend(cleaner.clean()?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Write;

    fn layer(fill: f64, min: f64, max: f64, units: &str, is_qa: bool) -> Layer {
        Layer {
            add_offset: None,
            available: true,
            data_type: "float32".to_string(),
            description: String::new(),
            fill_value: fill,
            is_qa,
            layer: String::new(),
            scale_factor: None,
            units: units.to_string(),
            valid_max: max,
            valid_min: min,
        }
    }

    fn ndvi_product() -> Product {
        let mut layers = BTreeMap::new();
        layers.insert(
            "_500m_16_days_NDVI".to_string(),
            layer(-3000.0, -0.2, 1.0, "NDVI", false),
        );
        layers.insert(
            "_500m_16_days_VI_Quality".to_string(),
            layer(65535.0, 0.0, 65534.0, "bits", true),
        );
        Product::new("MOD13A1.061".to_string(), layers)
    }

    #[test]
    fn test_product_from_filename() {
        let p = product_from_filename(Path::new(
            "/tmp/mt-mesonet-MOD13A1-061-results.csv",
        ))
        .unwrap();
        assert_eq!(p, "MOD13A1.061");

        assert!(product_from_filename(Path::new("/tmp/short.csv")).is_err());
    }

    #[test]
    fn test_split_hour_suffix() {
        assert_eq!(
            split_hour_suffix("Geophysical_Data_sm_surface_3"),
            Some(("Geophysical_Data_sm_surface", 3))
        );
        assert_eq!(split_hour_suffix("Geophysical_Data_sm_surface"), None);
        assert_eq!(split_hour_suffix("layer_500"), None);
    }

    fn write_export(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_clean_masks_and_pivots() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_export(
            dir.path(),
            "mt-mesonet-MOD13A1-061-results.csv",
            "ID,Date,MOD13A1_061__500m_16_days_NDVI,MOD13A1_061__500m_16_days_VI_Quality\n\
             aceabsar,2023-06-10,0.65,0\n\
             aceabsar,2023-06-26,-3000,0\n\
             acecrow,2023-06-10,1.5,0\n",
        );

        let product = ndvi_product();
        let cleaner = Cleaner::new(&path, &product, false).unwrap();
        let rows = cleaner.clean().unwrap();

        // QA column dropped, one row per (station, date).
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].element, "_500m_16_days_NDVI");
        assert_eq!(rows[0].value, Some(0.65));
        assert_eq!(rows[0].units, Some("NDVI".to_string()));
        // Fill value nulled.
        assert_eq!(rows[1].value, None);
        // Above ValidMax nulled.
        assert_eq!(rows[2].value, None);
    }

    #[test]
    fn test_clean_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_export(
            dir.path(),
            "mt-mesonet-MOD13A1-061-results.csv",
            "ID,Date,MOD13A1_061__500m_16_days_NDVI\n\
             aceabsar,2023-06-10,0.65\n\
             acecrow,2023-06-10,0.40\n",
        );

        let product = ndvi_product();
        let first = Cleaner::new(&path, &product, false).unwrap().clean().unwrap();
        let second = Cleaner::new(&path, &product, false).unwrap().clean().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_subdaily_daily_mean() {
        let mut layers = BTreeMap::new();
        layers.insert(
            "Geophysical_Data_sm_surface".to_string(),
            layer(-9999.0, 0.0, 0.9, "m^3/m^3", false),
        );
        let product = Product::new("SPL4SMGP.006".to_string(), layers);

        let dir = tempfile::tempdir().unwrap();
        let path = write_export(
            dir.path(),
            "mt-mesonet-SPL4SMGP-006-results.csv",
            "ID,Date,SPL4SMGP_006_Geophysical_Data_sm_surface_0,SPL4SMGP_006_Geophysical_Data_sm_surface_1\n\
             aceabsar,2023-06-10,0.2,0.4\n\
             acecrow,2023-06-10,-9999,-9999\n",
        );

        let cleaner = Cleaner::new(&path, &product, true).unwrap();
        let rows = cleaner.clean().unwrap();

        // acecrow's day had no valid hours and is dropped entirely.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].station, "aceabsar");
        assert_eq!(rows[0].element, "Geophysical_Data_sm_surface");
        assert!((rows[0].value.unwrap() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_clean_dir_spans_products() {
        let dir = tempfile::tempdir().unwrap();
        write_export(
            dir.path(),
            "mt-mesonet-MOD13A1-061-results.csv",
            "ID,Date,MOD13A1_061__500m_16_days_NDVI\naceabsar,2023-06-10,0.65\n",
        );
        write_export(dir.path(), "readme.txt", "not a csv\n");

        let mut products = HashMap::new();
        products.insert("MOD13A1.061".to_string(), ndvi_product());

        let rows = clean_dir(dir.path(), &products).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].platform, "MOD13A1.061");
    }
}
