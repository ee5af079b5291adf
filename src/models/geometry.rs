use serde::Serialize;

use crate::error::{IngestError, Result};
use crate::models::Station;

/// One extraction point in the request body shape the job API expects.
#[derive(Debug, Clone, Serialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    pub id: String,
}

/// The set of station points an extraction job runs over.
#[derive(Debug, Clone, Default)]
pub struct PointSet {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub ids: Vec<String>,
}

impl PointSet {
    pub fn from_stations(stations: &[Station]) -> Self {
        Self {
            lats: stations.iter().map(|s| s.latitude).collect(),
            lons: stations.iter().map(|s| s.longitude).collect(),
            ids: stations.iter().map(|s| s.station.clone()).collect(),
        }
    }

    /// Restrict the point set to the named stations, preserving order.
    pub fn filter(&self, keep: &[String]) -> Self {
        let mut out = Self::default();
        for ((lat, lon), id) in self.lats.iter().zip(&self.lons).zip(&self.ids) {
            if keep.contains(id) {
                out.lats.push(*lat);
                out.lons.push(*lon);
                out.ids.push(id.clone());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Extraction geometry. Polygon requests are not supported upstream and have
/// no constructor; the variant exists so the submission path can surface the
/// condition as a typed error instead of a runtime type check.
#[derive(Debug, Clone)]
pub enum Geometry {
    Point(PointSet),
    Polygon,
}

impl Geometry {
    /// Format the geometry for the submission body.
    pub fn task_format(&self) -> Result<Vec<Coordinate>> {
        match self {
            Geometry::Point(points) => Ok(points
                .lats
                .iter()
                .zip(&points.lons)
                .zip(&points.ids)
                .map(|((lat, lon), id)| Coordinate {
                    latitude: *lat,
                    longitude: *lon,
                    id: id.clone(),
                })
                .collect()),
            Geometry::Polygon => Err(IngestError::PolygonUnsupported),
        }
    }
}
