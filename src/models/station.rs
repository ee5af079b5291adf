use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// One entry in the station roster. Stations are catalog inputs and are never
/// mutated by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Station {
    pub station: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

impl Station {
    pub fn new(station: String, latitude: f64, longitude: f64) -> Self {
        Self {
            station,
            latitude,
            longitude,
        }
    }

    /// Key for exact-coordinate equality. Collocation is defined on the bit
    /// pattern of the catalog values, not on a distance tolerance.
    pub fn coordinate_key(&self) -> (u64, u64) {
        (self.latitude.to_bits(), self.longitude.to_bits())
    }
}

/// Group the roster by exact (latitude, longitude). Only groups with two or
/// more members are returned; everything else is trivially isolated.
pub fn collocation_groups(stations: &[Station]) -> HashMap<(u64, u64), Vec<String>> {
    let mut groups: HashMap<(u64, u64), Vec<String>> = HashMap::new();
    for s in stations {
        groups
            .entry(s.coordinate_key())
            .or_default()
            .push(s.station.clone());
    }
    groups.retain(|_, members| members.len() >= 2);
    for members in groups.values_mut() {
        members.sort();
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_validation() {
        let station = Station::new("aceabsar".to_string(), 45.2139, -109.7952);
        assert!(station.validate().is_ok());

        let bad = Station::new("nowhere".to_string(), 91.0, -109.7952);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_collocation_groups() {
        let stations = vec![
            Station::new("a".to_string(), 45.0, -110.0),
            Station::new("b".to_string(), 45.0, -110.0),
            Station::new("c".to_string(), 46.5, -111.0),
        ];

        let groups = collocation_groups(&stations);
        assert_eq!(groups.len(), 1);
        let members = groups.values().next().unwrap();
        assert_eq!(members, &vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_nearby_coordinates_are_not_collocated() {
        let stations = vec![
            Station::new("a".to_string(), 45.0, -110.0),
            Station::new("b".to_string(), 45.0, -110.0000001),
        ];

        assert!(collocation_groups(&stations).is_empty());
    }
}
