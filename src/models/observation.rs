use serde::{Deserialize, Serialize};

/// Derive the store identity of an observation. This is a pure function of
/// the four identifying fields; two observations that agree on them are
/// always the same row.
pub fn derive_id(station: &str, timestamp: i64, platform: &str, element: &str) -> String {
    format!("{}_{}_{}_{}", station, timestamp, platform, element)
}

/// The canonical unit of the store: one indicator value at one station at one
/// time. Written once; a duplicate write is a benign conflict, never an
/// overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub station: String,
    /// UNIX seconds. The OBSERVES relationship carries the authoritative
    /// copy; this one exists for identity derivation.
    pub timestamp: i64,
    pub platform: String,
    pub element: String,
    pub value: f64,
    pub units: String,
    pub id: String,
}

impl Observation {
    pub fn new(
        station: String,
        timestamp: i64,
        platform: String,
        element: String,
        value: f64,
        units: String,
    ) -> Self {
        let id = derive_id(&station, timestamp, &platform, &element);
        Self {
            station,
            timestamp,
            platform,
            element,
            value,
            units,
            id,
        }
    }

    /// Key used to drop exact duplicates arising from overlapping job
    /// windows. Value bits are included so a conflicting replay is not
    /// silently collapsed here; the store's constraint handles that case.
    pub fn dedup_key(&self) -> (String, u64, String) {
        (self.id.clone(), self.value.to_bits(), self.units.clone())
    }
}
