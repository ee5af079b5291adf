//! Canonicalizes raw element names and harmonizes units and scales across
//! platforms before rows reach the store.

use std::collections::HashSet;

use crate::models::Observation;
use crate::normalize::LongRow;
use crate::utils::constants::{
    DAILY_ET_PLATFORM, DAILY_GPP_PLATFORM, DEFAULT_UNITS, MISSING_VALUE_SENTINEL,
};

/// Raw layer names as exported, per product version, mapped to the canonical
/// vocabulary. Unmapped names pass through unchanged so future layers are
/// still recorded.
const ELEMENT_MAP: &[(&str, &str)] = &[
    ("ET_500m", "ET"),
    ("Fpar_500m", "Fpar"),
    ("GPP_gpp_mean", "GPP"),
    ("Geophysical_Data_sm_rootzone", "sm_rootzone"),
    ("Geophysical_Data_sm_rootzone_wetness", "sm_rootzone_wetness"),
    ("Geophysical_Data_sm_surface", "sm_surface"),
    ("Geophysical_Data_sm_surface_wetness", "sm_surface_wetness"),
    ("Gpp_500m", "GPP"),
    ("Lai_500m", "LAI"),
    ("PET_500m", "PET"),
    ("_500m_16_days_EVI", "EVI"),
    ("_500m_16_days_NDVI", "NDVI"),
    ("_500_m_16_days_EVI", "EVI"),
    ("_500_m_16_days_NDVI", "NDVI"),
    ("EVAPOTRANSPIRATION_ALEXI_ETdaily", "ET"),
    ("EVAPOTRANSPIRATION_PT_JPL_ETdaily", "ET"),
];

pub fn canonical_element(raw: &str) -> &str {
    ELEMENT_MAP
        .iter()
        .find(|(from, _)| *from == raw)
        .map(|(_, to)| *to)
        .unwrap_or(raw)
}

/// Unit/scale harmonization for one canonical row. Conversions apply to real
/// values only; the missing-value sentinel must reach the store unscaled.
fn harmonize(platform: &str, element: &str, value: Option<f64>, units: String) -> (f64, String) {
    let mut units = units;
    let mut value = value;

    match element {
        // Vegetation indices are dimensionless ratios whatever the export says.
        "NDVI" | "EVI" => units = DEFAULT_UNITS.to_string(),
        // 8-day composite GPP arrives as kg C m^-2 per composite; rescale to
        // a daily g C m^-2 rate. The SMAP L4C product is already daily.
        "GPP" if platform != DAILY_GPP_PLATFORM => {
            value = value.map(|v| (v * 1000.0) / 8.0);
            units = "gCm^-2day^-1".to_string();
        }
        // 8-day composite ET/PET become daily rates; ALEXI ET is already daily.
        "ET" if platform != DAILY_ET_PLATFORM => {
            value = value.map(|v| v / 8.0);
        }
        "PET" => {
            value = value.map(|v| v / 8.0);
        }
        _ => {}
    }

    (value.unwrap_or(MISSING_VALUE_SENTINEL), units)
}

/// Convert the combined long table into store observations: unix timestamps,
/// canonical element names, derived identities, harmonized units, and exact
/// duplicates (from overlapping job windows) removed.
pub fn to_store_format(rows: &[LongRow]) -> Vec<Observation> {
    let mut seen = HashSet::new();
    let mut observations = Vec::with_capacity(rows.len());

    for row in rows {
        let timestamp = row
            .date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default();
        let element = canonical_element(&row.element).to_string();
        let units = row
            .units
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_UNITS.to_string());

        let (value, units) = harmonize(&row.platform, &element, row.value, units);
        let observation = Observation::new(
            row.station.clone(),
            timestamp,
            row.platform.clone(),
            element,
            value,
            units,
        );

        if seen.insert(observation.dedup_key()) {
            observations.push(observation);
        }
    }

    observations
}
