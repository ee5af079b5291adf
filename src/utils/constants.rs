use chrono::NaiveDate;

/// Canonical indicator vocabulary tracked by the store.
pub const CANONICAL_ELEMENTS: &[&str] = &[
    "NDVI",
    "EVI",
    "PET",
    "ET",
    "GPP",
    "LAI",
    "Fpar",
    "sm_surface_wetness",
    "sm_surface",
    "sm_rootzone_wetness",
    "sm_rootzone",
];

/// Layer-name fragments that mark ancillary layers we never ingest
/// (per-PFT splits, standard deviations, percentiles, EVI2).
pub const NOISE_LAYER_PATTERNS: &[&str] = &["_pft", "_std_", "StdDev", "_EVI2", "_pctl"];

/// The one GPP platform whose values are already a daily flux rate.
pub const DAILY_GPP_PLATFORM: &str = "SPL4CMDL.006";

/// The one ET platform whose values are already daily rather than 8-day composites.
pub const DAILY_ET_PLATFORM: &str = "ECO3ETALEXI.001";

/// Filename marker for the sub-daily (3-hourly) soil moisture product.
pub const SUBDAILY_PRODUCT_MARKER: &str = "SPL4SMGP";

/// Sentinel written to the store for missing values. The store distinguishes
/// "absent" from "explicitly invalid" observations by this value.
pub const MISSING_VALUE_SENTINEL: f64 = -9999.0;

pub const DEFAULT_UNITS: &str = "unitless";

/// Ingest progress is reported every this many rows.
pub const PROGRESS_REPORT_EVERY: usize = 10;

/// Filename stem for bulk-load chunk files.
pub const BULK_LOAD_STEM: &str = "data_init";

/// Earliest date a remote extraction can be asked for.
pub fn backfill_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
}

/// Stations whose first record is after this date are assumed to be missing
/// history and are queued for backfill by the check-backfill scan.
pub fn record_date_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}
