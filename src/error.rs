use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Graph store error: {0}")]
    Graph(#[from] neo4rs::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Login rejected: {0}")]
    Auth(String),

    #[error("Extraction request rejected: {message}")]
    InvalidRequest { message: String },

    #[error("Job still running. Try downloading again later.")]
    PendingTask,

    #[error("Remote job {name} finished with an error status")]
    JobFailed { name: String },

    #[error("Job has not been submitted yet")]
    Unsubmitted,

    #[error("Invalid job name '{0}': the '-' delimiter cannot be used in job names")]
    InvalidJobName(String),

    #[error("Polygon extraction is not supported")]
    PolygonUnsupported,

    #[error("Inconsistent gap for platform {platform}: indicators diverge on start dates {dates:?}")]
    InconsistentGap {
        platform: String,
        dates: Vec<NaiveDate>,
    },

    #[error("Station {station} shares coordinates with more than one other station: {group:?}")]
    AmbiguousCollocation {
        station: String,
        group: Vec<String>,
    },

    #[error("Gave up polling after {attempts} attempts")]
    PollLimitExceeded { attempts: u32 },

    #[error("Station {station} not found in the catalog")]
    StationNotFound { station: String },

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}
