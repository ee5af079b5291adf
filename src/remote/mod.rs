pub mod session;
pub mod task;

pub use session::Session;
pub use task::{list_jobs, stop_all_jobs, wait_all, ExtractionJob, JobStatus, JobSummary};
