//! Lifecycle of remote extraction jobs: submit, poll, download, delete.

use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{IngestError, Result};
use crate::models::Geometry;
use crate::remote::Session;

/// Job state machine: `Unsubmitted → Pending → {Done | Error}`. `Done` and
/// `Error` are terminal; status only changes through polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Unsubmitted,
    Pending,
    Done,
    Error,
}

impl JobStatus {
    /// Remote statuses other than `done`/`error` (queued, processing, ...)
    /// all mean the job is still in flight.
    pub fn parse(s: &str) -> Self {
        match s {
            "done" => JobStatus::Done,
            "error" => JobStatus::Error,
            _ => JobStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

/// One remote asynchronous extraction request. `job_id` is assigned by the
/// service on submission and never changes afterwards.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub name: String,
    pub products: Vec<String>,
    pub layers: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub geometry: Geometry,
    pub year_range: Option<(i32, i32)>,
    pub job_id: Option<String>,
    pub status: JobStatus,
}

impl ExtractionJob {
    /// Job names are embedded in `{name}_{start}_{end}` style identifiers
    /// elsewhere, so the `-` delimiter is rejected up front.
    pub fn new(
        name: String,
        products: Vec<String>,
        layers: Vec<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        geometry: Geometry,
    ) -> Result<Self> {
        if name.contains('-') {
            return Err(IngestError::InvalidJobName(name));
        }
        Ok(Self {
            name,
            products,
            layers,
            start_date,
            end_date,
            geometry,
            year_range: None,
            job_id: None,
            status: JobStatus::Unsubmitted,
        })
    }

    pub fn with_year_range(mut self, start_year: i32, end_year: i32) -> Self {
        self.year_range = Some((start_year, end_year));
        self
    }

    fn require_id(&self) -> Result<&str> {
        self.job_id.as_deref().ok_or(IngestError::Unsubmitted)
    }

    /// Build the submission body from the job's product/layer pairs and
    /// geometry.
    pub fn build_request(&self) -> Result<Value> {
        let mut dates = json!({
            "startDate": self.start_date.format("%Y-%m-%d").to_string(),
            "endDate": self.end_date.format("%Y-%m-%d").to_string(),
        });
        if let Some((start_year, end_year)) = self.year_range {
            dates["recurring"] = json!(true);
            dates["yearRange"] = json!([start_year, end_year]);
        }

        let layers: Vec<Value> = self
            .products
            .iter()
            .zip(&self.layers)
            .map(|(product, layer)| json!({ "product": product, "layer": layer }))
            .collect();

        Ok(json!({
            "task_type": "point",
            "task_name": self.name,
            "params": {
                "dates": [dates],
                "layers": layers,
                "coordinates": self.geometry.task_format()?,
            },
        }))
    }

    /// Submit the job. Anything but a 202 fails with the server-supplied
    /// message; on success the assigned id is stored and the job is pending.
    pub async fn submit(&mut self, session: &Session) -> Result<()> {
        let body = self.build_request()?;
        let response = session.post("task").json(&body).send().await?;
        let code = response.status();
        let payload: Value = response.json().await?;

        if code != StatusCode::ACCEPTED {
            let message = payload
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Invalid Request.")
                .to_string();
            return Err(IngestError::InvalidRequest { message });
        }

        let job_id = payload
            .get("task_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                IngestError::InvalidFormat("submission response without task_id".to_string())
            })?;
        self.job_id = Some(job_id.to_string());
        self.status = payload
            .get("status")
            .and_then(|s| s.as_str())
            .map(JobStatus::parse)
            .unwrap_or(JobStatus::Pending);

        info!(job = %self.name, id = %job_id, "extraction job submitted");
        Ok(())
    }

    /// Refresh the job status. A response body with no `status` field is the
    /// service's "still queued" signal and reads as pending; otherwise the
    /// reported status is taken verbatim.
    pub async fn poll(&mut self, session: &Session) -> Result<JobStatus> {
        let id = self.require_id()?.to_string();
        let payload: Value = session
            .get(&format!("status/{}", id))
            .send()
            .await?
            .json()
            .await?;

        self.status = match payload.get("status").and_then(|s| s.as_str()) {
            Some(s) => JobStatus::parse(s),
            None => JobStatus::Pending,
        };
        Ok(self.status)
    }

    /// Download the job's result files into `dir`, or fail with
    /// `PendingTask` if the latest poll does not show `done`. Unless
    /// `include_all` is set, only the CSV result files are written; the
    /// metadata and documentation files in the bundle are skipped.
    pub async fn download(
        &mut self,
        session: &Session,
        dir: &Path,
        include_all: bool,
    ) -> Result<()> {
        match self.poll(session).await? {
            JobStatus::Done => {}
            // Terminal failure: re-queueing would wait forever.
            JobStatus::Error => {
                return Err(IngestError::JobFailed {
                    name: self.name.clone(),
                })
            }
            _ => return Err(IngestError::PendingTask),
        }
        let id = self.require_id()?.to_string();

        let bundle: Value = session
            .get(&format!("bundle/{}", id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let files = bundle
            .get("files")
            .and_then(|f| f.as_array())
            .ok_or_else(|| {
                IngestError::InvalidFormat("bundle listing without files".to_string())
            })?;

        for f in files {
            let file_type = f.get("file_type").and_then(|v| v.as_str()).unwrap_or("");
            if !include_all && file_type != "csv" {
                continue;
            }
            let file_id = match f.get("file_id") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    return Err(IngestError::InvalidFormat(
                        "bundle file without file_id".to_string(),
                    ))
                }
            };
            let file_name = f
                .get("file_name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    IngestError::InvalidFormat("bundle file without file_name".to_string())
                })?;
            self.write_file(session, &id, &file_id, file_name, dir)
                .await?;
        }
        Ok(())
    }

    /// Stream one result file to disk. Extraction results can be large, so
    /// the body is written chunk by chunk rather than buffered.
    async fn write_file(
        &self,
        session: &Session,
        job_id: &str,
        file_id: &str,
        file_name: &str,
        dir: &Path,
    ) -> Result<()> {
        let mut response = session
            .get(&format!("bundle/{}/{}", job_id, file_id))
            .send()
            .await?
            .error_for_status()?;

        // Bundle entries can carry directory components; keep the name only.
        let name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| IngestError::InvalidFormat(format!("bad file name: {}", file_name)))?;
        let target = dir.join(name);

        let mut out = tokio::fs::File::create(&target).await?;
        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        Ok(())
    }

    /// Cancel/remove the remote job.
    pub async fn delete(&self, session: &Session) -> Result<()> {
        let id = self.require_id()?;
        session
            .delete(&format!("task/{}", id))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// A row from the account's job listing. Status is kept raw here because the
/// listing includes states (e.g. `expired`) the lifecycle enum does not model.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_id: String,
    pub status: String,
}

impl JobSummary {
    pub fn from_response(value: &Value) -> Option<Self> {
        let job_id = value.get("task_id")?.as_str()?.to_string();
        let status = value
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("pending")
            .to_string();
        Some(Self { job_id, status })
    }
}

/// List both completed and currently running jobs for the account.
pub async fn list_jobs(session: &Session) -> Result<Vec<JobSummary>> {
    let payload: Value = session.get("task").send().await?.json().await?;
    let rows = payload.as_array().ok_or_else(|| {
        IngestError::InvalidFormat("job listing was not an array".to_string())
    })?;
    Ok(rows.iter().filter_map(JobSummary::from_response).collect())
}

/// Delete every job that is not in a terminal `done`/`expired` state.
/// Returns how many were deleted.
pub async fn stop_all_jobs(session: &Session) -> Result<usize> {
    let jobs = list_jobs(session).await?;
    let mut deleted = 0;
    for job in jobs {
        if job.status == "done" || job.status == "expired" {
            continue;
        }
        session
            .delete(&format!("task/{}", job.job_id))
            .send()
            .await?
            .error_for_status()?;
        info!(id = %job.job_id, status = %job.status, "deleted job");
        deleted += 1;
    }
    Ok(deleted)
}

/// Block until every job is done, downloading each as soon as it becomes
/// ready and dropping it from the wait set. Jobs that are still pending are
/// re-queued for the next pass. There is no timeout unless `max_attempts`
/// is given.
pub async fn wait_all(
    jobs: Vec<ExtractionJob>,
    session: &Session,
    dir: &Path,
    interval: Duration,
    max_attempts: Option<u32>,
) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }

    let mut outstanding = jobs;
    let mut attempts = 0u32;

    // Freshly submitted jobs never finish instantly; sleep before the first pass.
    tokio::time::sleep(interval).await;

    loop {
        let mut still_running = Vec::new();
        for mut job in outstanding {
            match job.download(session, dir, false).await {
                Ok(()) => {
                    info!(job = %job.name, "job has completed and is downloaded");
                }
                Err(IngestError::PendingTask) => {
                    warn!(job = %job.name, "job is still running...");
                    still_running.push(job);
                }
                Err(e) => return Err(e),
            }
        }

        outstanding = still_running;
        if outstanding.is_empty() {
            return Ok(());
        }

        attempts += 1;
        if let Some(max) = max_attempts {
            if attempts >= max {
                return Err(IngestError::PollLimitExceeded { attempts });
            }
        }

        info!(
            "Waiting {} seconds to try again ({} outstanding)...",
            interval.as_secs(),
            outstanding.len()
        );
        tokio::time::sleep(interval).await;
    }
}
