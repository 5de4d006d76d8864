//! Batch rendering of many thumbnails in parallel.
//!
//! A job file is a JSON array of jobs:
//!
//! ```json
//! [
//!   {"source": "in/photo.jpg", "params": "w=200&h=200&cm=1&g=5", "output": "out/photo.jpg"},
//!   {"source": "in/shop.png", "params": "/io=logo.png?w=300&iog=9", "output": "out/shop.png",
//!    "overlay": "in/logo.png"}
//! ]
//! ```
//!
//! `params` takes the request path syntax; a bare query string (no leading
//! `/`) is accepted too. Relative paths resolve against the job file's
//! directory. A directory of job files is read recursively, files in name
//! order.
//!
//! ## Parallel Processing
//!
//! Jobs run on the global [rayon](https://docs.rs/rayon) pool, whose size
//! (see [`crate::config::effective_threads`]) bounds the number of engine
//! invocations in flight. A failing job is reported in its [`JobResult`]
//! and never aborts the others.

use crate::config::ServiceConfig;
use crate::imaging::{ImageEngine, ImageFormat, RenderOutcome, ThumbnailError, render};
use crate::request::{RequestError, parse_params, request_path};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Invalid parameters: {0}")]
    Request(#[from] RequestError),
    #[error(transparent)]
    Thumbnail(#[from] ThumbnailError),
}

/// One render job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchJob {
    pub source: PathBuf,
    #[serde(default)]
    pub params: String,
    pub output: PathBuf,
    #[serde(default)]
    pub overlay: Option<PathBuf>,
}

impl BatchJob {
    fn resolve_against(mut self, base: &Path) -> Self {
        self.source = base.join(&self.source);
        self.output = base.join(&self.output);
        self.overlay = self.overlay.map(|o| base.join(o));
        self
    }

    pub fn request_path(&self) -> String {
        request_path(&self.params)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Rendered {
        format: ImageFormat,
        width: u32,
        height: u32,
        bytes: usize,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    /// Position in the job list.
    pub index: usize,
    pub source: PathBuf,
    pub output: PathBuf,
    #[serde(flatten)]
    pub status: JobStatus,
}

/// Totals over a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub rendered: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[JobResult]) -> Self {
        results
            .iter()
            .fold(Self::default(), |mut summary, result| {
                match result.status {
                    JobStatus::Rendered { .. } => summary.rendered += 1,
                    JobStatus::Skipped { .. } => summary.skipped += 1,
                    JobStatus::Failed { .. } => summary.failed += 1,
                }
                summary
            })
    }
}

fn read_job_file(path: &Path) -> Result<Vec<BatchJob>, BatchError> {
    let content = std::fs::read_to_string(path)?;
    let jobs: Vec<BatchJob> =
        serde_json::from_str(&content).map_err(|source| BatchError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    let base = path.parent().unwrap_or(Path::new(""));
    Ok(jobs.into_iter().map(|job| job.resolve_against(base)).collect())
}

/// Load jobs from a job file, or from every `*.json` under a directory.
pub fn load_jobs(path: &Path) -> Result<Vec<BatchJob>, BatchError> {
    if !path.is_dir() {
        return read_job_file(path);
    }

    let mut jobs = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        let is_json = entry.path().extension().is_some_and(|ext| ext == "json");
        if entry.file_type().is_file() && is_json {
            jobs.extend(read_job_file(entry.path())?);
        }
    }
    Ok(jobs)
}

/// Render a single job and write its output file.
pub fn run_job<E: ImageEngine>(
    engine: &E,
    job: &BatchJob,
    config: &ServiceConfig,
) -> Result<JobStatus, BatchError> {
    let request = parse_params(&job.request_path(), config)?;
    let source = std::fs::read(&job.source)?;
    let overlay = job.overlay.as_deref().map(std::fs::read).transpose()?;

    match render(engine, source, overlay.as_deref(), &request)? {
        RenderOutcome::Rendered(rendered) => {
            if let Some(parent) = job.output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&job.output, &rendered.bytes)?;
            let canvas = rendered.plan.canvas.rounded();
            Ok(JobStatus::Rendered {
                format: rendered.format,
                width: canvas.width,
                height: canvas.height,
                bytes: rendered.bytes.len(),
            })
        }
        RenderOutcome::Skipped(reason) => Ok(JobStatus::Skipped {
            reason: reason.to_string(),
        }),
    }
}

/// Run all `jobs` in parallel. Results come back in job order; each finished
/// job is also sent to `progress` as it completes.
pub fn run_batch<E: ImageEngine>(
    engine: &E,
    jobs: &[BatchJob],
    config: &ServiceConfig,
    progress: Option<Sender<JobResult>>,
) -> Vec<JobResult> {
    jobs.par_iter()
        .enumerate()
        .map_with(progress, |progress, (index, job)| {
            let status = run_job(engine, job, config).unwrap_or_else(|e| {
                log::error!("{}: {e}", job.source.display());
                JobStatus::Failed {
                    error: e.to_string(),
                }
            });
            let result = JobResult {
                index,
                source: job.source.clone(),
                output: job.output.clone(),
                status,
            };
            if let Some(tx) = progress {
                // Receiver gone means nobody is listening; keep rendering
                let _ = tx.send(result.clone());
            }
            result
        })
        .collect()
}
