//! Response payloads of the processing API and their interpretation.
//!
//! Server variants disagree on where progress lives (top-level `progress` /
//! `current_phase` or nested `progress_data`) and on which status route is
//! used. Everything is optional on the wire; [`StatusResponse::interpret`]
//! turns whatever arrived into a single [`StatusUpdate`].

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::{JobId, ProcessingMetrics, ResultData, Statistics, Visualizations};

/// `GET /api/health/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub message: String,
}

/// `POST /api/process-deck/`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitResponse {
    #[serde(alias = "job_id")]
    pub task_id: Option<String>,
    pub statistics: Option<Statistics>,
    pub visualizations: Option<Visualizations>,
    pub processing_metrics: Option<ProcessingMetrics>,
    pub download_url: Option<String>,
}

/// What a successful submission means for the flow.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Job queued; poll it.
    Accepted(JobId),
    /// Server processed synchronously and returned results inline.
    CompletedImmediately {
        job_id: Option<JobId>,
        result: ResultData,
    },
}

impl SubmitResponse {
    /// Inline statistics take precedence over a job id; neither is an error.
    pub fn into_outcome(self) -> Result<SubmitOutcome> {
        let job_id = self
            .task_id
            .filter(|id| !id.trim().is_empty())
            .map(JobId::new);

        if let Some(statistics) = self.statistics {
            return Ok(SubmitOutcome::CompletedImmediately {
                job_id,
                result: ResultData {
                    statistics,
                    visualizations: self.visualizations.unwrap_or_default(),
                    processing_metrics: self.processing_metrics,
                    download_url: self.download_url,
                },
            });
        }

        job_id.map(SubmitOutcome::Accepted).ok_or(Error::MissingJobId)
    }
}

/// Nested progress block used by the jobs route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressData {
    pub progress: Option<f64>,
    pub phase: Option<String>,
    pub estimated_time_remaining: Option<f64>,
}

/// `GET /api/upload-progress/{id}/` or `GET /api/jobs/{id}/status/`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusResponse {
    pub status: Option<String>,
    pub progress: Option<f64>,
    pub current_phase: Option<String>,
    pub progress_data: Option<ProgressData>,
    pub error_message: Option<String>,
    pub error: Option<String>,
    pub result: Option<ResultData>,
    pub statistics: Option<Statistics>,
    pub visualizations: Option<Visualizations>,
    pub processing_metrics: Option<ProcessingMetrics>,
    pub download_url: Option<String>,
}

/// Progress fields of a non-terminal status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressReport {
    /// `None` when this response carried no progress value.
    pub percent: Option<u8>,
    pub phase: Option<String>,
    pub estimated_seconds_remaining: Option<f64>,
}

/// A status response reduced to what the state machine needs.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    InProgress(ProgressReport),
    Completed(Box<ResultData>),
    Failed(String),
}

impl StatusUpdate {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress(_))
    }
}

/// Clamp a raw progress value into 0..=100 for display. Floored, so a job
/// at 99.5 never shows as 100. NaN reads as no progress.
fn clamp_percent(raw: f64) -> Option<u8> {
    if raw.is_nan() {
        return None;
    }
    Some(raw.clamp(0.0, 100.0).floor() as u8)
}

impl StatusResponse {
    /// Progress exactly as sent. Nested `progress_data` wins over the
    /// top-level field.
    pub fn raw_progress(&self) -> Option<f64> {
        self.progress_data
            .as_ref()
            .and_then(|d| d.progress)
            .or(self.progress)
            .filter(|p| !p.is_nan())
    }

    pub fn percent(&self) -> Option<u8> {
        self.raw_progress().and_then(clamp_percent)
    }

    pub fn phase(&self) -> Option<&str> {
        self.progress_data
            .as_ref()
            .and_then(|d| d.phase.as_deref())
            .or(self.current_phase.as_deref())
            .filter(|p| !p.is_empty())
    }

    /// Negative or non-finite estimates read as unknown.
    pub fn estimated_seconds_remaining(&self) -> Option<f64> {
        self.progress_data
            .as_ref()
            .and_then(|d| d.estimated_time_remaining)
            .filter(|s| s.is_finite() && *s >= 0.0)
    }

    fn status_is(&self, expected: &str) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case(expected))
    }

    /// Explicit `COMPLETED` and progress at 100 both mean done.
    pub fn is_completed(&self) -> bool {
        self.status_is("COMPLETED") || self.raw_progress().is_some_and(|p| p >= 100.0)
    }

    pub fn is_failed(&self) -> bool {
        self.status_is("FAILED")
    }

    fn into_result(self) -> ResultData {
        if let Some(result) = self.result {
            return result;
        }
        ResultData {
            statistics: self.statistics.unwrap_or_default(),
            visualizations: self.visualizations.unwrap_or_default(),
            processing_metrics: self.processing_metrics,
            download_url: self.download_url,
        }
    }

    /// Reduce the payload. An explicit failure outranks a progress of 100.
    pub fn interpret(self) -> StatusUpdate {
        if self.is_failed() {
            let message = self
                .error_message
                .or(self.error)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| defaults::GENERIC_FAILURE_MESSAGE.to_string());
            return StatusUpdate::Failed(message);
        }

        if self.is_completed() {
            return StatusUpdate::Completed(Box::new(self.into_result()));
        }

        StatusUpdate::InProgress(ProgressReport {
            percent: self.percent(),
            phase: self.phase().map(str::to_string),
            estimated_seconds_remaining: self.estimated_seconds_remaining(),
        })
    }
}
