//! Upload/processing session state machine.
//!
//! A [`Session`] owns everything the user has entered and the state of the
//! current job. Transitions:
//!
//! ```text
//! Idle ──begin_submission──▶ Submitting ──submission_succeeded──▶ Processing
//!                               │      └──(inline results)──────▶ Completed
//!                               └──submission_failed──▶ Failed
//! Processing ──apply_status──▶ Processing | Completed | Failed
//! any ──reset──▶ Idle (selection and form cleared)
//! ```
//!
//! `Failed` and `Completed` keep the selection so the user can resubmit.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::{
    EmbeddingModel, FileSlot, FormFields, JobId, JobPhase, JobState, Progress, ResultData,
    SelectedFile, UploadSelection,
};
use crate::responses::{StatusUpdate, SubmitOutcome};
use crate::validation::{
    content_matches_slot, validate_extension, validate_for_slot, validate_size,
};

/// Whether the polling loop should keep going after a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDirective {
    Continue,
    Stop,
}

/// Borrowed view of everything a submission sends.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionRequest<'a> {
    pub deck: &'a SelectedFile,
    pub study: &'a SelectedFile,
    pub tag_prefix: &'a str,
    pub model: EmbeddingModel,
}

/// User input plus the state of the current job.
#[derive(Debug, Clone)]
pub struct Session {
    selection: UploadSelection,
    form: FormFields,
    state: JobState,
    notice: Option<String>,
    max_upload_bytes: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_max_upload_bytes(defaults::MAX_UPLOAD_BYTES)
    }

    pub fn with_max_upload_bytes(max_upload_bytes: u64) -> Self {
        Self {
            selection: UploadSelection::default(),
            form: FormFields::default(),
            state: JobState::Idle,
            notice: None,
            max_upload_bytes,
        }
    }

    pub fn selection(&self) -> &UploadSelection {
        &self.selection
    }

    pub fn form(&self) -> &FormFields {
        &self.form
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn phase(&self) -> JobPhase {
        self.state.phase()
    }

    /// User-visible validation message from the last rejected input.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Offer a file to a slot.
    ///
    /// A rejected file leaves the slot untouched and records a notice; an
    /// accepted one replaces the slot and clears the notice.
    pub fn select_file(&mut self, slot: FileSlot, file: SelectedFile) -> Result<()> {
        if let Err(e) = validate_for_slot(slot, &file, self.max_upload_bytes) {
            warn!(subsystem = "session", %slot, error = %e, "Rejected file");
            self.notice = Some(e.to_string());
            return Err(e);
        }

        if !content_matches_slot(slot, &file.bytes) {
            warn!(
                subsystem = "session",
                %slot,
                file = %file.file_name,
                content_type = %file.content_type,
                "File content does not look like its extension"
            );
        }

        debug!(subsystem = "session", %slot, file = %file.file_name, size = file.size(), "Selected file");
        self.selection.set(slot, file);
        self.notice = None;
        Ok(())
    }

    /// Offer a file on disk to a slot.
    ///
    /// The extension and the size on disk are checked before the file is
    /// read, so an oversized upload is never loaded into memory.
    pub fn select_path(&mut self, slot: FileSlot, path: &Path) -> Result<()> {
        let checked = SelectedFile::name_of(path).and_then(|name| {
            validate_extension(slot, &name)?;
            let size = std::fs::metadata(path)?.len();
            validate_size(slot, &name, size, self.max_upload_bytes)
        });
        if let Err(e) = checked {
            warn!(subsystem = "session", %slot, path = %path.display(), error = %e, "Rejected file");
            self.notice = Some(e.to_string());
            return Err(e);
        }

        self.select_file(slot, SelectedFile::from_path(path)?)
    }

    /// Update the tag prefix, returning the sanitized value that was stored.
    pub fn set_tag_prefix(&mut self, raw: &str) -> &str {
        self.form.set_tag_prefix(raw);
        self.form.tag_prefix()
    }

    pub fn set_model(&mut self, model: EmbeddingModel) {
        self.form.model = model;
    }

    fn check_ready(&self) -> Result<()> {
        if self.state.is_busy() {
            return Err(Error::Busy);
        }
        if self.selection.deck.is_none() {
            return Err(Error::MissingFile(FileSlot::Deck));
        }
        if self.selection.study.is_none() {
            return Err(Error::MissingFile(FileSlot::Study));
        }
        if self.form.tag_prefix().is_empty() {
            return Err(Error::EmptyTagPrefix);
        }
        Ok(())
    }

    /// Validate the inputs and move to `Submitting`.
    ///
    /// On failure nothing changes except the notice; the caller must not
    /// touch the network.
    pub fn begin_submission(&mut self) -> Result<SubmissionRequest<'_>> {
        if let Err(e) = self.check_ready() {
            self.notice = Some(e.to_string());
            return Err(e);
        }

        self.notice = None;
        self.state = JobState::Submitting;
        info!(
            subsystem = "session",
            model = %self.form.model,
            tag_prefix = %self.form.tag_prefix(),
            "Submitting deck"
        );

        match (&self.selection.deck, &self.selection.study) {
            (Some(deck), Some(study)) => Ok(SubmissionRequest {
                deck,
                study,
                tag_prefix: self.form.tag_prefix(),
                model: self.form.model,
            }),
            _ => Err(Error::Internal("selection changed during submission".into())),
        }
    }

    /// Record the server's answer to the submission.
    ///
    /// Returns the job to poll, or `None` when the flow already ended.
    pub fn submission_succeeded(&mut self, outcome: SubmitOutcome) -> Option<JobId> {
        self.submission_succeeded_at(outcome, Utc::now())
    }

    pub fn submission_succeeded_at(
        &mut self,
        outcome: SubmitOutcome,
        now: DateTime<Utc>,
    ) -> Option<JobId> {
        if !matches!(self.state, JobState::Submitting) {
            debug!(subsystem = "session", phase = %self.phase(), "Ignoring late submission result");
            return None;
        }

        match outcome {
            SubmitOutcome::Accepted(job_id) => {
                info!(subsystem = "session", job_id = %job_id, "Job accepted");
                self.state = JobState::Processing {
                    job_id: job_id.clone(),
                    progress: Progress::default(),
                    started_at: now,
                };
                Some(job_id)
            }
            SubmitOutcome::CompletedImmediately { job_id, result } => {
                info!(subsystem = "session", "Deck processed synchronously");
                self.state = JobState::Completed {
                    job_id,
                    result: Box::new(result),
                };
                None
            }
        }
    }

    /// Record a failed submission; the error text becomes the job message.
    pub fn submission_failed(&mut self, error: &Error) {
        if !matches!(self.state, JobState::Submitting) {
            return;
        }
        warn!(subsystem = "session", error = %error, "Submission failed");
        self.state = JobState::Failed {
            job_id: None,
            message: error.to_string(),
        };
    }

    /// Apply one poll result.
    pub fn apply_status(&mut self, update: StatusUpdate) -> PollDirective {
        self.apply_status_at(update, Utc::now())
    }

    pub fn apply_status_at(&mut self, update: StatusUpdate, now: DateTime<Utc>) -> PollDirective {
        let phase = self.state.phase();
        let JobState::Processing {
            job_id,
            progress,
            started_at,
        } = &mut self.state
        else {
            debug!(subsystem = "session", %phase, "Ignoring stale status update");
            return PollDirective::Stop;
        };

        match update {
            StatusUpdate::InProgress(report) => {
                if let Some(percent) = report.percent {
                    progress.percent = percent;
                }
                if report.phase.is_some() {
                    progress.phase = report.phase;
                }
                if report.estimated_seconds_remaining.is_some() {
                    progress.estimated_seconds_remaining = report.estimated_seconds_remaining;
                }
                progress.elapsed_seconds =
                    (now - *started_at).num_milliseconds().max(0) as f64 / 1000.0;
                debug!(
                    subsystem = "session",
                    job_id = %job_id,
                    progress = progress.percent,
                    phase = ?progress.phase,
                    "Job progress"
                );
                PollDirective::Continue
            }
            StatusUpdate::Completed(result) => {
                info!(subsystem = "session", job_id = %job_id, "Job completed");
                self.complete(result);
                PollDirective::Stop
            }
            StatusUpdate::Failed(message) => {
                warn!(subsystem = "session", job_id = %job_id, error = %message, "Job failed");
                let job_id = Some(job_id.clone());
                self.state = JobState::Failed { job_id, message };
                PollDirective::Stop
            }
        }
    }

    fn complete(&mut self, result: Box<ResultData>) {
        let job_id = self.state.job_id().cloned();
        self.state = JobState::Completed { job_id, result };
    }

    /// Give up on a running job (e.g. the server stopped answering).
    pub fn abandon(&mut self, message: impl Into<String>) {
        if !self.state.is_busy() {
            return;
        }
        let job_id = self.state.job_id().cloned();
        self.state = JobState::Failed {
            job_id,
            message: message.into(),
        };
    }

    /// Back to the initial state: no files, empty form, idle, no results.
    pub fn reset(&mut self) {
        info!(subsystem = "session", phase = %self.phase(), "Session reset");
        self.selection = UploadSelection::default();
        self.form = FormFields::default();
        self.state = JobState::Idle;
        self.notice = None;
    }
}
