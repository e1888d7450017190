//! Upload → poll → result flow.
//!
//! [`DeckProcessor`] drives a [`Session`] with a [`DeckApi`] and a
//! [`Poller`], and broadcasts [`FlowEvent`]s so a front end can render
//! progress without owning the processor.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use decklens_core::{
    defaults, Error, HealthResponse, JobId, JobState, PollDirective, Progress, Result,
    ResultData, Session, StatusUpdate, SubmitResponse,
};

use crate::api::DeckApi;
use crate::config::ClientConfig;
use crate::poller::{PollEvent, Poller, PollerConfig};

/// Capacity of the flow event broadcast channel.
const EVENT_BUS_CAPACITY: usize = 64;

/// Event emitted while a deck is processed.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowEvent {
    /// Inputs validated, upload started.
    Submitting,
    /// Server accepted the upload and issued a job id.
    Accepted { job_id: JobId },
    /// Job progress changed.
    Progress(Progress),
    /// A status request failed and will be retried.
    TickSkipped { error: String, consecutive: u32 },
    /// Results are available.
    Completed,
    /// The submission or the job failed.
    Failed { message: String },
    /// Session cleared.
    Reset,
}

/// Orchestrates one session against the processing API.
pub struct DeckProcessor {
    api: Arc<dyn DeckApi>,
    session: Session,
    poller: Poller,
    event_tx: broadcast::Sender<FlowEvent>,
}

impl DeckProcessor {
    pub fn new(api: Arc<dyn DeckApi>, config: &ClientConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            poller: Poller::new(api.clone(), PollerConfig::from(config)),
            session: Session::with_max_upload_bytes(config.max_upload_bytes),
            api,
            event_tx,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable access for user input (file selection, tag prefix, model).
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn state(&self) -> &JobState {
        self.session.state()
    }

    /// Subscribe to flow events.
    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.event_tx.subscribe()
    }

    /// True while a poll task is running.
    pub fn is_polling(&self) -> bool {
        self.poller.is_active()
    }

    fn emit(&self, event: FlowEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Liveness probe.
    pub async fn check_health(&self) -> Result<HealthResponse> {
        self.api.health().await
    }

    /// Validate inputs and upload them.
    ///
    /// Returns the job id being polled, or `None` when the server answered
    /// with results inline. Validation errors return before any request.
    pub async fn submit(&mut self) -> Result<Option<JobId>> {
        let request = self.session.begin_submission()?;
        let _ = self.event_tx.send(FlowEvent::Submitting);

        let outcome = self
            .api
            .submit(request)
            .await
            .and_then(SubmitResponse::into_outcome);

        match outcome {
            Ok(outcome) => match self.session.submission_succeeded(outcome) {
                Some(job_id) => {
                    self.poller.start(job_id.clone());
                    self.emit(FlowEvent::Accepted {
                        job_id: job_id.clone(),
                    });
                    Ok(Some(job_id))
                }
                None => {
                    self.emit(FlowEvent::Completed);
                    Ok(None)
                }
            },
            Err(e) => {
                self.session.submission_failed(&e);
                self.emit(FlowEvent::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Consume poll events until the job reaches a terminal state.
    pub async fn wait_for_completion(&mut self) -> &JobState {
        while self.session.state().is_busy() {
            let Some(event) = self.poller.next_event().await else {
                // The task ended without a terminal status.
                warn!(subsystem = "flow", "Poll task ended while job was still running");
                self.fail_running(defaults::LOST_CONTACT_MESSAGE);
                break;
            };

            match event {
                PollEvent::Status(update) => self.apply(update),
                PollEvent::TickFailed { error, consecutive } => {
                    self.emit(FlowEvent::TickSkipped { error, consecutive });
                }
                PollEvent::GaveUp { consecutive } => {
                    warn!(subsystem = "flow", failed_ticks = consecutive, "Abandoning job");
                    self.fail_running(defaults::LOST_CONTACT_MESSAGE);
                }
            }
        }

        self.session.state()
    }

    fn apply(&mut self, update: StatusUpdate) {
        let directive = self.session.apply_status(update);
        match self.session.state() {
            JobState::Processing { progress, .. } => {
                self.emit(FlowEvent::Progress(progress.clone()));
            }
            JobState::Completed { .. } => self.emit(FlowEvent::Completed),
            JobState::Failed { message, .. } => self.emit(FlowEvent::Failed {
                message: message.clone(),
            }),
            JobState::Idle | JobState::Submitting => {}
        }
        if directive == PollDirective::Stop {
            self.poller.stop();
        }
    }

    fn fail_running(&mut self, message: &str) {
        self.poller.stop();
        self.session.abandon(message);
        self.emit(FlowEvent::Failed {
            message: message.to_string(),
        });
    }

    /// Submit and wait. A failed job becomes [`Error::Job`].
    pub async fn run(&mut self) -> Result<&ResultData> {
        self.submit().await?;
        match self.wait_for_completion().await {
            JobState::Completed { result, .. } => Ok(result),
            JobState::Failed { message, .. } => Err(Error::Job(message.clone())),
            other => Err(Error::Internal(format!(
                "flow ended in non-terminal state {}",
                other.phase()
            ))),
        }
    }

    /// Download the processed deck of a completed job.
    pub async fn download_result(&self, dest: &Path) -> Result<u64> {
        let url = self
            .session
            .state()
            .result()
            .and_then(|r| r.download_url.as_deref())
            .ok_or_else(|| Error::InvalidInput("No processed deck to download".to_string()))?;
        debug!(subsystem = "flow", %url, "Downloading result");
        self.api.download(url, dest).await
    }

    /// Stop polling and return to the initial state.
    pub fn reset(&mut self) {
        self.poller.stop();
        self.session.reset();
        info!(subsystem = "flow", "Flow reset");
        self.emit(FlowEvent::Reset);
    }
}
