//! Cancellable fixed-interval job status poller.
//!
//! [`Poller`] owns at most one running poll task. Starting a new job stops
//! the previous task first. The task ends on its own after delivering a
//! terminal status, when [`PollHandle::stop`] is called, or when the handle
//! is dropped. Requests never overlap: the next tick waits for the previous
//! request to finish.
//!
//! Error policy: any failed status request (transport, non-success status,
//! malformed body) skips the tick and is retried on the next one. Only an
//! explicit failure payload ends the job. An optional cap on consecutive
//! failed ticks turns a long outage into [`PollEvent::GaveUp`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};

use decklens_core::{JobId, StatusUpdate};

use crate::api::DeckApi;
use crate::config::ClientConfig;

/// Capacity of the event channel between the poll task and its consumer.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_consecutive_errors: Option<u32>,
}

impl From<&ClientConfig> for PollerConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_consecutive_errors: config.poll_max_consecutive_errors,
        }
    }
}

/// Event emitted by a poll task.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// A status response arrived.
    Status(StatusUpdate),
    /// A status request failed; the tick was skipped.
    TickFailed { error: String, consecutive: u32 },
    /// The consecutive failure cap was reached; the task has stopped.
    GaveUp { consecutive: u32 },
}

/// Handle to one running poll task.
pub struct PollHandle {
    job_id: JobId,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    events: mpsc::Receiver<PollEvent>,
}

impl PollHandle {
    /// Spawn a poll task for `job_id`.
    pub fn spawn(api: Arc<dyn DeckApi>, job_id: JobId, config: PollerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (event_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let span = tracing::info_span!("poll", subsystem = "poller", job_id = %job_id);
        let task = tokio::spawn(
            run_poll_loop(api, job_id.clone(), config, shutdown_rx, event_tx).instrument(span),
        );

        Self {
            job_id,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
            events,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Next event, or `None` once the task has ended and the queue is drained.
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        self.events.recv().await
    }

    /// True while the task is still running.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop polling. No status request is issued after this returns; an
    /// in-flight request is abandoned.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                debug!(job_id = %self.job_id, "Stopping poll task");
            }
            task.abort();
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_poll_loop(
    api: Arc<dyn DeckApi>,
    job_id: JobId,
    config: PollerConfig,
    mut shutdown_rx: oneshot::Receiver<()>,
    event_tx: mpsc::Sender<PollEvent>,
) {
    info!(interval_ms = config.interval.as_millis() as u64, "Polling started");

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_failures = 0u32;

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = &mut shutdown_rx => break,
            result = api.job_status(&job_id) => result,
        };

        let event = match result {
            Ok(response) => {
                consecutive_failures = 0;
                PollEvent::Status(response.interpret())
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(error = %e, failed_ticks = consecutive_failures, "Status request failed, retrying next tick");
                PollEvent::TickFailed {
                    error: e.to_string(),
                    consecutive: consecutive_failures,
                }
            }
        };

        let terminal = matches!(&event, PollEvent::Status(update) if update.is_terminal());
        if event_tx.send(event).await.is_err() {
            debug!("Poll consumer went away");
            break;
        }
        if terminal {
            break;
        }

        if config
            .max_consecutive_errors
            .is_some_and(|max| consecutive_failures >= max)
        {
            warn!(failed_ticks = consecutive_failures, "Giving up on job status");
            let _ = event_tx
                .send(PollEvent::GaveUp {
                    consecutive: consecutive_failures,
                })
                .await;
            break;
        }
    }

    info!("Polling stopped");
}

/// Slot holding at most one active [`PollHandle`].
pub struct Poller {
    api: Arc<dyn DeckApi>,
    config: PollerConfig,
    active: Option<PollHandle>,
}

impl Poller {
    pub fn new(api: Arc<dyn DeckApi>, config: PollerConfig) -> Self {
        Self {
            api,
            config,
            active: None,
        }
    }

    /// Start polling `job_id`, stopping any previous task first.
    pub fn start(&mut self, job_id: JobId) -> &mut PollHandle {
        self.stop();
        let handle = PollHandle::spawn(self.api.clone(), job_id, self.config);
        self.active.insert(handle)
    }

    /// Stop and discard the active task, if any.
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.active.take() {
            handle.stop();
        }
    }

    /// True while a task is running.
    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(PollHandle::is_active)
    }

    /// Job of the current task.
    pub fn job_id(&self) -> Option<&JobId> {
        self.active.as_ref().map(PollHandle::job_id)
    }

    /// Next event from the active task; `None` when there is none or it ended.
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        match self.active.as_mut() {
            Some(handle) => handle.next_event().await,
            None => None,
        }
    }
}
