//! Poller lifecycle tests with a scripted in-memory API and paused time.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use decklens_client::{DeckApi, PollEvent, PollHandle, Poller, PollerConfig};
use decklens_core::{
    Error, HealthResponse, JobId, Result, StatusResponse, StatusUpdate, SubmissionRequest,
    SubmitResponse,
};
use serde_json::json;

/// Answers status requests from a script; once the script runs out it keeps
/// reporting an in-progress job.
struct ScriptedApi {
    script: Mutex<VecDeque<Result<StatusResponse>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedApi {
    fn new(script: Vec<Result<StatusResponse>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::default(),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn payload(value: serde_json::Value) -> Result<StatusResponse> {
    Ok(serde_json::from_value(value).unwrap())
}

fn processing(percent: u8) -> Result<StatusResponse> {
    payload(json!({"status": "PROCESSING", "progress": percent}))
}

fn network_error() -> Result<StatusResponse> {
    Err(Error::Request("connection refused".to_string()))
}

#[async_trait]
impl DeckApi for ScriptedApi {
    async fn health(&self) -> Result<HealthResponse> {
        Ok(HealthResponse {
            message: "ok".to_string(),
        })
    }

    async fn submit(&self, _request: SubmissionRequest<'_>) -> Result<SubmitResponse> {
        Err(Error::Internal("not scripted".to_string()))
    }

    async fn job_status(&self, job_id: &JobId) -> Result<StatusResponse> {
        self.calls.lock().unwrap().push(job_id.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| processing(50))
    }

    async fn download(&self, _url: &str, _dest: &Path) -> Result<u64> {
        Ok(0)
    }
}

fn config(max_errors: Option<u32>) -> PollerConfig {
    PollerConfig {
        interval: Duration::from_millis(1500),
        max_consecutive_errors: max_errors,
    }
}

async fn drain(handle: &mut PollHandle) -> Vec<PollEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_polling_stops_after_completed() {
    let api = ScriptedApi::new(vec![
        processing(10),
        processing(60),
        payload(json!({"status": "COMPLETED", "statistics": {"total_cards": 3}})),
    ]);
    let mut handle = PollHandle::spawn(api.clone(), JobId::new("job-1"), config(None));

    let events = drain(&mut handle).await;
    assert_eq!(events.len(), 3);
    assert!(matches!(
        events.last(),
        Some(PollEvent::Status(StatusUpdate::Completed(_)))
    ));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.calls().len(), 3);
    assert!(!handle.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_polling_stops_after_failed() {
    let api = ScriptedApi::new(vec![payload(
        json!({"status": "FAILED", "error_message": "bad pdf"}),
    )]);
    let mut handle = PollHandle::spawn(api.clone(), JobId::new("job-1"), config(None));

    let events = drain(&mut handle).await;
    assert_eq!(
        events,
        vec![PollEvent::Status(StatusUpdate::Failed("bad pdf".to_string()))]
    );
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_errors_skip_the_tick() {
    let api = ScriptedApi::new(vec![
        network_error(),
        Err(Error::Server {
            status: 502,
            message: "Server error: 502 Bad Gateway".to_string(),
        }),
        processing(70),
        network_error(),
        payload(json!({"progress": 100})),
    ]);
    let mut handle = PollHandle::spawn(api.clone(), JobId::new("job-1"), config(None));

    let events = drain(&mut handle).await;
    let consecutive: Vec<Option<u32>> = events
        .iter()
        .map(|e| match e {
            PollEvent::TickFailed { consecutive, .. } => Some(*consecutive),
            _ => None,
        })
        .collect();

    // The failure counter resets after a good response.
    assert_eq!(consecutive, vec![Some(1), Some(2), None, Some(1), None]);
    assert!(matches!(
        events.last(),
        Some(PollEvent::Status(StatusUpdate::Completed(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_error_cap_gives_up() {
    let api = ScriptedApi::new(vec![network_error(), network_error(), network_error()]);
    let mut handle = PollHandle::spawn(api.clone(), JobId::new("job-1"), config(Some(2)));

    let events = drain(&mut handle).await;
    assert_eq!(events.len(), 3);
    assert_eq!(events[2], PollEvent::GaveUp { consecutive: 2 });
    assert_eq!(api.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_requests_follow_the_interval() {
    let api = ScriptedApi::new(vec![]);
    let _handle = PollHandle::spawn(api.clone(), JobId::new("job-1"), config(None));

    // First tick fires immediately.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(api.calls().len(), 1);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(api.calls().len(), 2);

    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(api.calls().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_stop_prevents_further_requests() {
    let api = ScriptedApi::new(vec![]);
    let mut handle = PollHandle::spawn(api.clone(), JobId::new("job-1"), config(None));

    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.stop();
    assert!(!handle.is_active());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(api.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_polling() {
    let api = ScriptedApi::new(vec![]);
    let handle = PollHandle::spawn(api.clone(), JobId::new("job-1"), config(None));

    tokio::time::sleep(Duration::from_millis(10)).await;
    drop(handle);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(api.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_starting_new_job_replaces_previous_task() {
    let api = ScriptedApi::new(vec![]);
    let mut poller = Poller::new(api.clone(), config(None));

    poller.start(JobId::new("first"));
    tokio::time::sleep(Duration::from_millis(10)).await;

    poller.start(JobId::new("second"));
    assert_eq!(poller.job_id().map(JobId::as_str), Some("second"));
    tokio::time::sleep(Duration::from_secs(5)).await;

    let calls = api.calls();
    assert_eq!(calls.iter().filter(|id| *id == "first").count(), 1);
    assert!(calls.len() > 2);
    assert!(calls[1..].iter().all(|id| id == "second"));

    poller.stop();
    assert!(!poller.is_active());
    assert!(poller.next_event().await.is_none());
}
