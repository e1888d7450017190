//! HTTP client for the deck processing API.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use decklens_core::{
    defaults, Error, HealthResponse, JobId, Result, SelectedFile, StatusResponse,
    SubmissionRequest, SubmitResponse,
};

use crate::config::{ClientConfig, StatusRoute};

/// Operations the processing flow needs from the server.
#[async_trait]
pub trait DeckApi: Send + Sync {
    /// Liveness probe.
    async fn health(&self) -> Result<HealthResponse>;

    /// Upload both files and the form fields.
    async fn submit(&self, request: SubmissionRequest<'_>) -> Result<SubmitResponse>;

    /// Fetch the current status of a job.
    async fn job_status(&self, job_id: &JobId) -> Result<StatusResponse>;

    /// Save the processed deck to `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

const ROUTE_UNRESOLVED: u8 = 0;
const ROUTE_JOBS: u8 = 1;
const ROUTE_UPLOAD_PROGRESS: u8 = 2;

/// [`DeckApi`] over HTTP with reqwest.
pub struct HttpDeckApi {
    client: Client,
    api_root: String,
    route: StatusRoute,
    // Route that answered under `StatusRoute::Auto`.
    resolved_route: AtomicU8,
}

impl HttpDeckApi {
    /// Create a client from configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            base_url = %config.api_root(),
            status_route = %config.status_route,
            "Initializing processing API client"
        );

        Ok(Self {
            client,
            api_root: config.api_root().to_string(),
            route: config.status_route,
            resolved_route: AtomicU8::new(ROUTE_UNRESOLVED),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path)
    }

    /// Absolute download URLs pass through; relative ones join the API root.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.api_root, url.trim_start_matches('/'))
        }
    }

    /// Route to use for the next status request.
    pub fn current_route(&self) -> StatusRoute {
        match self.route {
            StatusRoute::Auto => match self.resolved_route.load(Ordering::Relaxed) {
                ROUTE_UPLOAD_PROGRESS => StatusRoute::UploadProgress,
                ROUTE_JOBS => StatusRoute::Jobs,
                _ => StatusRoute::Auto,
            },
            fixed => fixed,
        }
    }

    fn remember_route(&self, route: StatusRoute) {
        let value = match route {
            StatusRoute::Jobs => ROUTE_JOBS,
            StatusRoute::UploadProgress => ROUTE_UPLOAD_PROGRESS,
            StatusRoute::Auto => return,
        };
        if self.route == StatusRoute::Auto
            && self.resolved_route.swap(value, Ordering::Relaxed) != value
        {
            debug!(%route, "Resolved status route");
        }
    }

    fn file_part(file: &SelectedFile) -> Result<Part> {
        Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| Error::Internal(format!("Failed to create multipart: {}", e)))
    }

    async fn get_status(&self, route: StatusRoute, job_id: &JobId) -> Result<Response> {
        let url = self.url(&route.path(job_id.as_str()));
        Ok(self.client.get(&url).send().await?)
    }
}

/// Turn a non-success response into [`Error::Server`].
///
/// The message is the server's `detail` / `error` / `message` text when the
/// body is JSON that carries one, else a plain-text body, else a generic
/// server error line.
async fn server_error(response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = extract_detail(&body)
        .or_else(|| plain_text_body(&body))
        .unwrap_or_else(|| format!("Server error: {}", status));
    Error::Server {
        status: status.as_u16(),
        message,
    }
}

/// A trimmed, length-capped body that is neither markup nor JSON.
fn plain_text_body(body: &str) -> Option<String> {
    let text = body.trim();
    if text.is_empty() || text.starts_with(['<', '{', '[']) {
        return None;
    }
    if text.chars().count() <= defaults::MAX_ERROR_BODY_CHARS {
        return Some(text.to_string());
    }
    let cut: String = text.chars().take(defaults::MAX_ERROR_BODY_CHARS).collect();
    Some(format!("{}...", cut.trim_end()))
}

/// Pull a human-readable message out of an error body.
pub fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "error", "message", "error_message"]
        .iter()
        .find_map(|key| match value.get(key)? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            // FastAPI-style validation errors: [{"loc": [...], "msg": "..."}]
            serde_json::Value::Array(items) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect();
                (!messages.is_empty()).then(|| messages.join("; "))
            }
            _ => None,
        })
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(server_error(response).await);
    }
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl DeckApi for HttpDeckApi {
    #[instrument(skip(self), fields(subsystem = "client", op = "health"))]
    async fn health(&self) -> Result<HealthResponse> {
        let response = self
            .client
            .get(self.url(defaults::HEALTH_PATH))
            .timeout(Duration::from_secs(defaults::HEALTH_TIMEOUT_SECS))
            .send()
            .await?;
        let health: HealthResponse = parse_json(response).await?;
        debug!(message = %health.message, "Health check passed");
        Ok(health)
    }

    #[instrument(
        skip(self, request),
        fields(
            subsystem = "client",
            op = "submit",
            model = %request.model,
            deck_bytes = request.deck.size(),
            study_bytes = request.study.size()
        )
    )]
    async fn submit(&self, request: SubmissionRequest<'_>) -> Result<SubmitResponse> {
        let start = Instant::now();
        let form = Form::new()
            .part(defaults::FIELD_DECK, Self::file_part(request.deck)?)
            .part(defaults::FIELD_STUDY, Self::file_part(request.study)?)
            .text(defaults::FIELD_TAG, request.tag_prefix.to_string())
            .text(defaults::FIELD_MODEL, request.model.id().to_string());

        let response = self
            .client
            .post(self.url(defaults::PROCESS_DECK_PATH))
            .multipart(form)
            .send()
            .await?;

        let submitted: SubmitResponse = parse_json(response).await?;
        info!(
            task_id = ?submitted.task_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Deck submitted"
        );
        Ok(submitted)
    }

    #[instrument(skip(self, job_id), fields(subsystem = "client", op = "job_status", job_id = %job_id))]
    async fn job_status(&self, job_id: &JobId) -> Result<StatusResponse> {
        let route = self.current_route();
        let response = self.get_status(route, job_id).await?;

        let response = if route == StatusRoute::Auto && response.status() == StatusCode::NOT_FOUND
        {
            warn!("Jobs status route returned 404, trying upload-progress route");
            let fallback = self.get_status(StatusRoute::UploadProgress, job_id).await?;
            if fallback.status().is_success() {
                self.remember_route(StatusRoute::UploadProgress);
            }
            fallback
        } else {
            if route == StatusRoute::Auto && response.status().is_success() {
                self.remember_route(StatusRoute::Jobs);
            }
            response
        };

        parse_json(response).await
    }

    #[instrument(skip(self, dest), fields(subsystem = "client", op = "download"))]
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let url = self.resolve_url(url);
        let mut response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(server_error(response).await);
        }

        // Stream beside the destination; only a complete archive is renamed
        // into place.
        let partial = partial_path(dest);
        let written = match write_body(&mut response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                warn!(error = %e, path = %partial.display(), "Download interrupted");
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        if let Err(e) = tokio::fs::rename(&partial, dest).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }

        info!(bytes = written, path = %dest.display(), "Downloaded processed deck");
        Ok(written)
    }
}

/// `deck.apkg` -> `deck.apkg.part` in the same directory.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

async fn write_body(response: &mut Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
