//! Centralized default constants for decklens.
//!
//! **This module is the single source of truth** for shared default values.
//! Client, report, and CLI crates reference these constants instead of
//! defining their own magic numbers.

// =============================================================================
// API
// =============================================================================

/// Default base URL of the processing API (local development server).
pub const API_URL: &str = "http://localhost:8000";

/// Liveness probe path.
pub const HEALTH_PATH: &str = "/api/health/";

/// Deck submission path.
pub const PROCESS_DECK_PATH: &str = "/api/process-deck/";

/// Timeout for a single HTTP request (seconds). Uploads can be large.
pub const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Timeout for the health probe (seconds).
pub const HEALTH_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// MULTIPART FIELDS
// =============================================================================

/// Multipart field carrying the deck archive.
pub const FIELD_DECK: &str = "anki_file";

/// Multipart field carrying the study document.
pub const FIELD_STUDY: &str = "study_material";

/// Multipart field carrying the sanitized tag prefix.
pub const FIELD_TAG: &str = "custom_tag";

/// Multipart field carrying the embedding model identifier.
pub const FIELD_MODEL: &str = "model";

// =============================================================================
// POLLING
// =============================================================================

/// Interval between job status requests (milliseconds).
pub const POLL_INTERVAL_MS: u64 = 1500;

/// Message shown when a job fails without an explanation.
pub const GENERIC_FAILURE_MESSAGE: &str = "Processing failed";

/// Message shown when the consecutive error cap is reached.
pub const LOST_CONTACT_MESSAGE: &str = "Lost contact with the processing server";

// =============================================================================
// UPLOADS
// =============================================================================

/// Required extension for the deck slot.
pub const DECK_EXTENSION: &str = "apkg";

/// Required extension for the study material slot.
pub const STUDY_EXTENSION: &str = "pdf";

/// Maximum accepted size for a single upload (200 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 200 * 1024 * 1024;

/// Plain-text error bodies longer than this are cut before display.
pub const MAX_ERROR_BODY_CHARS: usize = 300;

// =============================================================================
// RELEVANCE
// =============================================================================

/// Cards at or above this similarity are highly relevant.
pub const HIGH_RELEVANCE_THRESHOLD: f64 = 0.8;

/// Cards at or above this similarity (and below the high threshold) are
/// moderately relevant.
pub const MEDIUM_RELEVANCE_THRESHOLD: f64 = 0.5;

/// Opacity of legend bands that are not highlighted.
pub const DIMMED_OPACITY: f32 = 0.3;
