//! # decklens-core
//!
//! Core types, validation, and the job state machine for decklens, a client
//! that scores Anki deck cards against a study document through a remote
//! processing API.
//!
//! This crate is transport-agnostic: it validates user input, interprets
//! server payloads, and tracks the state of one submission. HTTP lives in
//! `decklens-client`, presentation in `decklens-report`.

pub mod defaults;
pub mod error;
pub mod models;
pub mod responses;
pub mod session;
pub mod validation;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use responses::{
    HealthResponse, ProgressData, ProgressReport, StatusResponse, StatusUpdate, SubmitOutcome,
    SubmitResponse,
};
pub use session::{PollDirective, Session, SubmissionRequest};
pub use validation::{relevance_tag, sanitize_tag_prefix};
