//! Integration tests for the session state machine driven by raw server
//! payloads.
//!
//! Covers:
//! - File selection accept/reject behavior
//! - Tag prefix sanitization
//! - Submission preconditions
//! - Terminal transitions from status JSON
//! - Reset after completion

use decklens_core::{
    Error, FileSlot, JobPhase, PollDirective, SelectedFile, Session, StatusResponse,
    SubmitResponse,
};
use serde_json::json;

fn status(value: serde_json::Value) -> decklens_core::StatusUpdate {
    serde_json::from_value::<StatusResponse>(value)
        .expect("status payload parses")
        .interpret()
}

fn submitted_session() -> Session {
    let mut session = Session::new();
    session
        .select_file(FileSlot::Deck, SelectedFile::new("deck.apkg", b"PK\x03\x04".to_vec()))
        .unwrap();
    session
        .select_file(FileSlot::Study, SelectedFile::new("notes.pdf", b"%PDF-1.4".to_vec()))
        .unwrap();
    session.set_tag_prefix("Cell Bio");
    session.begin_submission().unwrap();

    let response: SubmitResponse = serde_json::from_value(json!({"task_id": "abc-123"})).unwrap();
    let job = session.submission_succeeded(response.into_outcome().unwrap());
    assert_eq!(job.unwrap().as_str(), "abc-123");
    session
}

#[test]
fn test_txt_in_deck_slot_is_rejected() {
    let mut session = Session::new();
    let err = session
        .select_file(FileSlot::Deck, SelectedFile::new("deck.txt", b"hi".to_vec()))
        .unwrap_err();

    assert!(matches!(err, Error::InvalidFile { .. }));
    assert!(session.selection().deck.is_none());
    assert_eq!(session.notice(), Some(err.to_string().as_str()));
}

#[test]
fn test_apkg_in_deck_slot_is_accepted() {
    let mut session = Session::new();
    let _ = session.select_file(FileSlot::Deck, SelectedFile::new("deck.txt", b"hi".to_vec()));
    session
        .select_file(FileSlot::Deck, SelectedFile::new("deck.apkg", b"PK\x03\x04".to_vec()))
        .unwrap();

    assert!(session.selection().deck.is_some());
    assert!(session.notice().is_none());
}

#[test]
fn test_tag_prefix_sanitized() {
    let mut session = Session::new();
    session.set_tag_prefix("My Tag!");
    assert_eq!(session.form().tag_prefix(), "My_Tag_");
}

#[test]
fn test_submission_without_files_is_rejected_and_stays_idle() {
    let mut session = Session::new();
    session.set_tag_prefix("bio");
    assert!(session.begin_submission().unwrap_err().is_validation());
    assert_eq!(session.phase(), JobPhase::Idle);
}

#[test]
fn test_completed_payload_stops_polling() {
    let mut session = submitted_session();
    assert_eq!(session.phase(), JobPhase::Processing);

    let directive = session.apply_status(status(json!({
        "status": "PROCESSING",
        "progress_data": {"progress": 55, "phase": "embedding cards"}
    })));
    assert_eq!(directive, PollDirective::Continue);
    assert_eq!(session.state().progress().unwrap().percent, 55);

    let directive = session.apply_status(status(json!({
        "status": "COMPLETED",
        "progress_data": {"progress": 100}
    })));
    assert_eq!(directive, PollDirective::Stop);
    assert_eq!(session.phase(), JobPhase::Completed);
}

#[test]
fn test_failed_payload_message_is_verbatim() {
    let mut session = submitted_session();
    let directive = session.apply_status(status(json!({
        "status": "FAILED",
        "error_message": "bad pdf"
    })));
    assert_eq!(directive, PollDirective::Stop);
    assert_eq!(session.state().error_message(), Some("bad pdf"));
}

#[test]
fn test_missing_job_id_fails_submission() {
    let mut session = Session::new();
    session
        .select_file(FileSlot::Deck, SelectedFile::new("deck.apkg", vec![]))
        .unwrap();
    session
        .select_file(FileSlot::Study, SelectedFile::new("notes.pdf", vec![]))
        .unwrap();
    session.set_tag_prefix("bio");
    session.begin_submission().unwrap();

    let response: SubmitResponse = serde_json::from_value(json!({})).unwrap();
    let err = response.into_outcome().unwrap_err();
    session.submission_failed(&err);

    assert_eq!(session.phase(), JobPhase::Failed);
    assert_eq!(
        session.state().error_message(),
        Some("Server did not return a job identifier")
    );
}

#[test]
fn test_reset_after_completion_restores_initial_state() {
    let mut session = submitted_session();
    session.apply_status(status(json!({
        "status": "COMPLETED",
        "statistics": {"total_cards": 10, "high_relevance": 4}
    })));
    assert_eq!(session.state().result().unwrap().statistics.total_cards, 10);

    session.reset();
    let fresh = Session::new();
    assert_eq!(session.phase(), fresh.phase());
    assert_eq!(session.selection(), fresh.selection());
    assert_eq!(session.form(), fresh.form());
    assert!(session.state().result().is_none());
    assert!(session.state().progress().is_none());
}
