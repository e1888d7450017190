//! Core data models for decklens.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::validation::{detect_content_type, sanitize_tag_prefix};

// =============================================================================
// UPLOADS
// =============================================================================

/// Upload slot a file is offered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSlot {
    /// Anki deck archive.
    Deck,
    /// PDF study material.
    Study,
}

impl FileSlot {
    /// Extension (without the dot) accepted by this slot.
    pub fn expected_extension(self) -> &'static str {
        match self {
            Self::Deck => defaults::DECK_EXTENSION,
            Self::Study => defaults::STUDY_EXTENSION,
        }
    }

    /// Multipart field name used when submitting this slot.
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Deck => defaults::FIELD_DECK,
            Self::Study => defaults::FIELD_STUDY,
        }
    }
}

impl fmt::Display for FileSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deck => write!(f, "deck"),
            Self::Study => write!(f, "study material"),
        }
    }
}

/// A user-supplied file held in memory until submission.
#[derive(Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl SelectedFile {
    /// Wrap raw bytes, detecting the content type from magic bytes.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = detect_content_type(&file_name, &bytes);
        Self {
            file_name,
            bytes,
            content_type,
        }
    }

    /// Read a file from disk. The stored name is the final path component.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = Self::name_of(path)?;
        let bytes = std::fs::read(path)?;
        Ok(Self::new(file_name, bytes))
    }

    /// Final path component as the stored file name.
    pub fn name_of(path: &Path) -> Result<String> {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidInput(format!("Not a file path: {}", path.display())))
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

// Payloads can be hundreds of megabytes; keep them out of debug output.
impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("file_name", &self.file_name)
            .field("size", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// The two files required for a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSelection {
    pub deck: Option<SelectedFile>,
    pub study: Option<SelectedFile>,
}

impl UploadSelection {
    /// File currently held in a slot.
    pub fn get(&self, slot: FileSlot) -> Option<&SelectedFile> {
        match slot {
            FileSlot::Deck => self.deck.as_ref(),
            FileSlot::Study => self.study.as_ref(),
        }
    }

    pub(crate) fn set(&mut self, slot: FileSlot, file: SelectedFile) {
        match slot {
            FileSlot::Deck => self.deck = Some(file),
            FileSlot::Study => self.study = Some(file),
        }
    }

    /// True when both slots are filled.
    pub fn is_complete(&self) -> bool {
        self.deck.is_some() && self.study.is_some()
    }
}

// =============================================================================
// FORM
// =============================================================================

/// Embedding models the processing server accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddingModel {
    /// Small general-purpose sentence encoder.
    #[default]
    #[serde(rename = "all-MiniLM-L6-v2")]
    AllMiniLmL6V2,
    /// Larger general-purpose sentence encoder.
    #[serde(rename = "all-mpnet-base-v2")]
    AllMpnetBaseV2,
    /// Encoder tuned for question/passage retrieval.
    #[serde(rename = "multi-qa-MiniLM-L6-cos-v1")]
    MultiQaMiniLmL6CosV1,
    /// Multilingual paraphrase encoder.
    #[serde(rename = "paraphrase-multilingual-MiniLM-L12-v2")]
    ParaphraseMultilingualMiniLmL12V2,
}

impl EmbeddingModel {
    /// Every selectable model, in display order.
    pub const ALL: [EmbeddingModel; 4] = [
        Self::AllMiniLmL6V2,
        Self::AllMpnetBaseV2,
        Self::MultiQaMiniLmL6CosV1,
        Self::ParaphraseMultilingualMiniLmL12V2,
    ];

    /// Identifier sent to the server.
    pub fn id(self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
            Self::AllMpnetBaseV2 => "all-mpnet-base-v2",
            Self::MultiQaMiniLmL6CosV1 => "multi-qa-MiniLM-L6-cos-v1",
            Self::ParaphraseMultilingualMiniLmL12V2 => "paraphrase-multilingual-MiniLM-L12-v2",
        }
    }

    /// Human-readable description for pickers.
    pub fn description(self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "Fast, good general quality (default)",
            Self::AllMpnetBaseV2 => "Slower, best general quality",
            Self::MultiQaMiniLmL6CosV1 => "Tuned for question/answer style cards",
            Self::ParaphraseMultilingualMiniLmL12V2 => "Decks and documents in other languages",
        }
    }
}

impl FromStr for EmbeddingModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.id().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown embedding model: {}", s)))
    }
}

impl fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Form inputs besides the files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    tag_prefix: String,
    pub model: EmbeddingModel,
}

impl FormFields {
    /// Sanitized tag prefix.
    pub fn tag_prefix(&self) -> &str {
        &self.tag_prefix
    }

    /// Replace the tag prefix; the stored value is always sanitized.
    pub fn set_tag_prefix(&mut self, raw: &str) {
        self.tag_prefix = sanitize_tag_prefix(raw);
    }
}

// =============================================================================
// JOB STATE
// =============================================================================

/// Opaque job identifier issued by the processing server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job progress as last reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Progress {
    /// 0 to 100 inclusive.
    pub percent: u8,
    /// Server-reported phase name ("parsing deck", "embedding", ...).
    pub phase: Option<String>,
    /// Never negative; `None` when the server gives no estimate.
    pub estimated_seconds_remaining: Option<f64>,
    /// Seconds since the job id was received.
    pub elapsed_seconds: f64,
}

/// Coarse phase of the upload/processing flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Idle,
    Submitting,
    Processing,
    Completed,
    Failed,
}

impl JobPhase {
    /// Completed and Failed end the flow.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Submitting => write!(f, "submitting"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// State of the current submission. Each variant carries only the data that
/// is meaningful in that state.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum JobState {
    #[default]
    Idle,
    Submitting,
    Processing {
        job_id: JobId,
        progress: Progress,
        started_at: DateTime<Utc>,
    },
    Completed {
        job_id: Option<JobId>,
        result: Box<ResultData>,
    },
    Failed {
        job_id: Option<JobId>,
        message: String,
    },
}

impl JobState {
    pub fn phase(&self) -> JobPhase {
        match self {
            Self::Idle => JobPhase::Idle,
            Self::Submitting => JobPhase::Submitting,
            Self::Processing { .. } => JobPhase::Processing,
            Self::Completed { .. } => JobPhase::Completed,
            Self::Failed { .. } => JobPhase::Failed,
        }
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::Processing { job_id, .. } => Some(job_id),
            Self::Completed { job_id, .. } | Self::Failed { job_id, .. } => job_id.as_ref(),
            Self::Idle | Self::Submitting => None,
        }
    }

    /// Progress of a running job.
    pub fn progress(&self) -> Option<&Progress> {
        match self {
            Self::Processing { progress, .. } => Some(progress),
            _ => None,
        }
    }

    /// Result data of a completed job.
    pub fn result(&self) -> Option<&ResultData> {
        match self {
            Self::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Failure message of a failed job.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Submitting or processing; a new submission must wait.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Submitting | Self::Processing { .. })
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Relevance band assigned to a card by its similarity to the study material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceBand {
    #[serde(alias = "High", alias = "HIGH", alias = "high_relevance")]
    High,
    #[serde(alias = "Medium", alias = "MEDIUM", alias = "medium_relevance")]
    Medium,
    #[serde(alias = "Low", alias = "LOW", alias = "low_relevance")]
    Low,
}

impl RelevanceBand {
    /// Bands from most to least relevant.
    pub const ALL: [RelevanceBand; 3] = [Self::High, Self::Medium, Self::Low];

    /// Band for a similarity score. Boundaries belong to the upper band.
    pub fn classify(similarity: f64) -> Self {
        if similarity >= defaults::HIGH_RELEVANCE_THRESHOLD {
            Self::High
        } else if similarity >= defaults::MEDIUM_RELEVANCE_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Suffix appended to the tag prefix.
    pub fn tag_suffix(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Display label.
    pub fn label(self) -> &'static str {
        match self {
            Self::High => "High relevance",
            Self::Medium => "Medium relevance",
            Self::Low => "Low relevance",
        }
    }
}

impl fmt::Display for RelevanceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_suffix())
    }
}

/// Aggregate statistics for a processed deck.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statistics {
    #[serde(alias = "total", alias = "card_count")]
    pub total_cards: u64,
    #[serde(alias = "high_relevance_count", alias = "high")]
    pub high_relevance: u64,
    #[serde(alias = "medium_relevance_count", alias = "medium")]
    pub medium_relevance: u64,
    #[serde(alias = "low_relevance_count", alias = "low")]
    pub low_relevance: u64,
    pub deck_name: Option<String>,
    pub note_count: Option<u64>,
    #[serde(alias = "pdf_pages")]
    pub study_pages: Option<u64>,
    pub average_similarity: Option<f64>,
}

impl Statistics {
    /// Card count in a band.
    pub fn count(&self, band: RelevanceBand) -> u64 {
        match band {
            RelevanceBand::High => self.high_relevance,
            RelevanceBand::Medium => self.medium_relevance,
            RelevanceBand::Low => self.low_relevance,
        }
    }

    /// Denominator for band shares: `total_cards`, or the band sum when the
    /// server left the total out.
    pub fn effective_total(&self) -> u64 {
        match self.total_cards {
            0 => RelevanceBand::ALL.iter().map(|b| self.count(*b)).sum(),
            n => n,
        }
    }
}

/// One bar of the relevance distribution chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarEntry {
    #[serde(alias = "category", alias = "label")]
    pub band: RelevanceBand,
    pub count: u64,
    #[serde(default)]
    pub percentage: Option<f64>,
}

/// A card projected into the 2-D embedding plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityPoint {
    pub x: f64,
    pub y: f64,
    pub similarity: f64,
    #[serde(default, alias = "card_front", alias = "text")]
    pub label: Option<String>,
}

/// Projected position of the study document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub label: Option<String>,
}

/// Chart-ready arrays supplied by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Visualizations {
    #[serde(alias = "relevance_chart")]
    pub relevance_distribution: Vec<BarEntry>,
    #[serde(alias = "scatter_points", alias = "embedding_points")]
    pub similarity_points: Vec<SimilarityPoint>,
    #[serde(alias = "document_point", alias = "pdf_point")]
    pub reference_point: Option<ReferencePoint>,
}

/// Server-side timings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingMetrics {
    #[serde(alias = "total_time", alias = "processing_time")]
    pub total_time_seconds: Option<f64>,
    #[serde(alias = "parsing_time")]
    pub parsing_time_seconds: Option<f64>,
    #[serde(alias = "embedding_time")]
    pub embedding_time_seconds: Option<f64>,
    pub cards_per_second: Option<f64>,
}

/// Everything the server returns for a completed job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultData {
    pub statistics: Statistics,
    pub visualizations: Visualizations,
    pub processing_metrics: Option<ProcessingMetrics>,
    pub download_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effective_total_falls_back_to_band_sum() {
        let stats = Statistics {
            high_relevance: 3,
            medium_relevance: 1,
            ..Statistics::default()
        };
        assert_eq!(stats.effective_total(), 4);

        let stats = Statistics {
            total_cards: 10,
            ..stats
        };
        assert_eq!(stats.effective_total(), 10);
    }

    #[test]
    fn test_file_slot_extensions() {
        assert_eq!(FileSlot::Deck.expected_extension(), "apkg");
        assert_eq!(FileSlot::Study.expected_extension(), "pdf");
        assert_eq!(FileSlot::Deck.field_name(), "anki_file");
        assert_eq!(FileSlot::Study.field_name(), "study_material");
    }

    #[test]
    fn test_selected_file_debug_omits_bytes() {
        let file = SelectedFile::new("deck.apkg", vec![0u8; 4096]);
        let debug = format!("{:?}", file);
        assert!(debug.contains("deck.apkg"));
        assert!(debug.contains("4096"));
        assert!(!debug.contains("[0, 0"));
    }

    #[test]
    fn test_upload_selection_completeness() {
        let mut selection = UploadSelection::default();
        assert!(!selection.is_complete());
        selection.set(FileSlot::Deck, SelectedFile::new("a.apkg", vec![1]));
        assert!(!selection.is_complete());
        selection.set(FileSlot::Study, SelectedFile::new("b.pdf", vec![2]));
        assert!(selection.is_complete());
        assert_eq!(selection.get(FileSlot::Study).unwrap().file_name, "b.pdf");
    }

    #[test]
    fn test_embedding_model_parse_roundtrip() {
        for model in EmbeddingModel::ALL {
            assert_eq!(model.id().parse::<EmbeddingModel>().unwrap(), model);
        }
        assert_eq!(
            "ALL-MINILM-L6-V2".parse::<EmbeddingModel>().unwrap(),
            EmbeddingModel::AllMiniLmL6V2
        );
        assert!("word2vec".parse::<EmbeddingModel>().is_err());
    }

    #[test]
    fn test_embedding_model_serializes_as_id() {
        let value = serde_json::to_value(EmbeddingModel::AllMpnetBaseV2).unwrap();
        assert_eq!(value, json!("all-mpnet-base-v2"));
    }

    #[test]
    fn test_form_fields_sanitize_on_set() {
        let mut form = FormFields::default();
        form.set_tag_prefix("My Tag!");
        assert_eq!(form.tag_prefix(), "My_Tag_");
        assert_eq!(form.model, EmbeddingModel::AllMiniLmL6V2);
    }

    #[test]
    fn test_relevance_band_thresholds() {
        assert_eq!(RelevanceBand::classify(0.95), RelevanceBand::High);
        assert_eq!(RelevanceBand::classify(0.8), RelevanceBand::High);
        assert_eq!(RelevanceBand::classify(0.79), RelevanceBand::Medium);
        assert_eq!(RelevanceBand::classify(0.5), RelevanceBand::Medium);
        assert_eq!(RelevanceBand::classify(0.49), RelevanceBand::Low);
        assert_eq!(RelevanceBand::classify(-0.2), RelevanceBand::Low);
    }

    #[test]
    fn test_job_state_accessors() {
        let state = JobState::Failed {
            job_id: Some(JobId::new("abc")),
            message: "bad pdf".to_string(),
        };
        assert_eq!(state.phase(), JobPhase::Failed);
        assert_eq!(state.error_message(), Some("bad pdf"));
        assert_eq!(state.job_id().map(JobId::as_str), Some("abc"));
        assert!(state.result().is_none());
        assert!(!state.is_busy());
        assert!(JobState::Submitting.is_busy());
        assert!(JobPhase::Completed.is_terminal());
        assert!(!JobPhase::Processing.is_terminal());
    }

    #[test]
    fn test_result_data_deserializes_server_aliases() {
        let raw = json!({
            "statistics": {
                "total": 1200,
                "high_relevance_count": 300,
                "medium_relevance_count": 500,
                "low_relevance_count": 400,
                "deck_name": "Biology"
            },
            "visualizations": {
                "relevance_distribution": [
                    {"category": "High", "count": 300, "percentage": 25.0}
                ],
                "scatter_points": [
                    {"x": 0.1, "y": 0.2, "similarity": 0.91, "card_front": "Mitochondria"}
                ],
                "document_point": {"x": 0.0, "y": 0.0}
            },
            "processing_metrics": {"total_time": 12.345},
            "download_url": "/api/download/abc/"
        });
        let data: ResultData = serde_json::from_value(raw).unwrap();
        assert_eq!(data.statistics.total_cards, 1200);
        assert_eq!(data.statistics.count(RelevanceBand::Medium), 500);
        assert_eq!(
            data.visualizations.relevance_distribution[0].band,
            RelevanceBand::High
        );
        assert_eq!(
            data.visualizations.similarity_points[0].label.as_deref(),
            Some("Mitochondria")
        );
        assert!(data.visualizations.reference_point.is_some());
        assert_eq!(
            data.processing_metrics.unwrap().total_time_seconds,
            Some(12.345)
        );
    }

    #[test]
    fn test_result_data_tolerates_missing_sections() {
        let data: ResultData = serde_json::from_value(json!({})).unwrap();
        assert_eq!(data, ResultData::default());
    }
}
