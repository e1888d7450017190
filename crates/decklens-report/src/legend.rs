//! Legend highlight state for the relevance charts.

use serde::Serialize;

use decklens_core::{defaults, RelevanceBand};

/// Which band, if any, the user has highlighted.
///
/// Presentation state only; it never touches the result data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LegendState {
    selected: Option<RelevanceBand>,
}

impl LegendState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highlight `band`, or clear the highlight if it is already selected.
    pub fn toggle(&mut self, band: RelevanceBand) {
        self.selected = if self.selected == Some(band) {
            None
        } else {
            Some(band)
        };
    }

    pub fn selected(&self) -> Option<RelevanceBand> {
        self.selected
    }

    pub fn clear(&mut self) {
        self.selected = None;
    }

    /// Full opacity for the selected band (or every band when nothing is
    /// selected), dimmed otherwise.
    pub fn opacity(&self, band: RelevanceBand) -> f32 {
        if self.is_dimmed(band) {
            defaults::DIMMED_OPACITY
        } else {
            1.0
        }
    }

    pub fn is_dimmed(&self, band: RelevanceBand) -> bool {
        self.selected.is_some_and(|selected| selected != band)
    }
}
