//! # decklens-report
//!
//! Presentation of a completed job: number formatting, chart models for the
//! relevance bar chart and the similarity scatter plot, legend highlight
//! state, and a plain-text report for terminals.
//!
//! Everything here is a pure function of [`decklens_core::ResultData`].

pub mod charts;
pub mod format;
pub mod legend;
pub mod text;

pub use charts::{Bar, BarChart, BarSource, Bounds, ScatterPlot};
pub use format::{format_percent, format_seconds, group_thousands};
pub use legend::LegendState;
pub use text::{render_report, ReportOptions};
