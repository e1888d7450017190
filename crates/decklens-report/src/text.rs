//! Plain-text result report for terminals.
//!
//! Output is a pure function of the inputs: the same result and options
//! always render the same string.

use tracing::debug;

use decklens_core::{RelevanceBand, ResultData};

use crate::charts::{BarChart, Bounds, ScatterPlot};
use crate::format::{
    format_percent, format_seconds, format_similarity, group_thousands, percentage,
};
use crate::legend::LegendState;

/// Layout options for [`render_report`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportOptions {
    /// Width of the longest bar in characters.
    pub bar_width: usize,
    /// Scatter grid columns.
    pub grid_width: usize,
    /// Scatter grid rows.
    pub grid_height: usize,
    /// Highlighted band; dimmed bands are drawn with a fainter glyph.
    pub legend: LegendState,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            bar_width: 40,
            grid_width: 60,
            grid_height: 20,
            legend: LegendState::default(),
        }
    }
}

const BAR_GLYPH: char = '#';
const DIMMED_BAR_GLYPH: char = '.';
const REFERENCE_GLYPH: char = '*';
const DIMMED_POINT_GLYPH: char = '.';

fn point_glyph(band: RelevanceBand) -> char {
    match band {
        RelevanceBand::High => 'H',
        RelevanceBand::Medium => 'M',
        RelevanceBand::Low => 'L',
    }
}

/// Render the full report: summary, bar chart, scatter plot.
pub fn render_report(result: &ResultData, options: &ReportOptions) -> String {
    let mut lines = render_summary(result);

    lines.push(String::new());
    lines.push("Relevance distribution".to_string());
    lines.extend(render_bar_chart(&BarChart::from_result(result), options));

    let plot = ScatterPlot::from_result(result);
    if !plot.is_empty() {
        lines.push(String::new());
        lines.push("Similarity map".to_string());
        lines.extend(render_scatter(&plot, options));
    }

    lines.join("\n")
}

/// Key/value summary of statistics and timings.
pub fn render_summary(result: &ResultData) -> Vec<String> {
    let stats = &result.statistics;
    let mut rows: Vec<(&str, String)> = Vec::new();

    if let Some(name) = stats.deck_name.as_deref() {
        rows.push(("Deck", name.to_string()));
    }
    let total = stats.effective_total();
    rows.push(("Total cards", group_thousands(total)));
    if let Some(notes) = stats.note_count {
        rows.push(("Notes", group_thousands(notes)));
    }
    if let Some(pages) = stats.study_pages {
        rows.push(("Study pages", group_thousands(pages)));
    }
    for band in RelevanceBand::ALL {
        let count = stats.count(band);
        let share = percentage(count, total);
        rows.push((
            band.label(),
            format!("{} ({})", group_thousands(count), format_percent(share)),
        ));
    }
    if let Some(avg) = stats.average_similarity {
        rows.push(("Average similarity", format_similarity(avg)));
    }

    if let Some(metrics) = &result.processing_metrics {
        let timings = [
            ("Processing time", metrics.total_time_seconds),
            ("Parsing time", metrics.parsing_time_seconds),
            ("Embedding time", metrics.embedding_time_seconds),
        ];
        for (label, value) in timings {
            if let Some(seconds) = value {
                rows.push((label, format_seconds(seconds)));
            }
        }
        if let Some(rate) = metrics.cards_per_second.filter(|r| r.is_finite()) {
            rows.push(("Cards per second", format!("{:.1}", rate)));
        }
    }

    let key_width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    rows.into_iter()
        .map(|(key, value)| format!("{:<width$}  {}", key, value, width = key_width))
        .collect()
}

/// Horizontal bars scaled to the largest count.
pub fn render_bar_chart(chart: &BarChart, options: &ReportOptions) -> Vec<String> {
    let max = chart.max_count();
    let label_width = chart.bars.iter().map(|b| b.label.len()).max().unwrap_or(0);

    chart
        .bars
        .iter()
        .map(|bar| {
            let length = if max == 0 {
                0
            } else {
                ((bar.count as f64 / max as f64) * options.bar_width as f64).round() as usize
            };
            let glyph = if options.legend.is_dimmed(bar.band) {
                DIMMED_BAR_GLYPH
            } else {
                BAR_GLYPH
            };
            format!(
                "{:<label_width$}  {:<bar_width$}  {} ({})",
                bar.label,
                glyph.to_string().repeat(length),
                group_thousands(bar.count),
                format_percent(bar.percentage),
                label_width = label_width,
                bar_width = options.bar_width,
            )
        })
        .collect()
}

/// Map a coordinate into `0..cells`. A zero span lands in the middle.
fn cell(value: f64, min: f64, max: f64, cells: usize) -> usize {
    let span = max - min;
    if cells <= 1 {
        return 0;
    }
    if span <= f64::EPSILON {
        return cells / 2;
    }
    let scaled = ((value - min) / span * (cells - 1) as f64).round();
    (scaled.max(0.0) as usize).min(cells - 1)
}

/// Character-grid scatter plot with a legend line.
///
/// Low points are drawn first and high points last, so higher bands win a
/// shared cell. The reference point is always drawn on top.
pub fn render_scatter(plot: &ScatterPlot, options: &ReportOptions) -> Vec<String> {
    let (width, height) = (options.grid_width.max(1), options.grid_height.max(1));
    let Some(Bounds {
        min_x,
        max_x,
        min_y,
        max_y,
    }) = plot.bounds()
    else {
        return vec!["(no plottable points)".to_string()];
    };

    let mut grid = vec![vec![' '; width]; height];
    let mut place = |x: f64, y: f64, glyph: char| {
        let col = cell(x, min_x, max_x, width);
        // Row 0 is the top of the plot.
        let row = height - 1 - cell(y, min_y, max_y, height);
        grid[row][col] = glyph;
    };

    let mut skipped = 0usize;
    for band in [RelevanceBand::Low, RelevanceBand::Medium, RelevanceBand::High] {
        let glyph = if options.legend.is_dimmed(band) {
            DIMMED_POINT_GLYPH
        } else {
            point_glyph(band)
        };
        for point in plot.series(band) {
            if point.x.is_finite() && point.y.is_finite() {
                place(point.x, point.y, glyph);
            } else {
                skipped += 1;
            }
        }
    }
    if let Some(reference) = plot
        .reference
        .as_ref()
        .filter(|r| r.x.is_finite() && r.y.is_finite())
    {
        place(reference.x, reference.y, REFERENCE_GLYPH);
    }
    if skipped > 0 {
        debug!(subsystem = "report", skipped, "Skipped points with non-finite coordinates");
    }

    let border = format!("+{}+", "-".repeat(width));
    let mut lines = Vec::with_capacity(height + 3);
    lines.push(border.clone());
    lines.extend(
        grid.into_iter()
            .map(|row| format!("|{}|", row.into_iter().collect::<String>())),
    );
    lines.push(border);

    let mut legend: Vec<String> = RelevanceBand::ALL
        .iter()
        .map(|&band| {
            let marker = if options.legend.selected() == Some(band) {
                ">"
            } else {
                ""
            };
            format!(
                "{}{} {} ({})",
                marker,
                point_glyph(band),
                band.label(),
                plot.series(band).len()
            )
        })
        .collect();
    if plot.reference.is_some() {
        legend.push(format!("{} Study document", REFERENCE_GLYPH));
    }
    lines.push(legend.join("   "));
    lines
}
