//! Chart models built from result data.
//!
//! The server sends chart-ready arrays; these types only regroup them for
//! display. No scores are recomputed.

use serde::Serialize;

use decklens_core::{
    BarEntry, ReferencePoint, RelevanceBand, ResultData, SimilarityPoint, Statistics,
};

use crate::format::percentage;

/// One bar of the relevance distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub band: RelevanceBand,
    pub label: &'static str,
    pub count: u64,
    /// Share of all cards, 0 to 100.
    pub percentage: f64,
}

/// Where the bar values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BarSource {
    /// `visualizations.relevance_distribution` from the server.
    Distribution,
    /// Counts in `statistics`, used when no distribution was sent.
    Statistics,
}

/// Bar chart of card counts per relevance band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarChart {
    pub bars: Vec<Bar>,
    pub source: BarSource,
}

impl BarChart {
    pub fn from_result(result: &ResultData) -> Self {
        let distribution = &result.visualizations.relevance_distribution;
        if distribution.is_empty() {
            Self::from_statistics(&result.statistics)
        } else {
            Self::from_distribution(distribution, &result.statistics)
        }
    }

    /// Bars in server order. Missing percentages are derived from the counts.
    pub fn from_distribution(entries: &[BarEntry], statistics: &Statistics) -> Self {
        let total = match statistics.total_cards {
            0 => entries.iter().map(|e| e.count).sum(),
            n => n,
        };
        let bars = entries
            .iter()
            .map(|entry| Bar {
                band: entry.band,
                label: entry.band.label(),
                count: entry.count,
                percentage: entry
                    .percentage
                    .filter(|p| p.is_finite())
                    .unwrap_or_else(|| percentage(entry.count, total)),
            })
            .collect();
        Self {
            bars,
            source: BarSource::Distribution,
        }
    }

    /// One bar per band, high to low.
    pub fn from_statistics(statistics: &Statistics) -> Self {
        let total = statistics.effective_total();
        let bars = RelevanceBand::ALL
            .iter()
            .map(|&band| {
                let count = statistics.count(band);
                Bar {
                    band,
                    label: band.label(),
                    count,
                    percentage: percentage(count, total),
                }
            })
            .collect();
        Self {
            bars,
            source: BarSource::Statistics,
        }
    }

    /// Largest count, for scaling.
    pub fn max_count(&self) -> u64 {
        self.bars.iter().map(|b| b.count).max().unwrap_or(0)
    }
}

/// Axis-aligned extent of the plotted points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    fn include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }
}

/// Similarity scatter plot split into relevance bands.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScatterPlot {
    pub high: Vec<SimilarityPoint>,
    pub medium: Vec<SimilarityPoint>,
    pub low: Vec<SimilarityPoint>,
    /// Position of the study document.
    pub reference: Option<ReferencePoint>,
}

impl ScatterPlot {
    pub fn from_result(result: &ResultData) -> Self {
        Self::from_points(
            &result.visualizations.similarity_points,
            result.visualizations.reference_point.clone(),
        )
    }

    pub fn from_points(points: &[SimilarityPoint], reference: Option<ReferencePoint>) -> Self {
        let mut plot = Self {
            reference,
            ..Self::default()
        };
        for point in points {
            let series = match RelevanceBand::classify(point.similarity) {
                RelevanceBand::High => &mut plot.high,
                RelevanceBand::Medium => &mut plot.medium,
                RelevanceBand::Low => &mut plot.low,
            };
            series.push(point.clone());
        }
        plot
    }

    pub fn series(&self, band: RelevanceBand) -> &[SimilarityPoint] {
        match band {
            RelevanceBand::High => &self.high,
            RelevanceBand::Medium => &self.medium,
            RelevanceBand::Low => &self.low,
        }
    }

    /// Number of card points.
    pub fn len(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.reference.is_none()
    }

    /// Extent over all finite points including the reference point.
    pub fn bounds(&self) -> Option<Bounds> {
        let card_points = RelevanceBand::ALL
            .iter()
            .flat_map(|&band| self.series(band))
            .map(|p| (p.x, p.y));
        let reference = self.reference.iter().map(|r| (r.x, r.y));

        let mut bounds: Option<Bounds> = None;
        for (x, y) in card_points
            .chain(reference)
            .filter(|(x, y)| x.is_finite() && y.is_finite())
        {
            match bounds.as_mut() {
                Some(b) => b.include(x, y),
                None => {
                    bounds = Some(Bounds {
                        min_x: x,
                        max_x: x,
                        min_y: y,
                        max_y: y,
                    })
                }
            }
        }
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, y: f64, similarity: f64) -> SimilarityPoint {
        SimilarityPoint {
            x,
            y,
            similarity,
            label: None,
        }
    }

    #[test]
    fn test_bar_chart_falls_back_to_statistics() {
        let result = ResultData {
            statistics: Statistics {
                total_cards: 8,
                high_relevance: 2,
                medium_relevance: 2,
                low_relevance: 4,
                ..Statistics::default()
            },
            ..ResultData::default()
        };

        let chart = BarChart::from_result(&result);
        assert_eq!(chart.source, BarSource::Statistics);
        let counts: Vec<u64> = chart.bars.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 2, 4]);
        assert_eq!(chart.bars[2].percentage, 50.0);
        assert_eq!(chart.max_count(), 4);
    }

    #[test]
    fn test_bar_chart_uses_server_distribution() {
        let entries = vec![
            BarEntry {
                band: RelevanceBand::Low,
                count: 1,
                percentage: Some(10.0),
            },
            BarEntry {
                band: RelevanceBand::High,
                count: 9,
                percentage: None,
            },
        ];
        let chart = BarChart::from_distribution(&entries, &Statistics::default());

        assert_eq!(chart.source, BarSource::Distribution);
        assert_eq!(chart.bars[0].band, RelevanceBand::Low);
        assert_eq!(chart.bars[0].percentage, 10.0);
        // Derived from the counts when the server omits it.
        assert_eq!(chart.bars[1].percentage, 90.0);
    }

    #[test]
    fn test_scatter_split_by_threshold() {
        let points = vec![
            point(0.0, 0.0, 0.95),
            point(1.0, 1.0, 0.8),
            point(2.0, 2.0, 0.79),
            point(3.0, 3.0, 0.5),
            point(4.0, 4.0, 0.49),
        ];
        let plot = ScatterPlot::from_points(&points, None);

        assert_eq!(plot.high.len(), 2);
        assert_eq!(plot.medium.len(), 2);
        assert_eq!(plot.low.len(), 1);
        assert_eq!(plot.len(), 5);
    }

    #[test]
    fn test_scatter_bounds_include_reference() {
        let plot = ScatterPlot::from_points(
            &[point(1.0, 2.0, 0.9), point(f64::NAN, 0.0, 0.1)],
            Some(ReferencePoint {
                x: -3.0,
                y: 5.0,
                label: None,
            }),
        );
        let bounds = plot.bounds().unwrap();
        assert_eq!(bounds.min_x, -3.0);
        assert_eq!(bounds.max_x, 1.0);
        assert_eq!(bounds.min_y, 2.0);
        assert_eq!(bounds.max_y, 5.0);
    }

    #[test]
    fn test_empty_scatter() {
        let plot = ScatterPlot::default();
        assert!(plot.is_empty());
        assert!(plot.bounds().is_none());
    }
}
