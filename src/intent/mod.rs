//! Visualization-intent classification.
//!
//! Maps a compiled result's shape plus query metadata to a rendering
//! strategy. The classifier is deterministic and first-match-wins; the
//! renderer applies the returned strategy mechanically with no further
//! judgment.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    config::EngineConfig,
    models::{FilterOperator, MetricFilter, MetricQuery, MetricResult},
};

/// Largest filter value still treated as exception-hunting ("= 0",
/// "fewer than one conversion").
const LOW_FILTER_CEILING: f64 = 1.0;

static RANKING_LANGUAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(top|best|worst|highest|lowest|most|least)\b").unwrap()
});

static ALL_LANGUAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(all|every|each)\b").unwrap());

static COMPARISON_LANGUAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(vs|versus|compared?|comparison|than|previous|prior|before)\b").unwrap()
});

static TREND_LANGUAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(trend|trending|trajectory|over time)\b").unwrap());

/// How a compiled result should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenderIntent {
    SingleMetric,
    Comparison,
    Ranking,
    AllEntities,
    Filtering,
    Trend,
    Breakdown,
    MultiMetric,
}

/// Fixed rendering recipe for one intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderStrategy {
    pub show_card: bool,
    pub show_timeseries: bool,
    pub show_comparison_overlay: bool,
    pub show_breakdown_chart: bool,
    pub show_table: bool,
    pub max_charts: u8,
}

impl RenderIntent {
    /// The strategy record a renderer applies mechanically.
    pub fn strategy(&self) -> RenderStrategy {
        match self {
            // Exception-hunting queries render as tables: a chart of rows
            // selected for being near zero misleads.
            RenderIntent::Filtering | RenderIntent::AllEntities => RenderStrategy {
                show_card: false,
                show_timeseries: false,
                show_comparison_overlay: false,
                show_breakdown_chart: false,
                show_table: true,
                max_charts: 0,
            },
            RenderIntent::Ranking => RenderStrategy {
                show_card: false,
                show_timeseries: false,
                show_comparison_overlay: false,
                show_breakdown_chart: true,
                show_table: true,
                max_charts: 1,
            },
            RenderIntent::Comparison => RenderStrategy {
                show_card: true,
                show_timeseries: false,
                show_comparison_overlay: true,
                show_breakdown_chart: false,
                show_table: false,
                max_charts: 1,
            },
            RenderIntent::MultiMetric => RenderStrategy {
                show_card: true,
                show_timeseries: false,
                show_comparison_overlay: false,
                show_breakdown_chart: false,
                show_table: false,
                max_charts: 0,
            },
            RenderIntent::Breakdown => RenderStrategy {
                show_card: false,
                show_timeseries: false,
                show_comparison_overlay: false,
                show_breakdown_chart: true,
                show_table: true,
                max_charts: 1,
            },
            RenderIntent::Trend => RenderStrategy {
                show_card: true,
                show_timeseries: true,
                show_comparison_overlay: false,
                show_breakdown_chart: false,
                show_table: false,
                max_charts: 1,
            },
            RenderIntent::SingleMetric => RenderStrategy {
                show_card: true,
                show_timeseries: true,
                show_comparison_overlay: false,
                show_breakdown_chart: false,
                show_table: false,
                max_charts: 1,
            },
        }
    }
}

/// Deterministic `(query metadata, result shape) -> RenderIntent`.
#[derive(Debug, Clone)]
pub struct VisualIntentClassifier {
    reasonable_top_n: u32,
}

impl Default for VisualIntentClassifier {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl VisualIntentClassifier {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            reasonable_top_n: config.reasonable_top_n,
        }
    }

    pub fn classify(&self, query: &MetricQuery, result: &MetricResult) -> RenderIntent {
        let question = query.question.as_deref().unwrap_or_default();
        let breakdown_requested = query.effective_breakdown().is_some();
        let breakdown_exists = result.breakdown.is_some();

        if query
            .filters
            .metric_filters
            .iter()
            .any(is_exception_filter)
        {
            return RenderIntent::Filtering;
        }
        if breakdown_requested && ALL_LANGUAGE.is_match(question) {
            return RenderIntent::AllEntities;
        }
        if breakdown_requested
            && (RANKING_LANGUAGE.is_match(question) || COMPARISON_LANGUAGE.is_match(question))
        {
            return RenderIntent::Ranking;
        }
        if query.compare_to_previous || COMPARISON_LANGUAGE.is_match(question) {
            return RenderIntent::Comparison;
        }
        if query.metric.names().len() > 1 {
            return RenderIntent::MultiMetric;
        }
        if breakdown_exists && query.top_n <= self.reasonable_top_n {
            return RenderIntent::Ranking;
        }
        if breakdown_exists {
            return RenderIntent::Breakdown;
        }
        if TREND_LANGUAGE.is_match(question) {
            return RenderIntent::Trend;
        }
        RenderIntent::SingleMetric
    }
}

/// A filter hunting for exceptions rather than ranking performance:
/// `<`, `<=`, or `=` against zero or a low threshold.
fn is_exception_filter(filter: &MetricFilter) -> bool {
    matches!(
        filter.operator,
        FilterOperator::Lt | FilterOperator::Lte | FilterOperator::Eq
    ) && filter.value <= LOW_FILTER_CEILING
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> VisualIntentClassifier {
        VisualIntentClassifier::default()
    }

    fn query(json: &str) -> MetricQuery {
        serde_json::from_str(json).unwrap()
    }

    fn empty_result() -> MetricResult {
        MetricResult {
            summary: Some(1.0),
            summaries: None,
            previous: None,
            delta_pct: None,
            timeseries: None,
            timeseries_previous: None,
            breakdown: None,
            workspace_avg: None,
        }
    }

    fn result_with_breakdown() -> MetricResult {
        MetricResult {
            breakdown: Some(Vec::new()),
            ..empty_result()
        }
    }

    #[test]
    fn zero_filters_classify_as_filtering_with_table_only() {
        // Scenario: "= 0" filter renders a table, no charts.
        let q = query(
            r#"{"metric": "conversions", "breakdown": "campaign",
                "filters": {"metric_filters": [
                    {"metric": "conversions", "operator": "=", "value": 0}]}}"#,
        );
        let intent = classifier().classify(&q, &result_with_breakdown());
        assert_eq!(intent, RenderIntent::Filtering);

        let strategy = intent.strategy();
        assert!(!strategy.show_timeseries);
        assert!(strategy.show_table);
        assert!(!strategy.show_breakdown_chart);
        assert_eq!(strategy.max_charts, 0);
    }

    #[test]
    fn high_value_filters_are_not_exception_hunting() {
        let q = query(
            r#"{"metric": "roas", "breakdown": "campaign",
                "filters": {"metric_filters": [
                    {"metric": "roas", "operator": ">", "value": 4}]}}"#,
        );
        assert_ne!(
            classifier().classify(&q, &result_with_breakdown()),
            RenderIntent::Filtering
        );
    }

    #[test]
    fn all_language_with_breakdown_is_a_table() {
        let q = query(
            r#"{"metric": "spend", "breakdown": "campaign",
                "question": "show me all campaigns by spend"}"#,
        );
        assert_eq!(
            classifier().classify(&q, &result_with_breakdown()),
            RenderIntent::AllEntities
        );
    }

    #[test]
    fn ranking_language_with_breakdown_is_a_ranking() {
        let q = query(
            r#"{"metric": "cpa", "breakdown": "campaign",
                "question": "worst campaigns by CPA"}"#,
        );
        let intent = classifier().classify(&q, &result_with_breakdown());
        assert_eq!(intent, RenderIntent::Ranking);
        assert!(intent.strategy().show_breakdown_chart);
        assert!(intent.strategy().show_table);
    }

    #[test]
    fn explicit_comparison_wins_without_breakdown() {
        let q = query(r#"{"metric": "roas", "compare_to_previous": true}"#);
        let intent = classifier().classify(&q, &empty_result());
        assert_eq!(intent, RenderIntent::Comparison);

        let strategy = intent.strategy();
        assert!(strategy.show_comparison_overlay);
        assert!(!strategy.show_breakdown_chart);
    }

    #[test]
    fn comparison_language_alone_also_counts() {
        let q = query(r#"{"metric": "roas", "question": "how does roas look versus last week"}"#);
        assert_eq!(
            classifier().classify(&q, &empty_result()),
            RenderIntent::Comparison
        );
    }

    #[test]
    fn multiple_metrics_render_one_card_each() {
        let q = query(r#"{"metric": ["spend", "roas"]}"#);
        let intent = classifier().classify(&q, &empty_result());
        assert_eq!(intent, RenderIntent::MultiMetric);
        assert!(intent.strategy().show_card);
        assert_eq!(intent.strategy().max_charts, 0);
    }

    #[test]
    fn quiet_breakdowns_fall_back_by_top_n() {
        // Reasonable top_n: ranking fallback.
        let q = query(r#"{"metric": "spend", "breakdown": "campaign", "top_n": 5}"#);
        assert_eq!(
            classifier().classify(&q, &result_with_breakdown()),
            RenderIntent::Ranking
        );

        // Oversized top_n: distribution.
        let q = query(r#"{"metric": "spend", "breakdown": "campaign", "top_n": 40}"#);
        assert_eq!(
            classifier().classify(&q, &result_with_breakdown()),
            RenderIntent::Breakdown
        );
    }

    #[test]
    fn trend_language_renders_an_area_chart() {
        let q = query(r#"{"metric": "spend", "question": "what's the spend trend lately"}"#);
        let intent = classifier().classify(&q, &empty_result());
        assert_eq!(intent, RenderIntent::Trend);
        assert!(intent.strategy().show_timeseries);
    }

    #[test]
    fn plain_queries_are_single_metric_cards() {
        let q = query(r#"{"metric": "roas"}"#);
        let intent = classifier().classify(&q, &empty_result());
        assert_eq!(intent, RenderIntent::SingleMetric);

        let strategy = intent.strategy();
        assert!(strategy.show_card);
        assert!(!strategy.show_table);
        assert!(!strategy.show_breakdown_chart);
    }

    #[test]
    fn filtering_outranks_every_other_cue() {
        // Ranking language, comparison flag, and a breakdown all lose to
        // the exception filter.
        let q = query(
            r#"{"metric": "conversions", "breakdown": "campaign",
                "compare_to_previous": true,
                "question": "top campaigns with all conversions",
                "filters": {"metric_filters": [
                    {"metric": "conversions", "operator": "<=", "value": 0}]}}"#,
        );
        assert_eq!(
            classifier().classify(&q, &result_with_breakdown()),
            RenderIntent::Filtering
        );
    }

    #[test]
    fn intent_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&RenderIntent::SingleMetric).unwrap(),
            r#""SINGLE_METRIC""#
        );
        assert_eq!(
            serde_json::to_string(&RenderIntent::AllEntities).unwrap(),
            r#""ALL_ENTITIES""#
        );
    }
}
