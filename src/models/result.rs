use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Compiled answer to a metric query.
///
/// The terminal artifact of query execution, consumed by the answer/visual
/// renderer together with a [`crate::intent::RenderIntent`]. Ratio metrics
/// with a zero denominator appear as `None`, never as infinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    /// Primary metric over the full scope and range.
    pub summary: Option<f64>,

    /// Per-metric summaries when more than one metric was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summaries: Option<Vec<MetricSummary>>,

    /// Primary metric over the immediately preceding window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<f64>,

    /// Percent change from `previous` to `summary`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_pct: Option<f64>,

    /// Daily series over the requested range, one point per calendar day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeseries: Option<Vec<TimeseriesPoint>>,

    /// Daily series over the previous window; same number of points as
    /// `timeseries`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeseries_previous: Option<Vec<TimeseriesPoint>>,

    /// Breakdown rows, filtered, ordered per sort_order, capped at top_n.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Vec<BreakdownRow>>,

    /// Workspace-wide value of the primary metric, computed with zero
    /// filters. A comparison reference only; never blended into `summary`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_avg: Option<f64>,
}

/// Summary value for one requested metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric: String,
    pub value: Option<f64>,
}

/// One point of a daily series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// One breakdown group with its derived value and base measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownRow {
    /// Group label: entity name, provider, or calendar bucket.
    pub label: String,

    /// Primary metric computed from this group's own totals.
    pub value: Option<f64>,

    pub spend: f64,
    pub clicks: f64,
    pub conversions: f64,
    pub revenue: f64,
    pub impressions: f64,

    /// Set for entity-level breakdowns; None for provider/time buckets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Uuid>,
}
