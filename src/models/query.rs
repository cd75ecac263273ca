use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::entity::{AdProvider, EntityLevel, EntityStatus};
use crate::config::default_top_n;

/// A structured analytics question.
///
/// Queries are emitted by an upstream natural-language translator; this
/// crate never parses free text beyond the optional `question` pass-through
/// used for presentation hints. A query is constructed per request and has
/// no persistence.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MetricQuery {
    /// Requested metric name(s), e.g. `"roas"` or `["spend", "cpa"]`.
    pub metric: MetricSelector,

    /// Relative or absolute window. Absent means the engine default
    /// (last 7 days ending today).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRangeSpec>,

    /// Compare against the immediately preceding window of equal length.
    #[serde(default)]
    pub compare_to_previous: bool,

    /// Dimension to break results down by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<BreakdownDimension>,

    /// Grouping dimension; may equal `breakdown`. Used when the upstream
    /// translator distinguishes "group by" from "break down by".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<BreakdownDimension>,

    /// Result cap for breakdown rows.
    #[serde(default = "default_top_n")]
    #[validate(range(min = 1, max = 50))]
    pub top_n: u32,

    /// Literal value order for breakdown rows; no inversion for cost
    /// metrics at this layer.
    #[serde(default)]
    pub sort_order: SortOrder,

    #[serde(default)]
    pub filters: QueryFilters,

    /// Minimum-significance thresholds. Ignored unless a breakdown is
    /// requested; never applied to the summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Thresholds>,

    /// Raw question text, passed through for visualization-intent cues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

impl MetricQuery {
    /// The breakdown dimension in effect: `breakdown` wins over `group_by`.
    pub fn effective_breakdown(&self) -> Option<BreakdownDimension> {
        self.breakdown.or(self.group_by)
    }
}

/// One metric name or several.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricSelector {
    One(String),
    Many(Vec<String>),
}

impl MetricSelector {
    pub fn names(&self) -> &[String] {
        match self {
            MetricSelector::One(name) => std::slice::from_ref(name),
            MetricSelector::Many(names) => names,
        }
    }
}

/// Relative or absolute time window. Exactly one form must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeRangeSpec {
    /// Window ending today, e.g. 7 for "last week".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_n_days: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,

    /// Natural-language hint resolved to a single-day range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named: Option<NamedRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedRange {
    Today,
    Yesterday,
}

/// Dimension a breakdown groups by: a provider, an entity level, or a
/// calendar bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakdownDimension {
    Provider,
    Campaign,
    Adset,
    Ad,
    Day,
    Week,
    Month,
}

impl BreakdownDimension {
    /// The entity level this dimension groups at, if it is one.
    pub fn entity_level(&self) -> Option<EntityLevel> {
        match self {
            BreakdownDimension::Campaign => Some(EntityLevel::Campaign),
            BreakdownDimension::Adset => Some(EntityLevel::Adset),
            BreakdownDimension::Ad => Some(EntityLevel::Ad),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BreakdownDimension::Provider => "provider",
            BreakdownDimension::Campaign => "campaign",
            BreakdownDimension::Adset => "adset",
            BreakdownDimension::Ad => "ad",
            BreakdownDimension::Day => "day",
            BreakdownDimension::Week => "week",
            BreakdownDimension::Month => "month",
        }
    }
}

/// Sort order for breakdown rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Lowest literal value first.
    Asc,
    /// Highest literal value first.
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Entity-scoping and value filters carried by a query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<AdProvider>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<EntityLevel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EntityStatus>,

    /// Restrict to these entities (and their rollup scope).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_ids: Vec<Uuid>,

    /// Named-entity filter; resolved against the hierarchy, with a literal
    /// substring fallback when nothing matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,

    /// Value constraints applied to breakdown rows after derivation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metric_filters: Vec<MetricFilter>,
}

impl QueryFilters {
    /// Whether any clause narrows the entity scope below the workspace.
    pub fn scopes_entities(&self) -> bool {
        self.provider.is_some()
            || self.level.is_some()
            || self.status.is_some()
            || !self.entity_ids.is_empty()
            || self.entity_name.is_some()
    }
}

/// A value constraint on a displayed metric, e.g. "roas > 4".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricFilter {
    pub metric: String,
    pub operator: FilterOperator,
    pub value: f64,
}

/// Comparison operators for metric-value filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl FilterOperator {
    pub fn matches(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            FilterOperator::Gt => lhs > rhs,
            FilterOperator::Gte => lhs >= rhs,
            FilterOperator::Lt => lhs < rhs,
            FilterOperator::Lte => lhs <= rhs,
            FilterOperator::Eq => lhs == rhs,
            FilterOperator::Ne => lhs != rhs,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Gt => ">",
            FilterOperator::Gte => ">=",
            FilterOperator::Lt => "<",
            FilterOperator::Lte => "<=",
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "!=",
        }
    }
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum-significance thresholds for breakdown rows (HAVING-style, ANDed).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_spend: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_clicks: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_conversions: Option<f64>,
}

impl Thresholds {
    pub fn is_empty(&self) -> bool {
        self.min_spend.is_none() && self.min_clicks.is_none() && self.min_conversions.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_selector_accepts_string_or_list() {
        let one: MetricQuery = serde_json::from_str(r#"{"metric": "roas"}"#).unwrap();
        assert_eq!(one.metric.names(), ["roas".to_string()]);
        assert_eq!(one.top_n, 5);
        assert_eq!(one.sort_order, SortOrder::Desc);

        let many: MetricQuery =
            serde_json::from_str(r#"{"metric": ["spend", "cpa"], "top_n": 3}"#).unwrap();
        assert_eq!(many.metric.names().len(), 2);
        assert_eq!(many.top_n, 3);
    }

    #[test]
    fn filter_operators_round_trip_symbols() {
        let filter: MetricFilter =
            serde_json::from_str(r#"{"metric": "roas", "operator": ">=", "value": 4.0}"#).unwrap();
        assert_eq!(filter.operator, FilterOperator::Gte);
        let json = serde_json::to_string(&filter).unwrap();
        assert!(json.contains(r#""operator":">=""#));
    }

    #[test]
    fn top_n_bounds_are_validated() {
        let query: MetricQuery =
            serde_json::from_str(r#"{"metric": "spend", "top_n": 80}"#).unwrap();
        assert!(query.validate().is_err());
    }

    #[test]
    fn scoping_filters_are_detected() {
        let mut filters = QueryFilters::default();
        assert!(!filters.scopes_entities());
        filters.entity_name = Some("summer".to_string());
        assert!(filters.scopes_entities());

        // Metric-value filters do not narrow the entity scope.
        let value_only = QueryFilters {
            metric_filters: vec![MetricFilter {
                metric: "roas".to_string(),
                operator: FilterOperator::Gt,
                value: 4.0,
            }],
            ..Default::default()
        };
        assert!(!value_only.scopes_entities());
    }

    #[test]
    fn breakdown_wins_over_group_by() {
        let query: MetricQuery = serde_json::from_str(
            r#"{"metric": "cpc", "breakdown": "campaign", "group_by": "provider"}"#,
        )
        .unwrap();
        assert_eq!(
            query.effective_breakdown(),
            Some(BreakdownDimension::Campaign)
        );
    }
}
