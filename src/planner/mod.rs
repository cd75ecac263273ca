//! Query planning.
//!
//! A [`QueryPlan`] is derived once per query and discarded after execution.
//! Planning validates everything that can fail before the first store read;
//! execution only computes.

pub mod time;

use validator::Validate;

use crate::{
    config::EngineConfig,
    error::{QueryError, QueryResult},
    metrics::{self, BaseMeasure, DerivedMetric, MetricKind},
    models::{BreakdownDimension, MetricQuery, QueryFilters, SortOrder, Thresholds},
    store::DateRange,
};

/// Everything the aggregation engine must compute for one query.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Requested metrics in request order; the first is the primary.
    pub metrics: Vec<MetricKind>,

    /// Union of base measures to sum, in canonical order.
    pub measures: Vec<BaseMeasure>,

    /// Set only when exactly one metric was requested and it is a formula.
    pub derived: Option<DerivedMetric>,

    pub range: DateRange,

    /// Immediately preceding window of equal length; set when comparing.
    pub previous_range: Option<DateRange>,

    pub breakdown: Option<BreakdownDimension>,

    /// Timeseries are expensive; single-value answers skip them.
    pub need_timeseries: bool,

    pub need_previous: bool,

    /// Compute the unfiltered workspace baseline alongside the summary.
    pub need_baseline: bool,

    pub filters: QueryFilters,

    /// Present only when a breakdown was requested; thresholds never apply
    /// to the summary.
    pub thresholds: Option<Thresholds>,

    pub top_n: u32,

    pub sort_order: SortOrder,
}

impl QueryPlan {
    /// The metric breakdown values and the summary are computed for.
    pub fn primary_metric(&self) -> MetricKind {
        self.metrics[0]
    }
}

/// Pure `MetricQuery -> QueryPlan` compiler.
#[derive(Debug, Clone, Default)]
pub struct QueryPlanner {
    config: EngineConfig,
}

impl QueryPlanner {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Compile a query, rejecting anything malformed before store access.
    pub fn plan(&self, query: &MetricQuery, today: chrono::NaiveDate) -> QueryResult<QueryPlan> {
        query.validate()?;

        let names = query.metric.names();
        if names.is_empty() {
            return Err(QueryError::MissingMetric);
        }
        let metrics = names
            .iter()
            .map(|name| {
                MetricKind::parse(name).ok_or_else(|| QueryError::UnknownMetric(name.clone()))
            })
            .collect::<QueryResult<Vec<_>>>()?;

        let range = time::resolve_time_range(query.time_range.as_ref(), today, &self.config)?;
        let measures = metrics::required_measures(&metrics);

        let derived = match metrics.as_slice() {
            [MetricKind::Derived(derived)] => Some(*derived),
            _ => None,
        };

        let breakdown = query.effective_breakdown();
        let need_previous = query.compare_to_previous;
        let need_timeseries = breakdown.is_some() || need_previous;
        let need_baseline = query.filters.scopes_entities();

        // Thresholds only ever constrain breakdown rows.
        let thresholds = match (&query.thresholds, breakdown) {
            (Some(thresholds), Some(_)) if !thresholds.is_empty() => Some(thresholds.clone()),
            _ => None,
        };

        let plan = QueryPlan {
            metrics,
            measures,
            derived,
            previous_range: need_previous.then(|| range.previous()),
            range,
            breakdown,
            need_timeseries,
            need_previous,
            need_baseline,
            filters: query.filters.clone(),
            thresholds,
            top_n: query.top_n,
            sort_order: query.sort_order,
        };
        tracing::debug!(
            metrics = %plan.metrics.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(","),
            start = %plan.range.start,
            end = %plan.range.end,
            breakdown = plan.breakdown.map(|b| b.as_str()),
            sort_order = plan.sort_order.as_str(),
            need_timeseries = plan.need_timeseries,
            need_previous = plan.need_previous,
            "compiled query plan"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{MetricSelector, TimeRangeSpec};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 7).unwrap()
    }

    fn planner() -> QueryPlanner {
        QueryPlanner::new(EngineConfig::default())
    }

    fn query(metric: &str) -> MetricQuery {
        serde_json::from_str(&format!(r#"{{"metric": "{metric}"}}"#)).unwrap()
    }

    #[test]
    fn single_derived_metric_sets_the_derived_slot() {
        let plan = planner().plan(&query("roas"), today()).unwrap();
        assert_eq!(plan.derived, Some(DerivedMetric::Roas));
        assert_eq!(
            plan.measures,
            vec![BaseMeasure::Spend, BaseMeasure::Revenue]
        );
        assert!(!plan.need_timeseries);
        assert!(!plan.need_previous);
        assert!(!plan.need_baseline);
        assert!(plan.previous_range.is_none());
    }

    #[test]
    fn base_metric_has_no_derived_slot() {
        let plan = planner().plan(&query("spend"), today()).unwrap();
        assert_eq!(plan.derived, None);
        assert_eq!(plan.measures, vec![BaseMeasure::Spend]);
        assert_eq!(plan.primary_metric(), MetricKind::Base(BaseMeasure::Spend));
    }

    #[test]
    fn multi_metric_queries_union_measures_and_clear_derived() {
        let mut q = query("roas");
        q.metric = MetricSelector::Many(vec!["roas".to_string(), "ctr".to_string()]);
        let plan = planner().plan(&q, today()).unwrap();
        assert_eq!(plan.derived, None);
        assert_eq!(
            plan.measures,
            vec![
                BaseMeasure::Spend,
                BaseMeasure::Revenue,
                BaseMeasure::Clicks,
                BaseMeasure::Impressions
            ]
        );
    }

    #[test]
    fn breakdown_or_comparison_turns_on_timeseries() {
        let mut q = query("roas");
        assert!(!planner().plan(&q, today()).unwrap().need_timeseries);

        q.breakdown = Some(BreakdownDimension::Campaign);
        let plan = planner().plan(&q, today()).unwrap();
        assert!(plan.need_timeseries);
        assert!(!plan.need_previous);

        let mut q = query("roas");
        q.compare_to_previous = true;
        let plan = planner().plan(&q, today()).unwrap();
        assert!(plan.need_timeseries);
        assert!(plan.need_previous);
        let previous = plan.previous_range.unwrap();
        assert_eq!(previous.days(), plan.range.days());
        assert_eq!(
            previous.end,
            plan.range.start - chrono::Duration::days(1)
        );
    }

    #[test]
    fn scoping_filters_request_a_baseline() {
        let mut q = query("roas");
        q.filters.entity_name = Some("summer".to_string());
        assert!(planner().plan(&q, today()).unwrap().need_baseline);
    }

    #[test]
    fn thresholds_are_dropped_without_a_breakdown() {
        let mut q = query("roas");
        q.thresholds = Some(Thresholds {
            min_spend: Some(50.0),
            ..Default::default()
        });
        assert!(planner().plan(&q, today()).unwrap().thresholds.is_none());

        q.breakdown = Some(BreakdownDimension::Campaign);
        assert!(planner().plan(&q, today()).unwrap().thresholds.is_some());
    }

    #[test]
    fn unknown_metric_is_rejected_before_any_store_access() {
        let err = planner().plan(&query("velocity"), today()).unwrap_err();
        assert!(matches!(err, QueryError::UnknownMetric(name) if name == "velocity"));
    }

    #[test]
    fn empty_metric_list_is_rejected() {
        let mut q = query("roas");
        q.metric = MetricSelector::Many(Vec::new());
        assert!(matches!(
            planner().plan(&q, today()).unwrap_err(),
            QueryError::MissingMetric
        ));
    }

    #[test]
    fn out_of_range_top_n_is_rejected() {
        let mut q = query("roas");
        q.top_n = 0;
        assert!(matches!(
            planner().plan(&q, today()).unwrap_err(),
            QueryError::Validation(_)
        ));
    }

    #[test]
    fn invalid_time_range_is_rejected() {
        let mut q = query("roas");
        q.time_range = Some(TimeRangeSpec {
            last_n_days: Some(7),
            named: Some(crate::models::NamedRange::Today),
            ..Default::default()
        });
        assert!(matches!(
            planner().plan(&q, today()).unwrap_err(),
            QueryError::InvalidTimeRange(_)
        ));
    }
}
