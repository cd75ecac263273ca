//! Post-aggregation filtering of breakdown rows.
//!
//! Thresholds and metric-value filters are HAVING-style: they constrain
//! which groups appear, never the summary totals. The top_n cap is applied
//! strictly after filtering and sorting, so tightening top_n can only
//! truncate the qualifying list, never change membership.

use std::cmp::Ordering;

use uuid::Uuid;

use crate::{
    metrics::{BaseMeasure, BaseTotals, MetricKind},
    models::{BreakdownRow, MetricFilter, SortOrder, Thresholds},
    planner::QueryPlan,
};

/// One aggregated group before filtering and shaping.
#[derive(Debug, Clone)]
pub(crate) struct GroupRow {
    pub label: String,
    pub entity_id: Option<Uuid>,
    pub totals: BaseTotals,
}

/// Filter, sort, cap, and shape breakdown groups per the plan.
pub(crate) fn apply(rows: Vec<GroupRow>, plan: &QueryPlan) -> Vec<BreakdownRow> {
    let primary = plan.primary_metric();

    let mut kept: Vec<(GroupRow, Option<f64>)> = rows
        .into_iter()
        .filter(|row| passes_thresholds(&row.totals, plan.thresholds.as_ref()))
        .filter(|row| {
            passes_metric_filters(&row.totals, &plan.filters.metric_filters, &plan.metrics)
        })
        .map(|row| {
            let value = primary.compute(&row.totals);
            (row, value)
        })
        .collect();

    kept.sort_by(|(a, a_value), (b, b_value)| {
        compare_values(*a_value, *b_value, plan.sort_order)
            .then_with(|| a.label.cmp(&b.label))
    });
    kept.truncate(plan.top_n as usize);

    kept.into_iter()
        .map(|(row, value)| BreakdownRow {
            label: row.label,
            value,
            spend: row.totals.get(BaseMeasure::Spend),
            clicks: row.totals.get(BaseMeasure::Clicks),
            conversions: row.totals.get(BaseMeasure::Conversions),
            revenue: row.totals.get(BaseMeasure::Revenue),
            impressions: row.totals.get(BaseMeasure::Impressions),
            entity_id: row.entity_id,
        })
        .collect()
}

/// Minimum-significance thresholds, ANDed together.
fn passes_thresholds(totals: &BaseTotals, thresholds: Option<&Thresholds>) -> bool {
    let Some(thresholds) = thresholds else {
        return true;
    };
    let above = |measure: BaseMeasure, min: Option<f64>| {
        min.is_none_or(|min| totals.get(measure) >= min)
    };
    above(BaseMeasure::Spend, thresholds.min_spend)
        && above(BaseMeasure::Clicks, thresholds.min_clicks)
        && above(BaseMeasure::Conversions, thresholds.min_conversions)
}

/// A row is retained only when it satisfies every filter whose metric is
/// among the displayed metrics. An undefined value satisfies nothing.
fn passes_metric_filters(
    totals: &BaseTotals,
    filters: &[MetricFilter],
    displayed: &[MetricKind],
) -> bool {
    filters
        .iter()
        .filter_map(|filter| {
            let kind = MetricKind::parse(&filter.metric)?;
            displayed.contains(&kind).then_some((kind, filter))
        })
        .all(|(kind, filter)| match kind.compute(totals) {
            Some(value) => filter.operator.matches(value, filter.value),
            None => false,
        })
}

/// Literal value order; rows without a value sort after every valued row
/// regardless of direction.
fn compare_values(a: Option<f64>, b: Option<f64>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let ordering = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
