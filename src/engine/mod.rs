//! Plan execution against the fact store.
//!
//! The engine is request-scoped and stateless: every query compiles to a
//! plan, reads through the workspace catalog for rollup-correct entity
//! scoping, and aggregates. The only shared state is the catalog cache
//! inside the hierarchy resolver.

mod postfilter;

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use chrono::{Datelike, NaiveDate, Utc};
use postfilter::GroupRow;
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    error::QueryResult,
    hierarchy::{EntityCatalog, EntityHierarchyResolver, NameResolution, ResolvedEntity},
    metrics::{BaseTotals, MetricKind},
    models::{
        BreakdownDimension, BreakdownRow, EntityLevel, MetricQuery, MetricResult, MetricSummary,
        QueryFilters, TimeseriesPoint,
    },
    planner::{QueryPlan, QueryPlanner},
    store::{DateRange, EntityStore, FactQuery, FactStore},
};

pub struct AggregationEngine {
    facts: Arc<dyn FactStore>,
    hierarchy: EntityHierarchyResolver,
    planner: QueryPlanner,
}

impl AggregationEngine {
    pub fn new(
        facts: Arc<dyn FactStore>,
        entities: Arc<dyn EntityStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            facts,
            hierarchy: EntityHierarchyResolver::new(entities),
            planner: QueryPlanner::new(config),
        }
    }

    /// The hierarchy resolver, exposed so hierarchy writers can invalidate
    /// the catalog cache.
    pub fn hierarchy(&self) -> &EntityHierarchyResolver {
        &self.hierarchy
    }

    /// Compile and execute a query with the wall clock as "today".
    pub async fn execute(
        &self,
        workspace_id: Uuid,
        query: &MetricQuery,
    ) -> QueryResult<MetricResult> {
        self.execute_at(workspace_id, query, Utc::now().date_naive())
            .await
    }

    /// Compile and execute with a pinned "today"; the result is a pure
    /// function of the query and the store snapshot.
    pub async fn execute_at(
        &self,
        workspace_id: Uuid,
        query: &MetricQuery,
        today: NaiveDate,
    ) -> QueryResult<MetricResult> {
        let mut plan = self.planner.plan(query, today)?;
        let catalog = self.hierarchy.catalog(workspace_id).await?;

        // Resolve the named-entity filter up front; it reshapes both the
        // entity scope and (possibly) the breakdown level.
        let mut resolved: Option<ResolvedEntity> = None;
        let mut name_fallback: Option<String> = None;
        if let Some(name) = plan.filters.entity_name.clone() {
            match self.hierarchy.resolve_name(&catalog, &name) {
                NameResolution::Entity(entity) => {
                    plan.breakdown =
                        EntityHierarchyResolver::reroute_breakdown(&entity, plan.breakdown);
                    resolved = Some(entity);
                }
                NameResolution::Fallback(filter) => name_fallback = Some(filter),
            }
        }

        let scope = entity_scope(&catalog, &plan.filters, resolved.as_ref());
        tracing::debug!(
            workspace = %workspace_id,
            entities = scope.len(),
            fallback = name_fallback.is_some(),
            "resolved aggregation scope"
        );

        let mut fact_query = FactQuery::new(workspace_id, plan.range).entity_ids(scope);
        if let Some(filter) = name_fallback {
            fact_query = fact_query.name_contains(filter);
        }

        let primary = plan.primary_metric();
        let totals = self.facts.totals(&fact_query).await?;
        let summary = primary.compute(&totals);
        let summaries = (plan.metrics.len() > 1).then(|| {
            plan.metrics
                .iter()
                .map(|metric| MetricSummary {
                    metric: metric.as_str().to_string(),
                    value: metric.compute(&totals),
                })
                .collect()
        });

        let (previous, delta_pct) = match plan.previous_range {
            Some(previous_range) => {
                let mut previous_query = fact_query.clone();
                previous_query.range = previous_range;
                let previous_totals = self.facts.totals(&previous_query).await?;
                let previous = primary.compute(&previous_totals);
                (previous, percent_change(summary, previous))
            }
            None => (None, None),
        };

        let timeseries = if plan.need_timeseries {
            Some(self.daily_series(&fact_query, plan.range, primary).await?)
        } else {
            None
        };
        let timeseries_previous = match (plan.need_previous, plan.previous_range) {
            (true, Some(previous_range)) => {
                let mut previous_query = fact_query.clone();
                previous_query.range = previous_range;
                Some(
                    self.daily_series(&previous_query, previous_range, primary)
                        .await?,
                )
            }
            _ => None,
        };

        let breakdown = match plan.breakdown {
            Some(dimension) => Some(
                self.breakdown_rows(&fact_query, &catalog, dimension, &plan)
                    .await?,
            ),
            None => None,
        };

        let workspace_avg = if plan.need_baseline {
            // True baseline: the whole workspace with zero filters, still
            // rollup-correct. Never blended into the primary result.
            let mut baseline_ids: Vec<Uuid> = catalog.countable().map(|e| e.id).collect();
            baseline_ids.sort();
            let baseline_query =
                FactQuery::new(workspace_id, plan.range).entity_ids(baseline_ids);
            primary.compute(&self.facts.totals(&baseline_query).await?)
        } else {
            None
        };

        Ok(MetricResult {
            summary,
            summaries,
            previous,
            delta_pct,
            timeseries,
            timeseries_previous,
            breakdown,
            workspace_avg,
        })
    }

    /// One point per calendar day in the range; days without facts carry
    /// zero totals so comparison series always align point-for-point.
    async fn daily_series(
        &self,
        fact_query: &FactQuery,
        range: DateRange,
        metric: MetricKind,
    ) -> QueryResult<Vec<TimeseriesPoint>> {
        let daily = self.facts.totals_by_day(fact_query).await?;
        let by_date: BTreeMap<NaiveDate, BaseTotals> = daily
            .into_iter()
            .map(|bucket| (bucket.date, bucket.totals))
            .collect();

        let zero = BaseTotals::new();
        Ok(range
            .iter_days()
            .map(|date| TimeseriesPoint {
                date,
                value: metric.compute(by_date.get(&date).unwrap_or(&zero)),
            })
            .collect())
    }

    async fn breakdown_rows(
        &self,
        fact_query: &FactQuery,
        catalog: &EntityCatalog,
        dimension: BreakdownDimension,
        plan: &QueryPlan,
    ) -> QueryResult<Vec<BreakdownRow>> {
        let groups = match dimension {
            BreakdownDimension::Provider => self
                .facts
                .totals_by_provider(fact_query)
                .await?
                .into_iter()
                .map(|bucket| GroupRow {
                    label: bucket.provider.as_str().to_string(),
                    entity_id: None,
                    totals: bucket.totals,
                })
                .collect(),
            BreakdownDimension::Campaign => {
                self.entity_groups(fact_query, catalog, EntityLevel::Campaign)
                    .await?
            }
            BreakdownDimension::Adset => {
                self.entity_groups(fact_query, catalog, EntityLevel::Adset)
                    .await?
            }
            BreakdownDimension::Ad => {
                self.entity_groups(fact_query, catalog, EntityLevel::Ad)
                    .await?
            }
            BreakdownDimension::Day => self
                .calendar_groups(fact_query, |date| (date.to_string(), date))
                .await?,
            BreakdownDimension::Week => self
                .calendar_groups(fact_query, |date| {
                    let week = date.iso_week();
                    (
                        format!("{}-W{:02}", week.year(), week.week()),
                        NaiveDate::from_isoywd_opt(week.year(), week.week(), chrono::Weekday::Mon)
                            .unwrap_or(date),
                    )
                })
                .await?,
            BreakdownDimension::Month => self
                .calendar_groups(fact_query, |date| {
                    (
                        format!("{}-{:02}", date.year(), date.month()),
                        date.with_day(1).unwrap_or(date),
                    )
                })
                .await?,
        };

        Ok(postfilter::apply(groups, plan))
    }

    /// Group per-entity totals by their rollup ancestor at `level`. Facts
    /// recorded above the level, or at the level on an entity whose facts
    /// are carried by descendants, never land in a group.
    async fn entity_groups(
        &self,
        fact_query: &FactQuery,
        catalog: &EntityCatalog,
        level: EntityLevel,
    ) -> QueryResult<Vec<GroupRow>> {
        let per_entity = self.facts.totals_by_entity(fact_query).await?;

        let mut groups: BTreeMap<Uuid, BaseTotals> = BTreeMap::new();
        for bucket in per_entity {
            let Some(ancestor) = catalog.rollup_ancestor(bucket.entity_id, level) else {
                continue;
            };
            groups.entry(ancestor).or_default().merge(&bucket.totals);
        }

        Ok(groups
            .into_iter()
            .map(|(entity_id, totals)| GroupRow {
                label: catalog
                    .get(entity_id)
                    .map(|entity| entity.name.clone())
                    .unwrap_or_else(|| entity_id.to_string()),
                entity_id: Some(entity_id),
                totals,
            })
            .collect())
    }

    /// Group daily totals into calendar buckets keyed for deterministic
    /// ordering, labelled for display.
    async fn calendar_groups(
        &self,
        fact_query: &FactQuery,
        bucket: impl Fn(NaiveDate) -> (String, NaiveDate),
    ) -> QueryResult<Vec<GroupRow>> {
        let daily = self.facts.totals_by_day(fact_query).await?;

        let mut groups: BTreeMap<(NaiveDate, String), BaseTotals> = BTreeMap::new();
        for day in daily {
            let (label, key) = bucket(day.date);
            groups.entry((key, label)).or_default().merge(&day.totals);
        }

        Ok(groups
            .into_iter()
            .map(|((_, label), totals)| GroupRow {
                label,
                entity_id: None,
                totals,
            })
            .collect())
    }
}

/// Percent change from `previous` to `current`, zero-guarded.
fn percent_change(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    match (current, previous) {
        (Some(current), Some(previous)) if previous != 0.0 => {
            Some((current - previous) / previous * 100.0)
        }
        _ => None,
    }
}

/// The countable entity set for a query: childless entities passing every
/// scoping clause. Explicit entity ids naming an ancestor expand to its
/// leaf descendants, so callers never double count by selecting a campaign
/// and its ads together.
fn entity_scope(
    catalog: &EntityCatalog,
    filters: &QueryFilters,
    resolved: Option<&ResolvedEntity>,
) -> Vec<Uuid> {
    let explicit: Option<HashSet<Uuid>> = (!filters.entity_ids.is_empty()).then(|| {
        filters
            .entity_ids
            .iter()
            .flat_map(|id| {
                if catalog.has_children(*id) {
                    catalog.leaf_descendants(*id).to_vec()
                } else {
                    vec![*id]
                }
            })
            .collect()
    });
    let named: Option<HashSet<Uuid>> =
        resolved.map(|entity| entity.fact_ids.iter().copied().collect());

    let mut ids: Vec<Uuid> = catalog
        .countable()
        .filter(|e| filters.provider.is_none_or(|p| e.provider == p))
        .filter(|e| filters.level.is_none_or(|l| e.level == l))
        .filter(|e| filters.status.is_none_or(|s| e.status == s))
        .filter(|e| explicit.as_ref().is_none_or(|set| set.contains(&e.id)))
        .filter(|e| named.as_ref().is_none_or(|set| set.contains(&e.id)))
        .map(|e| e.id)
        .collect();
    ids.sort();
    ids
}
