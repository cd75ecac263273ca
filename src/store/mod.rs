//! Read-aggregation interfaces over the metric fact table and the entity
//! hierarchy.
//!
//! The engine only ever issues SUM/GROUP BY reads, always scoped to a
//! workspace. Backends: an in-memory store (also the test fake) and a
//! SQLite store behind the `store-sqlite` feature.

pub mod memory;
#[cfg(feature = "store-sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    metrics::BaseTotals,
    models::{AdEntity, AdProvider, EntityLevel, EntityStatus},
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "store-sqlite")]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[cfg(feature = "store-sqlite")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Inclusive date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Number of calendar days covered, inclusive of both endpoints.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The immediately preceding window of equal length.
    pub fn previous(&self) -> DateRange {
        let days = self.days();
        let end = self.start - chrono::Duration::days(1);
        DateRange {
            start: end - chrono::Duration::days(days - 1),
            end,
        }
    }

    /// Iterate every day in the range in order.
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        self.start.iter_days().take(self.days().max(0) as usize)
    }
}

/// One daily fact bucket for an ad entity.
///
/// Attribution context (provider, level, status, name) is denormalized at
/// write time so aggregation never joins against the hierarchy store.
#[derive(Debug, Clone)]
pub struct FactRow {
    pub workspace_id: Uuid,
    pub entity_id: Uuid,
    pub date: NaiveDate,
    pub provider: AdProvider,
    pub level: EntityLevel,
    pub status: EntityStatus,
    pub entity_name: String,
    pub measures: BaseTotals,
}

/// Composable predicate clauses for a fact aggregation.
///
/// The workspace and date range are mandatory; every other clause is
/// independent and optional. There is no cross-workspace read path.
#[derive(Debug, Clone)]
pub struct FactQuery {
    pub workspace_id: Uuid,
    pub range: DateRange,
    pub entity_ids: Option<Vec<Uuid>>,
    pub provider: Option<AdProvider>,
    pub level: Option<EntityLevel>,
    pub status: Option<EntityStatus>,
    /// Case-insensitive substring match on the denormalized entity name.
    pub name_contains: Option<String>,
}

impl FactQuery {
    pub fn new(workspace_id: Uuid, range: DateRange) -> Self {
        Self {
            workspace_id,
            range,
            entity_ids: None,
            provider: None,
            level: None,
            status: None,
            name_contains: None,
        }
    }

    pub fn entity_ids(mut self, ids: Vec<Uuid>) -> Self {
        self.entity_ids = Some(ids);
        self
    }

    pub fn provider(mut self, provider: AdProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn level(mut self, level: EntityLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn status(mut self, status: EntityStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn name_contains(mut self, needle: impl Into<String>) -> Self {
        self.name_contains = Some(needle.into());
        self
    }

    /// Evaluate every clause against a row. Backends without a query
    /// planner (the memory store) filter with this directly.
    pub fn matches(&self, row: &FactRow) -> bool {
        if row.workspace_id != self.workspace_id {
            return false;
        }
        if row.date < self.range.start || row.date > self.range.end {
            return false;
        }
        if let Some(ids) = &self.entity_ids
            && !ids.contains(&row.entity_id)
        {
            return false;
        }
        if let Some(provider) = self.provider
            && row.provider != provider
        {
            return false;
        }
        if let Some(level) = self.level
            && row.level != level
        {
            return false;
        }
        if let Some(status) = self.status
            && row.status != status
        {
            return false;
        }
        if let Some(needle) = &self.name_contains
            && !row
                .entity_name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        {
            return false;
        }
        true
    }
}

/// Daily totals bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub totals: BaseTotals,
}

/// Per-entity totals bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityTotals {
    pub entity_id: Uuid,
    pub totals: BaseTotals,
}

/// Per-provider totals bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderTotals {
    pub provider: AdProvider,
    pub totals: BaseTotals,
}

/// Read-only aggregation over the time-bucketed fact table.
///
/// Implementations must return deterministic orderings: by date, by entity
/// id, and by provider respectively, so that identical queries against an
/// unchanged store yield identical results.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Summed base measures across all matching entity-days.
    async fn totals(&self, query: &FactQuery) -> StoreResult<BaseTotals>;

    /// Totals grouped by calendar day, ordered by date ascending. Days
    /// without facts are absent; callers fill gaps.
    async fn totals_by_day(&self, query: &FactQuery) -> StoreResult<Vec<DailyTotals>>;

    /// Totals grouped by entity, ordered by entity id.
    async fn totals_by_entity(&self, query: &FactQuery) -> StoreResult<Vec<EntityTotals>>;

    /// Totals grouped by provider, ordered by provider.
    async fn totals_by_provider(&self, query: &FactQuery) -> StoreResult<Vec<ProviderTotals>>;
}

/// Entity hierarchy metadata source; feeds the catalog cache.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// All entities of a workspace, every level, any status.
    async fn list_entities(&self, workspace_id: Uuid) -> StoreResult<Vec<AdEntity>>;
}
