//! In-memory store backends.
//!
//! The fact store aggregates with `BTreeMap` so group orderings are
//! deterministic without a sort pass. Primarily the test fake, but fully
//! functional for embedded use.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    DailyTotals, EntityStore, EntityTotals, FactQuery, FactRow, FactStore, ProviderTotals,
    StoreResult,
};
use crate::{
    metrics::BaseTotals,
    models::{AdEntity, AdProvider},
};

#[derive(Default)]
pub struct MemoryFactStore {
    rows: RwLock<Vec<FactRow>>,
}

impl MemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one fact bucket. A row for the same `(workspace, entity,
    /// date)` replaces the previous one, mirroring ingest upserts.
    pub fn insert(&self, row: FactRow) {
        let mut rows = self.rows.write();
        rows.retain(|existing| {
            !(existing.workspace_id == row.workspace_id
                && existing.entity_id == row.entity_id
                && existing.date == row.date)
        });
        rows.push(row);
    }

    pub fn insert_batch(&self, batch: Vec<FactRow>) {
        for row in batch {
            self.insert(row);
        }
    }

    fn aggregate<K: Ord>(
        &self,
        query: &FactQuery,
        key: impl Fn(&FactRow) -> K,
    ) -> BTreeMap<K, BaseTotals> {
        let rows = self.rows.read();
        let mut groups: BTreeMap<K, BaseTotals> = BTreeMap::new();
        for row in rows.iter().filter(|row| query.matches(row)) {
            groups
                .entry(key(row))
                .or_default()
                .merge(&row.measures);
        }
        groups
    }
}

#[async_trait]
impl FactStore for MemoryFactStore {
    async fn totals(&self, query: &FactQuery) -> StoreResult<BaseTotals> {
        let rows = self.rows.read();
        let mut totals = BaseTotals::new();
        for row in rows.iter().filter(|row| query.matches(row)) {
            totals.merge(&row.measures);
        }
        Ok(totals)
    }

    async fn totals_by_day(&self, query: &FactQuery) -> StoreResult<Vec<DailyTotals>> {
        Ok(self
            .aggregate(query, |row| row.date)
            .into_iter()
            .map(|(date, totals)| DailyTotals { date, totals })
            .collect())
    }

    async fn totals_by_entity(&self, query: &FactQuery) -> StoreResult<Vec<EntityTotals>> {
        Ok(self
            .aggregate(query, |row| row.entity_id)
            .into_iter()
            .map(|(entity_id, totals)| EntityTotals { entity_id, totals })
            .collect())
    }

    async fn totals_by_provider(&self, query: &FactQuery) -> StoreResult<Vec<ProviderTotals>> {
        Ok(self
            .aggregate(query, |row| row.provider)
            .into_iter()
            .map(|(provider, totals)| ProviderTotals { provider, totals })
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryEntityStore {
    workspaces: RwLock<HashMap<Uuid, Vec<AdEntity>>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entity: AdEntity) {
        let mut workspaces = self.workspaces.write();
        workspaces
            .entry(entity.workspace_id)
            .or_default()
            .push(entity);
    }

    pub fn insert_batch(&self, batch: Vec<AdEntity>) {
        for entity in batch {
            self.insert(entity);
        }
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn list_entities(&self, workspace_id: Uuid) -> StoreResult<Vec<AdEntity>> {
        let workspaces = self.workspaces.read();
        Ok(workspaces.get(&workspace_id).cloned().unwrap_or_default())
    }
}

/// Build a fact row with the given measures, defaulting the attribution
/// columns.
#[cfg(test)]
pub(crate) fn fact_row(
    workspace_id: Uuid,
    entity_id: Uuid,
    date: chrono::NaiveDate,
    measures: BaseTotals,
) -> FactRow {
    use crate::models::{EntityLevel, EntityStatus};

    FactRow {
        workspace_id,
        entity_id,
        date,
        provider: AdProvider::Meta,
        level: EntityLevel::Ad,
        status: EntityStatus::Active,
        entity_name: format!("entity-{entity_id}"),
        measures,
    }
}
