//! SQLite-backed fact store.
//!
//! Queries are assembled from the independent predicate clauses of a
//! [`FactQuery`]; every SQL statement is bound at runtime so clause
//! combinations never multiply into per-combination methods.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{
    DailyTotals, EntityTotals, FactQuery, FactRow, FactStore, ProviderTotals, StoreError,
    StoreResult,
};
use crate::{
    metrics::{BaseMeasure, BaseTotals},
    models::AdProvider,
};

/// Summed measure columns shared by every aggregation query.
const MEASURE_SUM_COLS: &str = "\
    COALESCE(SUM(spend), 0.0) as spend, \
    COALESCE(SUM(revenue), 0.0) as revenue, \
    COALESCE(SUM(clicks), 0.0) as clicks, \
    COALESCE(SUM(impressions), 0.0) as impressions, \
    COALESCE(SUM(conversions), 0.0) as conversions, \
    COALESCE(SUM(leads), 0.0) as leads, \
    COALESCE(SUM(installs), 0.0) as installs, \
    COALESCE(SUM(purchases), 0.0) as purchases, \
    COALESCE(SUM(visitors), 0.0) as visitors, \
    COALESCE(SUM(profit), 0.0) as profit";

/// A deferred bind value for a dynamically assembled query.
enum Bind {
    Text(String),
    Date(NaiveDate),
}

/// Render the WHERE clause for a fact query and collect its binds in
/// placeholder order.
fn where_clause(query: &FactQuery) -> (String, Vec<Bind>) {
    let mut sql = String::from("workspace_id = ? AND date >= ? AND date <= ?");
    let mut binds = vec![
        Bind::Text(query.workspace_id.to_string()),
        Bind::Date(query.range.start),
        Bind::Date(query.range.end),
    ];

    if let Some(ids) = &query.entity_ids {
        if ids.is_empty() {
            // An explicit empty scope matches nothing.
            sql.push_str(" AND 1 = 0");
        } else {
            let placeholders = vec!["?"; ids.len()].join(", ");
            sql.push_str(&format!(" AND entity_id IN ({placeholders})"));
            binds.extend(ids.iter().map(|id| Bind::Text(id.to_string())));
        }
    }
    if let Some(provider) = query.provider {
        sql.push_str(" AND provider = ?");
        binds.push(Bind::Text(provider.as_str().to_string()));
    }
    if let Some(level) = query.level {
        sql.push_str(" AND level = ?");
        binds.push(Bind::Text(level.as_str().to_string()));
    }
    if let Some(status) = query.status {
        sql.push_str(" AND status = ?");
        binds.push(Bind::Text(status.as_str().to_string()));
    }
    if let Some(needle) = &query.name_contains {
        sql.push_str(" AND LOWER(entity_name) LIKE ?");
        binds.push(Bind::Text(format!("%{}%", needle.to_lowercase())));
    }

    (sql, binds)
}

fn apply_binds<'q>(
    mut stmt: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    binds: Vec<Bind>,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for bind in binds {
        stmt = match bind {
            Bind::Text(value) => stmt.bind(value),
            Bind::Date(value) => stmt.bind(value),
        };
    }
    stmt
}

fn totals_from_row(row: &sqlx::sqlite::SqliteRow) -> BaseTotals {
    BaseMeasure::ALL
        .into_iter()
        .map(|measure| (measure, row.get::<f64, _>(measure.as_str())))
        .collect()
}

pub struct SqliteFactStore {
    pool: SqlitePool,
}

impl SqliteFactStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL, e.g. `sqlite://facts.db` or
    /// `sqlite::memory:`.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run schema migrations. Must be called once before the first read or
    /// write on a fresh database.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Upsert one fact bucket; a re-ingested `(workspace, entity, date)`
    /// bucket replaces the previous values.
    pub async fn insert(&self, row: &FactRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO entity_facts (
                workspace_id, entity_id, date, provider, level, status, entity_name,
                spend, revenue, clicks, impressions, conversions,
                leads, installs, purchases, visitors, profit
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (workspace_id, entity_id, date) DO UPDATE SET
                provider = excluded.provider,
                level = excluded.level,
                status = excluded.status,
                entity_name = excluded.entity_name,
                spend = excluded.spend,
                revenue = excluded.revenue,
                clicks = excluded.clicks,
                impressions = excluded.impressions,
                conversions = excluded.conversions,
                leads = excluded.leads,
                installs = excluded.installs,
                purchases = excluded.purchases,
                visitors = excluded.visitors,
                profit = excluded.profit
            "#,
        )
        .bind(row.workspace_id.to_string())
        .bind(row.entity_id.to_string())
        .bind(row.date)
        .bind(row.provider.as_str())
        .bind(row.level.as_str())
        .bind(row.status.as_str())
        .bind(&row.entity_name)
        .bind(row.measures.get(BaseMeasure::Spend))
        .bind(row.measures.get(BaseMeasure::Revenue))
        .bind(row.measures.get(BaseMeasure::Clicks))
        .bind(row.measures.get(BaseMeasure::Impressions))
        .bind(row.measures.get(BaseMeasure::Conversions))
        .bind(row.measures.get(BaseMeasure::Leads))
        .bind(row.measures.get(BaseMeasure::Installs))
        .bind(row.measures.get(BaseMeasure::Purchases))
        .bind(row.measures.get(BaseMeasure::Visitors))
        .bind(row.measures.get(BaseMeasure::Profit))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upsert a batch of fact buckets inside one transaction.
    pub async fn insert_batch(&self, rows: &[FactRow]) -> StoreResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO entity_facts (
                    workspace_id, entity_id, date, provider, level, status, entity_name,
                    spend, revenue, clicks, impressions, conversions,
                    leads, installs, purchases, visitors, profit
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (workspace_id, entity_id, date) DO UPDATE SET
                    provider = excluded.provider,
                    level = excluded.level,
                    status = excluded.status,
                    entity_name = excluded.entity_name,
                    spend = excluded.spend,
                    revenue = excluded.revenue,
                    clicks = excluded.clicks,
                    impressions = excluded.impressions,
                    conversions = excluded.conversions,
                    leads = excluded.leads,
                    installs = excluded.installs,
                    purchases = excluded.purchases,
                    visitors = excluded.visitors,
                    profit = excluded.profit
                "#,
            )
            .bind(row.workspace_id.to_string())
            .bind(row.entity_id.to_string())
            .bind(row.date)
            .bind(row.provider.as_str())
            .bind(row.level.as_str())
            .bind(row.status.as_str())
            .bind(&row.entity_name)
            .bind(row.measures.get(BaseMeasure::Spend))
            .bind(row.measures.get(BaseMeasure::Revenue))
            .bind(row.measures.get(BaseMeasure::Clicks))
            .bind(row.measures.get(BaseMeasure::Impressions))
            .bind(row.measures.get(BaseMeasure::Conversions))
            .bind(row.measures.get(BaseMeasure::Leads))
            .bind(row.measures.get(BaseMeasure::Installs))
            .bind(row.measures.get(BaseMeasure::Purchases))
            .bind(row.measures.get(BaseMeasure::Visitors))
            .bind(row.measures.get(BaseMeasure::Profit))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(rows.len())
    }
}

#[async_trait]
impl FactStore for SqliteFactStore {
    async fn totals(&self, query: &FactQuery) -> StoreResult<BaseTotals> {
        let (clause, binds) = where_clause(query);
        let sql = format!("SELECT {MEASURE_SUM_COLS} FROM entity_facts WHERE {clause}");

        let row = apply_binds(sqlx::query(&sql), binds)
            .fetch_one(&self.pool)
            .await?;
        Ok(totals_from_row(&row))
    }

    async fn totals_by_day(&self, query: &FactQuery) -> StoreResult<Vec<DailyTotals>> {
        let (clause, binds) = where_clause(query);
        let sql = format!(
            "SELECT date, {MEASURE_SUM_COLS} FROM entity_facts \
             WHERE {clause} GROUP BY date ORDER BY date ASC"
        );

        let rows = apply_binds(sqlx::query(&sql), binds)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| DailyTotals {
                date: row.get("date"),
                totals: totals_from_row(row),
            })
            .collect())
    }

    async fn totals_by_entity(&self, query: &FactQuery) -> StoreResult<Vec<EntityTotals>> {
        let (clause, binds) = where_clause(query);
        let sql = format!(
            "SELECT entity_id, {MEASURE_SUM_COLS} FROM entity_facts \
             WHERE {clause} GROUP BY entity_id ORDER BY entity_id ASC"
        );

        let rows = apply_binds(sqlx::query(&sql), binds)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let raw: String = row.get("entity_id");
                let entity_id = Uuid::parse_str(&raw)
                    .map_err(|e| StoreError::Internal(format!("bad entity id {raw:?}: {e}")))?;
                Ok(EntityTotals {
                    entity_id,
                    totals: totals_from_row(row),
                })
            })
            .collect()
    }

    async fn totals_by_provider(&self, query: &FactQuery) -> StoreResult<Vec<ProviderTotals>> {
        let (clause, binds) = where_clause(query);
        let sql = format!(
            "SELECT provider, {MEASURE_SUM_COLS} FROM entity_facts \
             WHERE {clause} GROUP BY provider ORDER BY provider ASC"
        );

        let rows = apply_binds(sqlx::query(&sql), binds)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let raw: String = row.get("provider");
                ProviderTotals {
                    provider: AdProvider::parse(&raw),
                    totals: totals_from_row(row),
                }
            })
            .collect())
    }
}
