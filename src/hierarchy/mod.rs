//! Entity hierarchy resolution.
//!
//! Resolves a named-entity filter to the set of leaf entities whose facts
//! must be summed, and re-routes breakdowns that would group a singular
//! entity by its own level.

mod catalog;

use std::sync::Arc;

use uuid::Uuid;

pub use catalog::{CatalogCache, EntityCatalog};

use crate::{
    models::{BreakdownDimension, EntityLevel},
    store::{EntityStore, StoreResult},
};

/// A named entity resolved to its rollup scope.
#[derive(Debug, Clone)]
pub struct ResolvedEntity {
    pub entity_id: Uuid,
    pub name: String,
    pub level: EntityLevel,
    /// Entities whose fact rows are summed for this entity: its childless
    /// descendants, or the entity itself when it is a leaf. The entity's
    /// own id never appears alongside descendants.
    pub fact_ids: Vec<Uuid>,
}

/// Outcome of a named-entity lookup.
#[derive(Debug, Clone)]
pub enum NameResolution {
    /// A hierarchy entity matched; aggregate over its rollup scope.
    Entity(ResolvedEntity),
    /// Nothing matched; degrade to a literal substring filter on the
    /// denormalized entity name. Non-fatal by design.
    Fallback(String),
}

pub struct EntityHierarchyResolver {
    store: Arc<dyn EntityStore>,
    cache: CatalogCache,
}

impl EntityHierarchyResolver {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            cache: CatalogCache::new(),
        }
    }

    /// Fetch the workspace catalog, building and caching it on a miss.
    pub async fn catalog(&self, workspace_id: Uuid) -> StoreResult<Arc<EntityCatalog>> {
        if let Some(catalog) = self.cache.get(workspace_id) {
            return Ok(catalog);
        }
        let entities = self.store.list_entities(workspace_id).await?;
        let catalog = Arc::new(EntityCatalog::build(workspace_id, entities));
        self.cache.store(Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Drop the cached catalog for a workspace after a hierarchy write.
    pub fn invalidate(&self, workspace_id: Uuid) {
        self.cache.invalidate(workspace_id);
    }

    /// Resolve a name filter against the catalog.
    ///
    /// An exact (case-insensitive) name match wins over a substring match.
    /// Among equally good matches the shallowest entity is preferred, ties
    /// broken by name then id so resolution is deterministic.
    pub fn resolve_name(&self, catalog: &EntityCatalog, name: &str) -> NameResolution {
        let needle = name.to_lowercase();

        let mut exact = Vec::new();
        let mut partial = Vec::new();
        for entity in catalog.iter() {
            let candidate = entity.name.to_lowercase();
            if candidate == needle {
                exact.push(entity);
            } else if candidate.contains(&needle) {
                partial.push(entity);
            }
        }

        let pool = if exact.is_empty() { partial } else { exact };
        let Some(best) = pool
            .into_iter()
            .min_by_key(|e| (e.level.depth(), e.name.clone(), e.id))
        else {
            tracing::warn!(filter = name, "entity name did not resolve; falling back to substring match");
            return NameResolution::Fallback(name.to_string());
        };

        let fact_ids = if catalog.has_children(best.id) {
            catalog.leaf_descendants(best.id).to_vec()
        } else {
            vec![best.id]
        };

        NameResolution::Entity(ResolvedEntity {
            entity_id: best.id,
            name: best.name.clone(),
            level: best.level,
            fact_ids,
        })
    }

    /// Re-route a breakdown that targets the matched entity's own level.
    ///
    /// Breaking a single named campaign down "by campaign" is meaningless,
    /// so the breakdown shifts one level deeper (campaign -> adset,
    /// adset -> ad). Ad-level matches have nothing deeper and keep the
    /// requested dimension.
    pub fn reroute_breakdown(
        resolved: &ResolvedEntity,
        breakdown: Option<BreakdownDimension>,
    ) -> Option<BreakdownDimension> {
        let requested = breakdown?;
        let level = requested.entity_level()?;
        if level != resolved.level {
            return Some(requested);
        }
        match resolved.level.child() {
            Some(EntityLevel::Adset) => Some(BreakdownDimension::Adset),
            Some(EntityLevel::Ad) => Some(BreakdownDimension::Ad),
            _ => Some(requested),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{AdEntity, AdProvider, EntityStatus},
        store::memory::MemoryEntityStore,
    };

    fn entity(
        ws: Uuid,
        parent: Option<Uuid>,
        name: &str,
        level: EntityLevel,
    ) -> AdEntity {
        AdEntity {
            id: Uuid::new_v4(),
            workspace_id: ws,
            parent_id: parent,
            name: name.to_string(),
            level,
            status: EntityStatus::Active,
            provider: AdProvider::Meta,
        }
    }

    fn resolver_with(entities: Vec<AdEntity>) -> (EntityHierarchyResolver, Uuid) {
        let ws = entities
            .first()
            .map(|e| e.workspace_id)
            .unwrap_or_else(Uuid::new_v4);
        let store = MemoryEntityStore::new();
        store.insert_batch(entities);
        (EntityHierarchyResolver::new(Arc::new(store)), ws)
    }

    #[tokio::test]
    async fn exact_match_beats_partial_match() {
        let ws = Uuid::new_v4();
        let sale = entity(ws, None, "Sale", EntityLevel::Campaign);
        let summer = entity(ws, None, "Summer Sale", EntityLevel::Campaign);
        let sale_id = sale.id;
        let (resolver, _) = resolver_with(vec![sale, summer]);

        let catalog = resolver.catalog(ws).await.unwrap();
        match resolver.resolve_name(&catalog, "sale") {
            NameResolution::Entity(resolved) => assert_eq!(resolved.entity_id, sale_id),
            NameResolution::Fallback(_) => panic!("expected entity match"),
        }
    }

    #[tokio::test]
    async fn ancestor_resolves_to_leaf_descendants_without_itself() {
        let ws = Uuid::new_v4();
        let campaign = entity(ws, None, "Brand", EntityLevel::Campaign);
        let campaign_id = campaign.id;
        let adset = entity(ws, Some(campaign_id), "Lookalike", EntityLevel::Adset);
        let adset_id = adset.id;
        let ad_a = entity(ws, Some(adset_id), "Video A", EntityLevel::Ad);
        let ad_b = entity(ws, Some(adset_id), "Video B", EntityLevel::Ad);
        let mut expected = vec![ad_a.id, ad_b.id];
        expected.sort();

        let (resolver, _) = resolver_with(vec![campaign, adset, ad_a, ad_b]);
        let catalog = resolver.catalog(ws).await.unwrap();

        match resolver.resolve_name(&catalog, "brand") {
            NameResolution::Entity(resolved) => {
                assert_eq!(resolved.entity_id, campaign_id);
                assert_eq!(resolved.fact_ids, expected);
                assert!(!resolved.fact_ids.contains(&campaign_id));
                assert!(!resolved.fact_ids.contains(&adset_id));
            }
            NameResolution::Fallback(_) => panic!("expected entity match"),
        }
    }

    #[tokio::test]
    async fn leaf_match_resolves_to_itself() {
        let ws = Uuid::new_v4();
        let ad = entity(ws, None, "Standalone Ad", EntityLevel::Ad);
        let ad_id = ad.id;
        let (resolver, _) = resolver_with(vec![ad]);
        let catalog = resolver.catalog(ws).await.unwrap();

        match resolver.resolve_name(&catalog, "standalone") {
            NameResolution::Entity(resolved) => assert_eq!(resolved.fact_ids, vec![ad_id]),
            NameResolution::Fallback(_) => panic!("expected entity match"),
        }
    }

    #[tokio::test]
    async fn unresolved_name_degrades_to_substring_filter() {
        let ws = Uuid::new_v4();
        let (resolver, _) = resolver_with(vec![entity(ws, None, "Brand", EntityLevel::Campaign)]);
        let catalog = resolver.catalog(ws).await.unwrap();

        match resolver.resolve_name(&catalog, "does-not-exist") {
            NameResolution::Fallback(filter) => assert_eq!(filter, "does-not-exist"),
            NameResolution::Entity(_) => panic!("expected fallback"),
        }
    }

    #[test]
    fn breakdown_at_matched_level_shifts_down() {
        let resolved = ResolvedEntity {
            entity_id: Uuid::new_v4(),
            name: "Brand".to_string(),
            level: EntityLevel::Campaign,
            fact_ids: Vec::new(),
        };
        assert_eq!(
            EntityHierarchyResolver::reroute_breakdown(
                &resolved,
                Some(BreakdownDimension::Campaign)
            ),
            Some(BreakdownDimension::Adset)
        );
        // Different levels and time buckets pass through untouched.
        assert_eq!(
            EntityHierarchyResolver::reroute_breakdown(&resolved, Some(BreakdownDimension::Ad)),
            Some(BreakdownDimension::Ad)
        );
        assert_eq!(
            EntityHierarchyResolver::reroute_breakdown(&resolved, Some(BreakdownDimension::Day)),
            Some(BreakdownDimension::Day)
        );
        assert_eq!(
            EntityHierarchyResolver::reroute_breakdown(&resolved, None),
            None
        );

        let adset = ResolvedEntity {
            level: EntityLevel::Adset,
            ..resolved.clone()
        };
        assert_eq!(
            EntityHierarchyResolver::reroute_breakdown(&adset, Some(BreakdownDimension::Adset)),
            Some(BreakdownDimension::Ad)
        );

        let ad = ResolvedEntity {
            level: EntityLevel::Ad,
            ..resolved
        };
        assert_eq!(
            EntityHierarchyResolver::reroute_breakdown(&ad, Some(BreakdownDimension::Ad)),
            Some(BreakdownDimension::Ad)
        );
    }

    #[tokio::test]
    async fn catalog_cache_hits_until_invalidated() {
        let ws = Uuid::new_v4();
        let store = Arc::new(MemoryEntityStore::new());
        store.insert(entity(ws, None, "Brand", EntityLevel::Campaign));
        let resolver = EntityHierarchyResolver::new(Arc::clone(&store) as Arc<dyn EntityStore>);

        let first = resolver.catalog(ws).await.unwrap();
        assert_eq!(first.iter().count(), 1);

        // A write without invalidation is not yet visible.
        store.insert(entity(ws, None, "Second", EntityLevel::Campaign));
        let stale = resolver.catalog(ws).await.unwrap();
        assert_eq!(stale.iter().count(), 1);

        resolver.invalidate(ws);
        let fresh = resolver.catalog(ws).await.unwrap();
        assert_eq!(fresh.iter().count(), 2);
    }
}
