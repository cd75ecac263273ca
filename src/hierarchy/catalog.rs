//! Workspace entity catalog.
//!
//! An arena of entities plus precomputed child and leaf-descendant indexes,
//! so rollup lookups on the aggregation hot path never walk the tree.

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{AdEntity, EntityLevel};

pub struct EntityCatalog {
    workspace_id: Uuid,
    entities: HashMap<Uuid, AdEntity>,
    children: HashMap<Uuid, Vec<Uuid>>,
    leaf_descendants: HashMap<Uuid, Vec<Uuid>>,
}

impl EntityCatalog {
    /// Index a workspace's entity list.
    ///
    /// Entities whose parent is missing from the list are treated as roots;
    /// a partially synced hierarchy must not poison lookups.
    pub fn build(workspace_id: Uuid, entities: Vec<AdEntity>) -> Self {
        let mut arena: HashMap<Uuid, AdEntity> = HashMap::with_capacity(entities.len());
        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

        for entity in entities {
            if let Some(parent_id) = entity.parent_id {
                children.entry(parent_id).or_default().push(entity.id);
            }
            arena.insert(entity.id, entity);
        }
        for ids in children.values_mut() {
            ids.sort();
        }

        // Iterative DFS per non-leaf node; the tree is three levels deep so
        // the total work stays linear in practice.
        let mut leaf_descendants: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for id in arena.keys() {
            if !children.contains_key(id) {
                continue;
            }
            let mut leaves = Vec::new();
            let mut stack = vec![*id];
            while let Some(current) = stack.pop() {
                match children.get(&current) {
                    Some(child_ids) => stack.extend(child_ids.iter().copied()),
                    None => {
                        if current != *id {
                            leaves.push(current);
                        }
                    }
                }
            }
            leaves.sort();
            leaf_descendants.insert(*id, leaves);
        }

        Self {
            workspace_id,
            entities: arena,
            children,
            leaf_descendants,
        }
    }

    pub fn workspace_id(&self) -> Uuid {
        self.workspace_id
    }

    pub fn get(&self, id: Uuid) -> Option<&AdEntity> {
        self.entities.get(&id)
    }

    pub fn has_children(&self, id: Uuid) -> bool {
        self.children.contains_key(&id)
    }

    /// Childless descendants of an entity, sorted by id. The entity itself
    /// is never included, even when it has recorded facts of its own.
    pub fn leaf_descendants(&self, id: Uuid) -> &[Uuid] {
        self.leaf_descendants
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Entities whose facts count toward rollups: those without children.
    /// Ancestor-level fact rows are excluded everywhere to avoid double
    /// counting when both ancestor and leaf facts exist for a period.
    pub fn countable(&self) -> impl Iterator<Item = &AdEntity> {
        self.entities
            .values()
            .filter(|entity| !self.children.contains_key(&entity.id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AdEntity> {
        self.entities.values()
    }

    /// Map an entity to its ancestor at `level` for breakdown grouping.
    ///
    /// Returns None for entities above the target level and for entities at
    /// the target level whose facts are carried by their descendants.
    pub fn rollup_ancestor(&self, id: Uuid, level: EntityLevel) -> Option<Uuid> {
        let entity = self.get(id)?;
        if entity.level == level {
            return (!self.has_children(id)).then_some(id);
        }
        if entity.level.depth() < level.depth() {
            return None;
        }

        let mut current = entity;
        while let Some(parent_id) = current.parent_id {
            let parent = self.get(parent_id)?;
            if parent.level == level {
                return Some(parent.id);
            }
            current = parent;
        }
        None
    }
}

/// Workspace-scoped catalog cache.
///
/// Read-mostly; writers to the hierarchy store must call `invalidate` for
/// the touched workspace. A briefly stale catalog is recomputed on the next
/// miss with no correctness impact.
#[derive(Default)]
pub struct CatalogCache {
    inner: DashMap<Uuid, Arc<EntityCatalog>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, workspace_id: Uuid) -> Option<Arc<EntityCatalog>> {
        self.inner.get(&workspace_id).map(|c| Arc::clone(&c))
    }

    pub fn store(&self, catalog: Arc<EntityCatalog>) {
        self.inner.insert(catalog.workspace_id(), catalog);
    }

    pub fn invalidate(&self, workspace_id: Uuid) {
        self.inner.remove(&workspace_id);
    }

    pub fn invalidate_all(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdProvider, EntityStatus};

    fn entity(ws: Uuid, id: Uuid, parent: Option<Uuid>, name: &str, level: EntityLevel) -> AdEntity {
        AdEntity {
            id,
            workspace_id: ws,
            parent_id: parent,
            name: name.to_string(),
            level,
            status: EntityStatus::Active,
            provider: AdProvider::Meta,
        }
    }

    /// campaign -> {adset -> {ad1, ad2}, ad3 directly under campaign}
    fn sample() -> (Uuid, Uuid, Uuid, Uuid, Uuid, Uuid, EntityCatalog) {
        let ws = Uuid::new_v4();
        let campaign = Uuid::new_v4();
        let adset = Uuid::new_v4();
        let ad1 = Uuid::new_v4();
        let ad2 = Uuid::new_v4();
        let ad3 = Uuid::new_v4();
        let catalog = EntityCatalog::build(
            ws,
            vec![
                entity(ws, campaign, None, "Brand Awareness", EntityLevel::Campaign),
                entity(ws, adset, Some(campaign), "Lookalike", EntityLevel::Adset),
                entity(ws, ad1, Some(adset), "Video A", EntityLevel::Ad),
                entity(ws, ad2, Some(adset), "Video B", EntityLevel::Ad),
                entity(ws, ad3, Some(campaign), "Static C", EntityLevel::Ad),
            ],
        );
        (ws, campaign, adset, ad1, ad2, ad3, catalog)
    }

    #[test]
    fn leaf_descendants_exclude_the_ancestor_itself() {
        let (_, campaign, adset, ad1, ad2, ad3, catalog) = sample();

        let mut expected = vec![ad1, ad2, ad3];
        expected.sort();
        assert_eq!(catalog.leaf_descendants(campaign), expected.as_slice());

        let mut adset_leaves = vec![ad1, ad2];
        adset_leaves.sort();
        assert_eq!(catalog.leaf_descendants(adset), adset_leaves.as_slice());
        assert!(!catalog.leaf_descendants(campaign).contains(&campaign));
        assert!(catalog.leaf_descendants(ad1).is_empty());
    }

    #[test]
    fn countable_set_is_the_childless_entities() {
        let (_, campaign, adset, _, _, _, catalog) = sample();
        let countable: Vec<Uuid> = catalog.countable().map(|e| e.id).collect();
        assert_eq!(countable.len(), 3);
        assert!(!countable.contains(&campaign));
        assert!(!countable.contains(&adset));
    }

    #[test]
    fn rollup_ancestor_walks_to_the_requested_level() {
        let (_, campaign, adset, ad1, _, ad3, catalog) = sample();

        assert_eq!(
            catalog.rollup_ancestor(ad1, EntityLevel::Campaign),
            Some(campaign)
        );
        assert_eq!(catalog.rollup_ancestor(ad1, EntityLevel::Adset), Some(adset));
        assert_eq!(catalog.rollup_ancestor(ad1, EntityLevel::Ad), Some(ad1));
        // ad3 sits directly under the campaign; it has no adset ancestor.
        assert_eq!(catalog.rollup_ancestor(ad3, EntityLevel::Adset), None);
        // An ancestor with children never groups as itself.
        assert_eq!(catalog.rollup_ancestor(campaign, EntityLevel::Campaign), None);
        // Entities above the target level have no ancestor there.
        assert_eq!(catalog.rollup_ancestor(campaign, EntityLevel::Ad), None);
    }

    #[test]
    fn childless_campaign_counts_as_itself() {
        let ws = Uuid::new_v4();
        let lone = Uuid::new_v4();
        let catalog = EntityCatalog::build(
            ws,
            vec![entity(ws, lone, None, "Lone", EntityLevel::Campaign)],
        );
        assert_eq!(
            catalog.rollup_ancestor(lone, EntityLevel::Campaign),
            Some(lone)
        );
        assert_eq!(catalog.countable().count(), 1);
    }

    #[test]
    fn cache_invalidation_removes_the_workspace() {
        let (ws, _, _, _, _, _, catalog) = sample();
        let cache = CatalogCache::new();
        assert!(cache.is_empty());

        cache.store(Arc::new(catalog));
        assert!(cache.get(ws).is_some());
        assert_eq!(cache.len(), 1);

        cache.invalidate(ws);
        assert!(cache.get(ws).is_none());

        let (other_ws, _, _, _, _, _, other) = sample();
        cache.store(Arc::new(other));
        cache.invalidate_all();
        assert!(cache.get(other_ws).is_none());
    }
}
