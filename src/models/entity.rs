use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A node in a workspace's ad-entity tree.
///
/// Entities form a parent-pointer tree: campaigns own ad sets, ad sets own
/// ads. Some providers report additional leaf types; those are modelled as
/// ad-level entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdEntity {
    pub id: Uuid,
    pub workspace_id: Uuid,
    /// None for campaigns (tree roots).
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub level: EntityLevel,
    pub status: EntityStatus,
    pub provider: AdProvider,
}

/// Hierarchy level of an ad entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityLevel {
    Campaign,
    Adset,
    Ad,
}

impl EntityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityLevel::Campaign => "campaign",
            EntityLevel::Adset => "adset",
            EntityLevel::Ad => "ad",
        }
    }

    /// The next level down the tree, if any.
    pub fn child(&self) -> Option<EntityLevel> {
        match self {
            EntityLevel::Campaign => Some(EntityLevel::Adset),
            EntityLevel::Adset => Some(EntityLevel::Ad),
            EntityLevel::Ad => None,
        }
    }

    /// Depth from the root: campaign = 0, adset = 1, ad = 2.
    pub fn depth(&self) -> u8 {
        match self {
            EntityLevel::Campaign => 0,
            EntityLevel::Adset => 1,
            EntityLevel::Ad => 2,
        }
    }
}

impl std::fmt::Display for EntityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of an ad entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Active,
    Paused,
    Archived,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Active => "active",
            EntityStatus::Paused => "paused",
            EntityStatus::Archived => "archived",
        }
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ad platform an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdProvider {
    Google,
    Meta,
    Tiktok,
    Linkedin,
    Other,
}

impl AdProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdProvider::Google => "google",
            AdProvider::Meta => "meta",
            AdProvider::Tiktok => "tiktok",
            AdProvider::Linkedin => "linkedin",
            AdProvider::Other => "other",
        }
    }

    /// Unknown provider strings collapse to `Other` rather than failing;
    /// fact rows written by older ingest versions must stay readable.
    pub fn parse(s: &str) -> AdProvider {
        match s {
            "google" => AdProvider::Google,
            "meta" => AdProvider::Meta,
            "tiktok" => AdProvider::Tiktok,
            "linkedin" => AdProvider::Linkedin,
            _ => AdProvider::Other,
        }
    }
}

impl std::fmt::Display for AdProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
