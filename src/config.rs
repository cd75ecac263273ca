use serde::{Deserialize, Serialize};

/// Engine limits configuration.
///
/// These limits bound query compilation; they are not per-workspace quotas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Window applied when a query carries no time range. Default: 7 days.
    #[serde(default = "default_range_days")]
    pub default_range_days: u32,

    /// Maximum relative window a query may request. Default: 365 days.
    #[serde(default = "default_max_range_days")]
    pub max_range_days: u32,

    /// Largest top_n the intent classifier still treats as a ranking.
    /// Breakdowns above this render as distributions instead. Default: 10.
    #[serde(default = "default_reasonable_top_n")]
    pub reasonable_top_n: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_range_days: default_range_days(),
            max_range_days: default_max_range_days(),
            reasonable_top_n: default_reasonable_top_n(),
        }
    }
}

fn default_range_days() -> u32 {
    7
}

fn default_max_range_days() -> u32 {
    365
}

/// Serde default for `MetricQuery::top_n`.
pub(crate) fn default_top_n() -> u32 {
    5
}

fn default_reasonable_top_n() -> u32 {
    10
}
