//! Typed metric registry.
//!
//! Every derived metric maps to a fixed record of required base measures, a
//! zero-guarded compute function, and an "inverse" flag (lower is better).
//! Planning iterates the record to collect measures; execution reuses the
//! same record to derive values, so formula and dependency set can never
//! drift apart.

use serde::{Deserialize, Serialize};

/// A directly-stored, summable quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseMeasure {
    Spend,
    Revenue,
    Clicks,
    Impressions,
    Conversions,
    Leads,
    Installs,
    Purchases,
    Visitors,
    Profit,
}

impl BaseMeasure {
    /// Canonical measure order; also the deterministic order of dependency
    /// unions.
    pub const ALL: [BaseMeasure; 10] = [
        BaseMeasure::Spend,
        BaseMeasure::Revenue,
        BaseMeasure::Clicks,
        BaseMeasure::Impressions,
        BaseMeasure::Conversions,
        BaseMeasure::Leads,
        BaseMeasure::Installs,
        BaseMeasure::Purchases,
        BaseMeasure::Visitors,
        BaseMeasure::Profit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BaseMeasure::Spend => "spend",
            BaseMeasure::Revenue => "revenue",
            BaseMeasure::Clicks => "clicks",
            BaseMeasure::Impressions => "impressions",
            BaseMeasure::Conversions => "conversions",
            BaseMeasure::Leads => "leads",
            BaseMeasure::Installs => "installs",
            BaseMeasure::Purchases => "purchases",
            BaseMeasure::Visitors => "visitors",
            BaseMeasure::Profit => "profit",
        }
    }

    pub fn parse(s: &str) -> Option<BaseMeasure> {
        BaseMeasure::ALL.into_iter().find(|m| m.as_str() == s)
    }

    fn index(self) -> usize {
        match self {
            BaseMeasure::Spend => 0,
            BaseMeasure::Revenue => 1,
            BaseMeasure::Clicks => 2,
            BaseMeasure::Impressions => 3,
            BaseMeasure::Conversions => 4,
            BaseMeasure::Leads => 5,
            BaseMeasure::Installs => 6,
            BaseMeasure::Purchases => 7,
            BaseMeasure::Visitors => 8,
            BaseMeasure::Profit => 9,
        }
    }
}

impl std::fmt::Display for BaseMeasure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dense per-measure accumulator for a scope and date range.
///
/// Missing measures are zero; values are never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BaseTotals([f64; 10]);

impl BaseTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, measure: BaseMeasure) -> f64 {
        self.0[measure.index()]
    }

    pub fn set(&mut self, measure: BaseMeasure, value: f64) {
        self.0[measure.index()] = value;
    }

    pub fn add(&mut self, measure: BaseMeasure, value: f64) {
        self.0[measure.index()] += value;
    }

    /// Element-wise sum with another accumulator.
    pub fn merge(&mut self, other: &BaseTotals) {
        for (slot, value) in self.0.iter_mut().zip(other.0.iter()) {
            *slot += value;
        }
    }

    /// True when every measure is zero (no matching facts).
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }
}

impl FromIterator<(BaseMeasure, f64)> for BaseTotals {
    fn from_iter<I: IntoIterator<Item = (BaseMeasure, f64)>>(iter: I) -> Self {
        let mut totals = BaseTotals::new();
        for (measure, value) in iter {
            totals.add(measure, value);
        }
        totals
    }
}

/// A ratio/formula metric computed from base measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedMetric {
    Roas,
    Cpa,
    Cvr,
    Cpc,
    Cpm,
    Cpl,
    Cpi,
    Cpp,
    Poas,
    Arpv,
    Aov,
    Ctr,
}

/// Registry record for one derived metric.
pub struct MetricSpec {
    /// Base measures the formula reads.
    pub requires: &'static [BaseMeasure],
    /// Zero-guarded formula; a zero denominator yields `None`.
    pub compute: fn(&BaseTotals) -> Option<f64>,
    /// Lower value is the better outcome. Presentation metadata only;
    /// aggregation always sorts by literal value.
    pub inverse: bool,
}

/// Divide, guarding the denominator. The single chokepoint for every
/// ratio in the registry.
fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

use BaseMeasure::*;

impl DerivedMetric {
    pub const ALL: [DerivedMetric; 12] = [
        DerivedMetric::Roas,
        DerivedMetric::Cpa,
        DerivedMetric::Cvr,
        DerivedMetric::Cpc,
        DerivedMetric::Cpm,
        DerivedMetric::Cpl,
        DerivedMetric::Cpi,
        DerivedMetric::Cpp,
        DerivedMetric::Poas,
        DerivedMetric::Arpv,
        DerivedMetric::Aov,
        DerivedMetric::Ctr,
    ];

    pub fn spec(&self) -> MetricSpec {
        match self {
            DerivedMetric::Roas => MetricSpec {
                requires: &[Spend, Revenue],
                compute: |t| ratio(t.get(Revenue), t.get(Spend)),
                inverse: false,
            },
            DerivedMetric::Cpa => MetricSpec {
                requires: &[Spend, Conversions],
                compute: |t| ratio(t.get(Spend), t.get(Conversions)),
                inverse: true,
            },
            DerivedMetric::Cvr => MetricSpec {
                requires: &[Clicks, Conversions],
                compute: |t| ratio(t.get(Conversions), t.get(Clicks)),
                inverse: false,
            },
            DerivedMetric::Cpc => MetricSpec {
                requires: &[Spend, Clicks],
                compute: |t| ratio(t.get(Spend), t.get(Clicks)),
                inverse: true,
            },
            DerivedMetric::Cpm => MetricSpec {
                requires: &[Spend, Impressions],
                compute: |t| ratio(t.get(Spend), t.get(Impressions)).map(|v| v * 1000.0),
                inverse: true,
            },
            DerivedMetric::Cpl => MetricSpec {
                requires: &[Spend, Leads],
                compute: |t| ratio(t.get(Spend), t.get(Leads)),
                inverse: true,
            },
            DerivedMetric::Cpi => MetricSpec {
                requires: &[Spend, Installs],
                compute: |t| ratio(t.get(Spend), t.get(Installs)),
                inverse: true,
            },
            DerivedMetric::Cpp => MetricSpec {
                requires: &[Spend, Purchases],
                compute: |t| ratio(t.get(Spend), t.get(Purchases)),
                inverse: true,
            },
            DerivedMetric::Poas => MetricSpec {
                requires: &[Profit, Spend],
                compute: |t| ratio(t.get(Profit), t.get(Spend)),
                inverse: false,
            },
            DerivedMetric::Arpv => MetricSpec {
                requires: &[Revenue, Visitors],
                compute: |t| ratio(t.get(Revenue), t.get(Visitors)),
                inverse: false,
            },
            DerivedMetric::Aov => MetricSpec {
                requires: &[Revenue, Purchases],
                compute: |t| ratio(t.get(Revenue), t.get(Purchases)),
                inverse: false,
            },
            DerivedMetric::Ctr => MetricSpec {
                requires: &[Clicks, Impressions],
                compute: |t| ratio(t.get(Clicks), t.get(Impressions)),
                inverse: false,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DerivedMetric::Roas => "roas",
            DerivedMetric::Cpa => "cpa",
            DerivedMetric::Cvr => "cvr",
            DerivedMetric::Cpc => "cpc",
            DerivedMetric::Cpm => "cpm",
            DerivedMetric::Cpl => "cpl",
            DerivedMetric::Cpi => "cpi",
            DerivedMetric::Cpp => "cpp",
            DerivedMetric::Poas => "poas",
            DerivedMetric::Arpv => "arpv",
            DerivedMetric::Aov => "aov",
            DerivedMetric::Ctr => "ctr",
        }
    }

    pub fn parse(s: &str) -> Option<DerivedMetric> {
        DerivedMetric::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

impl std::fmt::Display for DerivedMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested metric: a base measure by name, or a derived formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Base(BaseMeasure),
    Derived(DerivedMetric),
}

impl MetricKind {
    /// Parse a metric name. Derived names shadow nothing: the two
    /// namespaces are disjoint.
    pub fn parse(s: &str) -> Option<MetricKind> {
        if let Some(derived) = DerivedMetric::parse(s) {
            return Some(MetricKind::Derived(derived));
        }
        BaseMeasure::parse(s).map(MetricKind::Base)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Base(measure) => measure.as_str(),
            MetricKind::Derived(derived) => derived.as_str(),
        }
    }

    /// Base measures this metric needs summed. A base metric depends only
    /// on itself.
    pub fn required_measures(&self) -> Vec<BaseMeasure> {
        match self {
            MetricKind::Base(measure) => vec![*measure],
            MetricKind::Derived(derived) => derived.spec().requires.to_vec(),
        }
    }

    /// Compute the metric from shared totals. Base metrics always yield a
    /// value (missing measures sum to zero); derived metrics yield `None`
    /// on a zero denominator.
    pub fn compute(&self, totals: &BaseTotals) -> Option<f64> {
        match self {
            MetricKind::Base(measure) => Some(totals.get(*measure)),
            MetricKind::Derived(derived) => (derived.spec().compute)(totals),
        }
    }

    pub fn is_inverse(&self) -> bool {
        match self {
            MetricKind::Base(_) => false,
            MetricKind::Derived(derived) => derived.spec().inverse,
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Union of base-measure dependencies across all requested metrics, in
/// canonical measure order. This union is what the aggregation engine
/// actually sums; derivation then happens per metric from the shared
/// totals.
pub fn required_measures(metrics: &[MetricKind]) -> Vec<BaseMeasure> {
    BaseMeasure::ALL
        .into_iter()
        .filter(|measure| {
            metrics
                .iter()
                .any(|metric| metric.required_measures().contains(measure))
        })
        .collect()
}
