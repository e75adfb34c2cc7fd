// Pricing Rules - Rules as Data
// Analyst-configurable pricing rules, loaded from JSON and resolved into an
// immutable per-location value for each run. No process-wide mutable state:
// the resolved rules are passed explicitly into the pipeline.

use crate::error::PricingError;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Static target used when a location configures nothing.
pub const DEFAULT_STATIC_TARGET_PCT: f64 = 70.0;

/// Margin multiplier used when a location configures nothing.
pub const DEFAULT_MARGIN_OF_SAFETY: f64 = 1.5;

// ============================================================================
// TIERS
// ============================================================================

/// One occupancy tier: occupancy in `[lower_bound, upper_bound)` applies
/// `multiplier` to the breakeven price. The final tier is inclusive at 100.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OccupancyTier {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub multiplier: f64,
}

/// The default tier table: under-occupied locations get discounted prices,
/// crowded ones a premium.
pub fn default_tiers() -> Vec<OccupancyTier> {
    vec![
        OccupancyTier {
            lower_bound: 0.0,
            upper_bound: 20.0,
            multiplier: 0.8,
        },
        OccupancyTier {
            lower_bound: 20.0,
            upper_bound: 40.0,
            multiplier: 0.9,
        },
        OccupancyTier {
            lower_bound: 40.0,
            upper_bound: 60.0,
            multiplier: 1.0,
        },
        OccupancyTier {
            lower_bound: 60.0,
            upper_bound: 80.0,
            multiplier: 1.05,
        },
        OccupancyTier {
            lower_bound: 80.0,
            upper_bound: 100.0,
            multiplier: 1.1,
        },
    ]
}

/// Check a tier list is ordered and covers [0,100] with no gaps.
pub fn validate_tiers(tiers: &[OccupancyTier]) -> std::result::Result<(), String> {
    if tiers.is_empty() {
        return Err("tier list is empty".to_string());
    }

    if tiers[0].lower_bound != 0.0 {
        return Err(format!(
            "first tier starts at {} instead of 0",
            tiers[0].lower_bound
        ));
    }

    let mut expected_lower = 0.0;
    for tier in tiers {
        if tier.lower_bound != expected_lower {
            return Err(format!(
                "gap or overlap at occupancy {} (tier starts at {})",
                expected_lower, tier.lower_bound
            ));
        }
        if tier.upper_bound <= tier.lower_bound {
            return Err(format!(
                "tier [{}, {}) is empty or inverted",
                tier.lower_bound, tier.upper_bound
            ));
        }
        if !tier.multiplier.is_finite() || tier.multiplier <= 0.0 {
            return Err(format!(
                "tier [{}, {}) has invalid multiplier {}",
                tier.lower_bound, tier.upper_bound, tier.multiplier
            ));
        }
        expected_lower = tier.upper_bound;
    }

    if expected_lower != 100.0 {
        return Err(format!("tiers end at {} instead of 100", expected_lower));
    }

    Ok(())
}

// ============================================================================
// SMART TARGET RANGES
// ============================================================================

/// A percentage-reduction interval for smart targets, e.g. 3-7%.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ReductionRange {
    pub min_reduction_pct: f64,
    pub max_reduction_pct: f64,
}

impl ReductionRange {
    pub fn new(min_reduction_pct: f64, max_reduction_pct: f64) -> Self {
        ReductionRange {
            min_reduction_pct,
            max_reduction_pct,
        }
    }

    /// Range for locations running above breakeven: 3-7%.
    pub fn default_profitable() -> Self {
        ReductionRange::new(3.0, 7.0)
    }

    /// Range for locations running below breakeven: 3-10%.
    pub fn default_losing() -> Self {
        ReductionRange::new(3.0, 10.0)
    }

    pub fn is_valid(&self) -> bool {
        self.min_reduction_pct.is_finite()
            && self.max_reduction_pct.is_finite()
            && self.min_reduction_pct >= 0.0
            && self.min_reduction_pct <= self.max_reduction_pct
    }

    pub fn clamp(&self, reduction_pct: f64) -> f64 {
        reduction_pct.clamp(self.min_reduction_pct, self.max_reduction_pct)
    }
}

// ============================================================================
// CONFIG FILE SHAPE
// ============================================================================

/// Per-location section of the rules file. Everything is optional; absent
/// fields resolve from the top-level defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationRulesEntry {
    pub static_target_breakeven_occupancy: Option<f64>,
    pub smart_target_enabled: Option<bool>,
    pub margin_of_safety_multiplier: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub occupancy_tiers: Option<Vec<OccupancyTier>>,
}

/// The whole rules file: top-level defaults plus per-location entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default = "default_static_target")]
    pub static_target_breakeven_occupancy: f64,

    #[serde(default)]
    pub smart_target_enabled: bool,

    #[serde(default = "ReductionRange::default_profitable")]
    pub smart_target_profitable_range: ReductionRange,

    #[serde(default = "ReductionRange::default_losing")]
    pub smart_target_losing_range: ReductionRange,

    #[serde(default = "default_margin")]
    pub margin_of_safety_multiplier: f64,

    #[serde(default = "default_tiers")]
    pub occupancy_tiers: Vec<OccupancyTier>,

    #[serde(default)]
    pub locations: HashMap<String, LocationRulesEntry>,
}

fn default_static_target() -> f64 {
    DEFAULT_STATIC_TARGET_PCT
}

fn default_margin() -> f64 {
    DEFAULT_MARGIN_OF_SAFETY
}

impl Default for RulesConfig {
    fn default() -> Self {
        RulesConfig {
            static_target_breakeven_occupancy: DEFAULT_STATIC_TARGET_PCT,
            smart_target_enabled: false,
            smart_target_profitable_range: ReductionRange::default_profitable(),
            smart_target_losing_range: ReductionRange::default_losing(),
            margin_of_safety_multiplier: DEFAULT_MARGIN_OF_SAFETY,
            occupancy_tiers: default_tiers(),
            locations: HashMap::new(),
        }
    }
}

// ============================================================================
// RESOLVED RULES
// ============================================================================

/// Fully resolved rules for one location: no options left, safe to hand to
/// the calculator. Read-only for the rest of the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingRules {
    pub static_target_breakeven_occupancy: f64,
    pub smart_target_enabled: bool,
    pub smart_target_profitable_range: ReductionRange,
    pub smart_target_losing_range: ReductionRange,
    pub margin_of_safety_multiplier: f64,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub occupancy_tiers: Vec<OccupancyTier>,
}

impl RulesConfig {
    /// Load the rules file from JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let config: RulesConfig =
            serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        Ok(config)
    }

    /// Resolve the rules for one location.
    ///
    /// Recoverable configuration problems fall back to safe defaults: a
    /// malformed tier table resolves to the default tiers, an invalid
    /// static target to the default target. `min_price > max_price` has no
    /// safe default and fails the location.
    pub fn resolve(&self, location: &str) -> std::result::Result<PricingRules, PricingError> {
        let entry = self.locations.get(location).cloned().unwrap_or_default();

        let min_price = entry.min_price;
        let max_price = entry.max_price;
        if let (Some(min), Some(max)) = (min_price, max_price) {
            if min > max {
                return Err(PricingError::Configuration {
                    location: location.to_string(),
                    reason: format!("min_price {} exceeds max_price {}", min, max),
                });
            }
        }

        let mut static_target = entry
            .static_target_breakeven_occupancy
            .unwrap_or(self.static_target_breakeven_occupancy);
        if !static_target.is_finite() || static_target <= 0.0 || static_target > 100.0 {
            static_target = DEFAULT_STATIC_TARGET_PCT;
        }

        let mut margin = entry
            .margin_of_safety_multiplier
            .unwrap_or(self.margin_of_safety_multiplier);
        if !margin.is_finite() || margin <= 0.0 {
            margin = DEFAULT_MARGIN_OF_SAFETY;
        }

        let tiers = entry
            .occupancy_tiers
            .unwrap_or_else(|| self.occupancy_tiers.clone());
        let tiers = match validate_tiers(&tiers) {
            Ok(()) => tiers,
            Err(_) => default_tiers(),
        };

        let profitable = if self.smart_target_profitable_range.is_valid() {
            self.smart_target_profitable_range
        } else {
            ReductionRange::default_profitable()
        };
        let losing = if self.smart_target_losing_range.is_valid() {
            self.smart_target_losing_range
        } else {
            ReductionRange::default_losing()
        };

        Ok(PricingRules {
            static_target_breakeven_occupancy: static_target,
            smart_target_enabled: entry.smart_target_enabled.unwrap_or(self.smart_target_enabled),
            smart_target_profitable_range: profitable,
            smart_target_losing_range: losing,
            margin_of_safety_multiplier: margin,
            min_price,
            max_price,
            occupancy_tiers: tiers,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
