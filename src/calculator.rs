// Pricing Calculator
// Breakeven metrics, target resolution, and the price recommendation chain:
// breakeven price -> occupancy tier -> margin of safety -> business bounds.

use crate::error::PricingError;
use crate::merge::LocationSnapshot;
use crate::rules::{OccupancyTier, PricingRules, ReductionRange};
use serde::{Deserialize, Serialize};

/// Bottom price rounds the breakeven price up to this granularity.
pub const BOTTOM_PRICE_STEP: f64 = 50_000.0;

// ============================================================================
// TARGET MODE
// ============================================================================

/// How the target breakeven occupancy was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    /// Dynamically derived from current profitability.
    Smart,
    /// Taken from configuration (or the fallback when smart inputs fail).
    Static,
}

impl TargetMode {
    pub fn label(&self) -> &'static str {
        match self {
            TargetMode::Smart => "Smart Target",
            TargetMode::Static => "Static Target",
        }
    }
}

/// A resolved target: the occupancy percentage the price should break even
/// at, plus how it was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetResolution {
    pub target_pct: f64,
    pub mode: TargetMode,
}

// ============================================================================
// REDUCTION POLICY
// ============================================================================

/// Maps "how far occupancy sits from breakeven" to a reduction percentage
/// inside the configured range. Pluggable because the business has not
/// settled on one scaling curve.
pub trait ReductionPolicy {
    /// `distance_pct` is |occupancy - actual breakeven| in percentage
    /// points. Implementations must return a value the caller can clamp
    /// into `range`; larger distances must not produce smaller reductions.
    fn reduction_pct(&self, range: &ReductionRange, distance_pct: f64) -> f64;
}

/// Linear interpolation across the range. Distance saturates at 25
/// percentage points: anything farther from breakeven earns the maximum
/// reduction.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearPolicy;

impl LinearPolicy {
    const SATURATION_DISTANCE_PCT: f64 = 25.0;
}

impl ReductionPolicy for LinearPolicy {
    fn reduction_pct(&self, range: &ReductionRange, distance_pct: f64) -> f64 {
        let scale = (distance_pct / Self::SATURATION_DISTANCE_PCT).clamp(0.0, 1.0);
        range.min_reduction_pct + (range.max_reduction_pct - range.min_reduction_pct) * scale
    }
}

/// Fixed steps: near breakeven takes the minimum reduction, mid-distance the
/// midpoint, far the maximum.
#[derive(Debug, Clone, Copy, Default)]
pub struct SteppedPolicy;

impl SteppedPolicy {
    const NEAR_PCT: f64 = 15.0;
    const MID_PCT: f64 = 25.0;
}

impl ReductionPolicy for SteppedPolicy {
    fn reduction_pct(&self, range: &ReductionRange, distance_pct: f64) -> f64 {
        if distance_pct <= Self::NEAR_PCT {
            range.min_reduction_pct
        } else if distance_pct <= Self::MID_PCT {
            (range.min_reduction_pct + range.max_reduction_pct) / 2.0
        } else {
            range.max_reduction_pct
        }
    }
}

// ============================================================================
// BREAKEVEN
// ============================================================================

/// The occupancy at which current revenue covers current cost.
///
/// Fails when the sold price is unusable; the location is then skipped and
/// reported rather than priced on garbage.
pub fn actual_breakeven_occupancy(snapshot: &LocationSnapshot) -> Result<f64, PricingError> {
    let sold = snapshot.sold_price_per_seat_actual;
    if !sold.is_finite() || sold <= 0.0 {
        return Err(PricingError::InvalidInput {
            location: snapshot.name.clone(),
            field: "sold_price_per_seat_actual".to_string(),
            reason: format!("{} cannot support a breakeven calculation", sold),
        });
    }

    let pct = snapshot.avg_expense_3mo / sold / snapshot.total_seats as f64 * 100.0;
    if !pct.is_finite() {
        return Err(PricingError::InvalidInput {
            location: snapshot.name.clone(),
            field: "actual_breakeven_occupancy_pct".to_string(),
            reason: "result is not finite".to_string(),
        });
    }

    Ok(pct)
}

/// The per-seat price at which the location breaks even at the RESOLVED
/// target occupancy. The actual breakeven occupancy is diagnostic only.
pub fn breakeven_price_per_seat(
    snapshot: &LocationSnapshot,
    target_pct: f64,
) -> Result<f64, PricingError> {
    if snapshot.total_seats == 0 || target_pct <= 0.0 {
        return Err(PricingError::Calculation {
            location: snapshot.name.clone(),
            step: "breakeven_price_per_seat".to_string(),
        });
    }

    let price = snapshot.avg_expense_3mo / snapshot.total_seats as f64 / (target_pct / 100.0);
    if !price.is_finite() {
        return Err(PricingError::Calculation {
            location: snapshot.name.clone(),
            step: "breakeven_price_per_seat".to_string(),
        });
    }

    Ok(price)
}

// ============================================================================
// TARGET ADJUSTER
// ============================================================================

/// Resolve the target breakeven occupancy for a location.
///
/// Smart targets tighten the static goal for locations that can bear it:
/// profitable locations take a reduction from the profitable range, losing
/// locations a gentler one from the losing range. Any unusable input falls
/// back to the static target; this step never fails a location.
pub fn resolve_target(
    rules: &PricingRules,
    avg_occupancy_7d: f64,
    actual_breakeven_pct: f64,
    policy: &dyn ReductionPolicy,
) -> TargetResolution {
    let static_target = rules.static_target_breakeven_occupancy;

    if !rules.smart_target_enabled {
        return TargetResolution {
            target_pct: static_target,
            mode: TargetMode::Static,
        };
    }

    if !avg_occupancy_7d.is_finite() || !actual_breakeven_pct.is_finite() {
        return TargetResolution {
            target_pct: static_target,
            mode: TargetMode::Static,
        };
    }

    let profitable = avg_occupancy_7d >= actual_breakeven_pct;
    let range = if profitable {
        &rules.smart_target_profitable_range
    } else {
        &rules.smart_target_losing_range
    };

    let distance = (avg_occupancy_7d - actual_breakeven_pct).abs();
    let reduction = range.clamp(policy.reduction_pct(range, distance));

    let target = static_target * (1.0 - reduction / 100.0);
    if !target.is_finite() || target <= 0.0 {
        return TargetResolution {
            target_pct: static_target,
            mode: TargetMode::Static,
        };
    }

    TargetResolution {
        target_pct: target.min(100.0),
        mode: TargetMode::Smart,
    }
}

// ============================================================================
// PRICE RECOMMENDER
// ============================================================================

/// The recommendation before overrides: tier multiplier, margin, bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub tier_multiplier: f64,
    pub base_price: f64,
    pub calculated_price: f64,
    /// Whether the min/max bounds moved the price. Diagnostic only.
    pub was_clamped: bool,
    pub bottom_price: f64,
}

/// The tier whose `[lower_bound, upper_bound)` holds the occupancy; an
/// occupancy of exactly 100 falls into the final tier.
pub fn select_tier(
    tiers: &[OccupancyTier],
    occupancy_pct: f64,
    location: &str,
) -> Result<OccupancyTier, PricingError> {
    if let Some(tier) = tiers
        .iter()
        .find(|t| occupancy_pct >= t.lower_bound && occupancy_pct < t.upper_bound)
    {
        return Ok(*tier);
    }

    if let Some(top) = tiers.last() {
        if occupancy_pct == top.upper_bound {
            return Ok(*top);
        }
    }

    Err(PricingError::Configuration {
        location: location.to_string(),
        reason: format!("no occupancy tier covers {}", occupancy_pct),
    })
}

/// Round the breakeven price up to the next 50,000 step. Exact multiples
/// stay unchanged.
pub fn bottom_price(breakeven_price: f64) -> f64 {
    (breakeven_price / BOTTOM_PRICE_STEP).ceil() * BOTTOM_PRICE_STEP
}

pub fn recommend_price(
    rules: &PricingRules,
    breakeven_price: f64,
    avg_occupancy_7d: f64,
    location: &str,
) -> Result<PriceQuote, PricingError> {
    let tier = select_tier(&rules.occupancy_tiers, avg_occupancy_7d, location)?;
    let base_price = breakeven_price * tier.multiplier;

    let unclamped = base_price * rules.margin_of_safety_multiplier;
    let mut calculated = unclamped;
    if let Some(min) = rules.min_price {
        if calculated < min {
            calculated = min;
        }
    }
    if let Some(max) = rules.max_price {
        if calculated > max {
            calculated = max;
        }
    }

    Ok(PriceQuote {
        tier_multiplier: tier.multiplier,
        base_price,
        calculated_price: calculated,
        was_clamped: calculated != unclamped,
        bottom_price: bottom_price(breakeven_price),
    })
}

// ============================================================================
// FULL CALCULATION
// ============================================================================

/// Everything 4.2-4.4 derive for one location, before override resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
    pub actual_breakeven_occupancy_pct: f64,
    pub target: TargetResolution,
    pub breakeven_price_per_seat: f64,
    pub quote: PriceQuote,
    pub is_losing_money: bool,
}

/// Run the calculation chain for one snapshot. Pure: no I/O, no shared
/// state, independent per location.
pub fn calculate(
    snapshot: &LocationSnapshot,
    rules: &PricingRules,
    policy: &dyn ReductionPolicy,
) -> Result<Calculation, PricingError> {
    let actual_breakeven = actual_breakeven_occupancy(snapshot)?;

    let target = resolve_target(rules, snapshot.avg_occupancy_7d, actual_breakeven, policy);
    let breakeven_price = breakeven_price_per_seat(snapshot, target.target_pct)?;
    let quote = recommend_price(rules, breakeven_price, snapshot.avg_occupancy_7d, &snapshot.name)?;

    Ok(Calculation {
        actual_breakeven_occupancy_pct: actual_breakeven,
        target,
        breakeven_price_per_seat: breakeven_price,
        quote,
        is_losing_money: snapshot.avg_occupancy_7d < actual_breakeven,
    })
}

// ============================================================================
// TESTS
// ============================================================================
