// Pricing Pipeline
// One run: merge the cached sources for an anchor date, price every eligible
// location, fold in overrides, and attach published prices. Per-location
// work is pure and independent; a failed location becomes a reported skip,
// never a failed batch.

use crate::calculator::{calculate, ReductionPolicy, TargetMode};
use crate::db::{lookup_published_price, ExpenseRecord, OccupancyRecord, PublishedPrice};
use crate::error::SkipReport;
use crate::merge::merge_sources;
use crate::overrides::{resolve_price, OverrideInfo, OverrideLog};
use crate::rules::RulesConfig;
use anyhow::{bail, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

// ============================================================================
// RESULT
// ============================================================================

/// The assembled output for one location and one anchor date. Immutable once
/// produced; formatters and external reporters only read it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingResult {
    pub location: String,

    /// Pricing period the run was anchored to.
    pub year: i32,
    pub month: u32,

    pub occupancy_pct: f64,
    pub actual_breakeven_occupancy_pct: f64,
    pub sold_price_per_seat: f64,

    pub target_breakeven_occupancy_pct: f64,
    pub target_mode: TargetMode,

    pub tier_multiplier: f64,
    pub breakeven_price_per_seat: f64,

    /// Output of the calculation chain, kept even when overridden.
    pub calculated_price: f64,
    /// What analysts see: the override when one exists, else the
    /// calculated price.
    pub recommended_price: f64,
    pub bottom_price: f64,
    pub was_clamped: bool,

    pub is_losing_money: bool,
    pub is_override: bool,
    pub override_info: Option<OverrideInfo>,

    /// Injected from the published-price store; no compute depends on it.
    pub published_price: Option<i64>,
    /// Injected reasoning text from the external generator.
    pub reasoning: Option<String>,
}

/// One outcome per input location: a result or a reported skip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum LocationOutcome {
    Priced(PricingResult),
    Skipped(SkipReport),
}

/// Everything a run produced, plus the skip list for the batch summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub anchor: NaiveDate,
    pub results: Vec<PricingResult>,
    pub skips: Vec<SkipReport>,
}

impl BatchOutput {
    pub fn summary(&self) -> String {
        format!(
            "{} location(s) priced, {} skipped",
            self.results.len(),
            self.skips.len()
        )
    }

    pub fn outcomes(&self) -> Vec<LocationOutcome> {
        let mut outcomes: Vec<LocationOutcome> = self
            .results
            .iter()
            .cloned()
            .map(LocationOutcome::Priced)
            .collect();
        outcomes.extend(self.skips.iter().cloned().map(LocationOutcome::Skipped));
        outcomes
    }
}

// ============================================================================
// INPUT
// ============================================================================

/// Immutable snapshot of everything one run reads. Built once by the caller;
/// the pipeline never writes any of it.
#[derive(Debug, Clone, Copy)]
pub struct PipelineInput<'a> {
    pub anchor: NaiveDate,
    pub rules: &'a RulesConfig,
    pub expenses: &'a [ExpenseRecord],
    pub occupancies: &'a [OccupancyRecord],
    pub overrides: &'a OverrideLog,
    pub published_prices: &'a [PublishedPrice],
    /// Restrict the run to one location (chat and API lookups).
    pub target_location: Option<&'a str>,
}

/// Loose match for user-supplied location queries: hyphens become spaces and
/// case is ignored, so "pacific-place" finds "Pacific Place".
pub fn location_matches(name: &str, query: &str) -> bool {
    let normalized_query = query.replace('-', " ");
    name.trim().eq_ignore_ascii_case(normalized_query.trim())
}

// ============================================================================
// RUNNER
// ============================================================================

/// Run the full pipeline for one anchor date.
///
/// Fails only when there is nothing to process at all; every per-location
/// problem is collected as a skip instead.
pub fn run_pipeline(input: &PipelineInput, policy: &dyn ReductionPolicy) -> Result<BatchOutput> {
    if input.expenses.is_empty() && input.occupancies.is_empty() {
        bail!("no cached records to process; import expense and occupancy data first");
    }

    let year = input.anchor.year();
    let month = input.anchor.month();

    let merged = merge_sources(input.expenses, input.occupancies, input.anchor);

    let mut results = Vec::new();
    let mut skips: Vec<SkipReport> = merged.skips.iter().map(SkipReport::from).collect();

    for snapshot in &merged.snapshots {
        if let Some(query) = input.target_location {
            if !location_matches(&snapshot.name, query) {
                continue;
            }
        }

        let rules = match input.rules.resolve(&snapshot.name) {
            Ok(rules) => rules,
            Err(err) => {
                skips.push(SkipReport::from(&err));
                continue;
            }
        };

        let calc = match calculate(snapshot, &rules, policy) {
            Ok(calc) => calc,
            Err(err) => {
                skips.push(SkipReport::from(&err));
                continue;
            }
        };

        let resolved = resolve_price(
            input.overrides,
            &snapshot.name,
            year,
            month,
            calc.quote.calculated_price,
        );

        let published_price =
            lookup_published_price(input.published_prices, &snapshot.name, year, month);

        results.push(PricingResult {
            location: snapshot.name.clone(),
            year,
            month,
            occupancy_pct: snapshot.avg_occupancy_7d,
            actual_breakeven_occupancy_pct: calc.actual_breakeven_occupancy_pct,
            sold_price_per_seat: snapshot.sold_price_per_seat_actual,
            target_breakeven_occupancy_pct: calc.target.target_pct,
            target_mode: calc.target.mode,
            tier_multiplier: calc.quote.tier_multiplier,
            breakeven_price_per_seat: calc.breakeven_price_per_seat,
            calculated_price: calc.quote.calculated_price,
            recommended_price: resolved.recommended_price,
            bottom_price: calc.quote.bottom_price,
            was_clamped: calc.quote.was_clamped,
            is_losing_money: calc.is_losing_money,
            is_override: resolved.is_override,
            override_info: resolved.override_info,
            published_price,
            reasoning: None,
        });
    }

    // A location filter that matched nothing is still a valid (empty) run;
    // the front end decides how to report it.
    Ok(BatchOutput {
        anchor: input.anchor,
        results,
        skips,
    })
}

/// Attach externally generated reasoning text to matching results.
pub fn attach_reasoning<F>(output: &mut BatchOutput, lookup: F)
where
    F: Fn(&PricingResult) -> Option<String>,
{
    for result in &mut output.results {
        result.reasoning = lookup(result);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::LinearPolicy;
    use crate::overrides::Override;
    use crate::rules::LocationRulesEntry;
    use chrono::Duration;

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 15).unwrap()
    }

    fn expense(building: &str, year: i32, month: u32) -> ExpenseRecord {
        ExpenseRecord {
            building_name: building.to_string(),
            year,
            month,
            total_expense: 900_000_000.0,
            total_seats: 100,
            sold_price_per_seat_actual: Some(300_000.0),
        }
    }

    fn week_of_occupancy(building: &str, pct: f64) -> Vec<OccupancyRecord> {
        (1..=7)
            .map(|d| OccupancyRecord {
                building_name: building.to_string(),
                date: anchor() - Duration::days(d),
                occupancy_pct: pct,
            })
            .collect()
    }

    fn rules_with_entry(location: &str, entry: LocationRulesEntry) -> RulesConfig {
        let mut config = RulesConfig::default();
        config.locations.insert(location.to_string(), entry);
        config
    }

    fn static_50_rules(location: &str) -> RulesConfig {
        rules_with_entry(
            location,
            LocationRulesEntry {
                static_target_breakeven_occupancy: Some(50.0),
                smart_target_enabled: Some(false),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_run_prices_eligible_location() {
        let expenses = vec![expense("Pacific Place", 2025, 6)];
        let occupancies = week_of_occupancy("Pacific Place", 55.0);
        let rules = static_50_rules("Pacific Place");

        let input = PipelineInput {
            anchor: anchor(),
            rules: &rules,
            expenses: &expenses,
            occupancies: &occupancies,
            overrides: &OverrideLog::new(),
            published_prices: &[],
            target_location: None,
        };

        let output = run_pipeline(&input, &LinearPolicy).unwrap();
        assert_eq!(output.results.len(), 1);
        assert!(output.skips.is_empty());

        let result = &output.results[0];
        assert_eq!(result.location, "Pacific Place");
        assert_eq!(result.year, 2025);
        assert_eq!(result.month, 7);
        assert!((result.actual_breakeven_occupancy_pct - 30.0).abs() < 1e-9);
        assert!((result.calculated_price - 27_000_000.0).abs() < 1e-6);
        assert_eq!(result.recommended_price, result.calculated_price);
        assert_eq!(result.bottom_price, 18_000_000.0);
        assert_eq!(result.target_mode, TargetMode::Static);
        assert!(!result.is_losing_money);
        assert!(!result.is_override);
        assert_eq!(result.published_price, None);
    }

    #[test]
    fn test_empty_stores_fail_fatally() {
        let rules = RulesConfig::default();
        let input = PipelineInput {
            anchor: anchor(),
            rules: &rules,
            expenses: &[],
            occupancies: &[],
            overrides: &OverrideLog::new(),
            published_prices: &[],
            target_location: None,
        };

        assert!(run_pipeline(&input, &LinearPolicy).is_err());
    }

    #[test]
    fn test_skips_are_collected_not_fatal() {
        // One good location, one missing its occupancy source.
        let expenses = vec![
            expense("Pacific Place", 2025, 6),
            expense("Menara Astra", 2025, 6),
        ];
        let occupancies = week_of_occupancy("Pacific Place", 55.0);
        let rules = static_50_rules("Pacific Place");

        let input = PipelineInput {
            anchor: anchor(),
            rules: &rules,
            expenses: &expenses,
            occupancies: &occupancies,
            overrides: &OverrideLog::new(),
            published_prices: &[],
            target_location: None,
        };

        let output = run_pipeline(&input, &LinearPolicy).unwrap();
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.skips.len(), 1);
        assert_eq!(output.skips[0].location, "Menara Astra");
        assert_eq!(output.summary(), "1 location(s) priced, 1 skipped");
    }

    #[test]
    fn test_override_applies_to_run_period() {
        let expenses = vec![expense("Pacific Place", 2025, 6)];
        let occupancies = week_of_occupancy("Pacific Place", 55.0);
        let rules = static_50_rules("Pacific Place");

        let mut log = OverrideLog::new();
        log.append(Override::new(
            "Pacific Place",
            2025,
            7,
            "sari",
            "competitor undercut",
            25_000_000.0,
        ));

        let input = PipelineInput {
            anchor: anchor(),
            rules: &rules,
            expenses: &expenses,
            occupancies: &occupancies,
            overrides: &log,
            published_prices: &[],
            target_location: None,
        };

        let output = run_pipeline(&input, &LinearPolicy).unwrap();
        let result = &output.results[0];

        assert!(result.is_override);
        assert_eq!(result.recommended_price, 25_000_000.0);
        // Calculated value survives for side-by-side display
        assert!((result.calculated_price - 27_000_000.0).abs() < 1e-6);
        let info = result.override_info.as_ref().unwrap();
        assert_eq!(info.analyst_name, "sari");
        assert!((info.original_price - 27_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_published_price_injected() {
        let expenses = vec![expense("Pacific Place", 2025, 6)];
        let occupancies = week_of_occupancy("Pacific Place", 55.0);
        let rules = static_50_rules("Pacific Place");
        let published = vec![PublishedPrice {
            building_name: "Pacific Place".to_string(),
            year_from: 2025,
            month_from: 7,
            year_to: 2025,
            month_to: 12,
            price: 26_500_000,
        }];

        let input = PipelineInput {
            anchor: anchor(),
            rules: &rules,
            expenses: &expenses,
            occupancies: &occupancies,
            overrides: &OverrideLog::new(),
            published_prices: &published,
            target_location: None,
        };

        let output = run_pipeline(&input, &LinearPolicy).unwrap();
        assert_eq!(output.results[0].published_price, Some(26_500_000));
    }

    #[test]
    fn test_target_location_filter() {
        let expenses = vec![
            expense("Pacific Place", 2025, 6),
            expense("Menara Astra", 2025, 6),
        ];
        let mut occupancies = week_of_occupancy("Pacific Place", 55.0);
        occupancies.extend(week_of_occupancy("Menara Astra", 40.0));
        let rules = static_50_rules("Pacific Place");

        let input = PipelineInput {
            anchor: anchor(),
            rules: &rules,
            expenses: &expenses,
            occupancies: &occupancies,
            overrides: &OverrideLog::new(),
            published_prices: &[],
            target_location: Some("pacific-place"),
        };

        let output = run_pipeline(&input, &LinearPolicy).unwrap();
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].location, "Pacific Place");
    }

    #[test]
    fn test_configuration_error_skips_location() {
        let expenses = vec![expense("Pacific Place", 2025, 6)];
        let occupancies = week_of_occupancy("Pacific Place", 55.0);
        let rules = rules_with_entry(
            "Pacific Place",
            LocationRulesEntry {
                min_price: Some(5_000_000.0),
                max_price: Some(1_000_000.0),
                ..Default::default()
            },
        );

        let input = PipelineInput {
            anchor: anchor(),
            rules: &rules,
            expenses: &expenses,
            occupancies: &occupancies,
            overrides: &OverrideLog::new(),
            published_prices: &[],
            target_location: None,
        };

        let output = run_pipeline(&input, &LinearPolicy).unwrap();
        assert!(output.results.is_empty());
        assert_eq!(output.skips.len(), 1);
        assert_eq!(output.skips[0].kind, "configuration");
    }

    #[test]
    fn test_attach_reasoning() {
        let expenses = vec![expense("Pacific Place", 2025, 6)];
        let occupancies = week_of_occupancy("Pacific Place", 55.0);
        let rules = static_50_rules("Pacific Place");

        let input = PipelineInput {
            anchor: anchor(),
            rules: &rules,
            expenses: &expenses,
            occupancies: &occupancies,
            overrides: &OverrideLog::new(),
            published_prices: &[],
            target_location: None,
        };

        let mut output = run_pipeline(&input, &LinearPolicy).unwrap();
        attach_reasoning(&mut output, |r| {
            Some(format!("{} holds at current occupancy", r.location))
        });

        assert_eq!(
            output.results[0].reasoning.as_deref(),
            Some("Pacific Place holds at current occupancy")
        );
    }

    #[test]
    fn test_outcomes_cover_every_location() {
        let expenses = vec![
            expense("Pacific Place", 2025, 6),
            expense("Menara Astra", 2025, 6),
        ];
        let occupancies = week_of_occupancy("Pacific Place", 55.0);
        let rules = static_50_rules("Pacific Place");

        let input = PipelineInput {
            anchor: anchor(),
            rules: &rules,
            expenses: &expenses,
            occupancies: &occupancies,
            overrides: &OverrideLog::new(),
            published_prices: &[],
            target_location: None,
        };

        let output = run_pipeline(&input, &LinearPolicy).unwrap();
        assert_eq!(output.outcomes().len(), 2);
    }
}
