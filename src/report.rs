// Report Formatting
// Renders pricing results for the CLI and the chat webhook. Prices print as
// integers with thousands separators; the field order is fixed so analysts
// can scan runs quickly.

use crate::parsing::{format_price_int, round_to_nearest};
use crate::pipeline::{BatchOutput, PricingResult};

/// Sold price is reported to the nearest 10,000 - the raw analytics value
/// carries more precision than anyone reads.
const SOLD_PRICE_DISPLAY_STEP: f64 = 10_000.0;

fn format_optional_price(price: Option<f64>) -> String {
    match price {
        Some(p) => format_price_int(p),
        None => "Not set".to_string(),
    }
}

// ============================================================================
// CLI FORMAT
// ============================================================================

/// One location block for terminal output.
pub fn format_cli_output(result: &PricingResult, verbose: bool) -> String {
    let mut lines = vec![format!("{}:", result.location)];

    lines.push(format!("  Latest Occupancy: {:.1}%", result.occupancy_pct));
    lines.push(format!(
        "  Actual Breakeven Occupancy: {:.1}%",
        result.actual_breakeven_occupancy_pct
    ));
    lines.push(format!(
        "  Sold Price/Seat (Actual): {}",
        format_price_int(round_to_nearest(
            result.sold_price_per_seat,
            SOLD_PRICE_DISPLAY_STEP
        ))
    ));
    lines.push(String::new());

    lines.push(format!(
        "  Target Breakeven Occupancy: {:.1}% ({})",
        result.target_breakeven_occupancy_pct,
        result.target_mode.label()
    ));
    lines.push(format!(
        "  Dynamic Multiplier: {:.2}x",
        result.tier_multiplier
    ));
    lines.push(format!(
        "  Published Price: {}",
        format_optional_price(result.published_price.map(|p| p as f64))
    ));
    lines.push(format!(
        "  Recommended Price: {}",
        format_price_int(result.recommended_price)
    ));
    lines.push(format!(
        "  Bottom Price: {}",
        format_price_int(result.bottom_price)
    ));

    if result.is_losing_money {
        lines.push("  ⚠️ ALERT: This location is losing money at current occupancy!".to_string());
    }

    if let Some(info) = &result.override_info {
        lines.push("  Manual Override Applied:".to_string());
        lines.push(format!("    • Overridden by: {}", info.analyst_name));
        lines.push(format!("    • Reason: {}", info.reason));
        lines.push(format!(
            "    • Original price: {}",
            format_price_int(info.original_price)
        ));
    }

    if verbose {
        if let Some(reasoning) = &result.reasoning {
            lines.push(format!("  Reasoning: {}", reasoning));
        }
    }

    lines.push(String::new());
    lines.join("\n")
}

/// Full batch for terminal output: every priced location, then the skips.
pub fn format_batch(output: &BatchOutput, verbose: bool) -> String {
    let mut sections = vec![format!("📊 Pricing Results for {}:\n", output.anchor)];

    for result in &output.results {
        sections.push(format_cli_output(result, verbose));
    }

    if !output.skips.is_empty() {
        sections.push("Skipped locations:".to_string());
        for skip in &output.skips {
            sections.push(format!("  ✗ {} — {}", skip.location, skip.reason));
        }
        sections.push(String::new());
    }

    sections.push(output.summary());
    sections.join("\n")
}

// ============================================================================
// CHAT FORMAT
// ============================================================================

/// Plain-text block for the chat webhook: same field order as the CLI, with
/// a header rule instead of indentation.
pub fn format_chat_output(result: &PricingResult) -> String {
    let mut lines = vec![
        format!("🏢 {}", result.location),
        "=".repeat(result.location.len() + 4),
        String::new(),
    ];

    lines.push(format!("Latest Occupancy: {:.1}%", result.occupancy_pct));
    lines.push(format!(
        "Actual Breakeven Occupancy: {:.1}%",
        result.actual_breakeven_occupancy_pct
    ));
    lines.push(format!(
        "Sold Price/Seat (Actual): {}",
        format_price_int(round_to_nearest(
            result.sold_price_per_seat,
            SOLD_PRICE_DISPLAY_STEP
        ))
    ));
    lines.push(String::new());

    lines.push(format!(
        "Target Breakeven Occupancy: {:.1}% ({})",
        result.target_breakeven_occupancy_pct,
        result.target_mode.label()
    ));
    lines.push(format!("Dynamic Multiplier: {:.2}x", result.tier_multiplier));
    lines.push(format!(
        "Published Price: {}",
        format_optional_price(result.published_price.map(|p| p as f64))
    ));
    lines.push(format!(
        "Recommended Price: {}",
        format_price_int(result.recommended_price)
    ));
    lines.push(format!(
        "Bottom Price: {}",
        format_price_int(result.bottom_price)
    ));
    lines.push(String::new());

    if result.is_losing_money {
        lines.push("⚠️  WARNING: Location is currently losing money ⚠️".to_string());
        lines.push(String::new());
    }

    if let Some(info) = &result.override_info {
        lines.push("Manual Override Applied:".to_string());
        lines.push(format!("  • Overridden by: {}", info.analyst_name));
        lines.push(format!("  • Reason: {}", info.reason));
        lines.push(format!(
            "  • Original price: {}",
            format_price_int(info.original_price)
        ));
        lines.push(String::new());
    }

    if let Some(reasoning) = &result.reasoning {
        lines.push("Reasoning:".to_string());
        lines.push("-".repeat(10));
        lines.push(reasoning.clone());
        lines.push(String::new());
    }

    lines.join("\n")
}

// ============================================================================
// TESTS
// ============================================================================
