// Data Merger
// Joins the monthly expense window with the daily occupancy window into one
// calculation-ready snapshot per location for an anchor date.

use crate::db::{ExpenseRecord, OccupancyRecord};
use crate::error::PricingError;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How many calendar months feed the expense average.
pub const EXPENSE_WINDOW_MONTHS: usize = 3;

/// How many calendar days feed the occupancy average.
pub const OCCUPANCY_WINDOW_DAYS: i64 = 7;

/// Buildings carrying this name are bookkeeping shells, never priced.
const EXCLUDED_BUILDING: &str = "holding";

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Calculation-ready view of one location at one anchor date. All fields are
/// present by construction; locations that cannot fill them become skips.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationSnapshot {
    pub name: String,
    pub total_seats: u32,
    /// Mean of the monthly expense totals available in the window.
    pub avg_expense_3mo: f64,
    /// Mean of the daily occupancy readings available in the window.
    pub avg_occupancy_7d: f64,
    /// Most recent known sold price per seat.
    pub sold_price_per_seat_actual: f64,
}

/// Everything the merger produced for one run: usable snapshots plus one
/// reported reason per skipped location.
#[derive(Debug, Clone, Default)]
pub struct MergeOutput {
    pub snapshots: Vec<LocationSnapshot>,
    pub skips: Vec<PricingError>,
}

// ============================================================================
// WINDOW ARITHMETIC
// ============================================================================

fn month_before(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

/// The calendar months strictly before the anchor month, most recent first.
pub fn expense_window(anchor: NaiveDate) -> Vec<(i32, u32)> {
    let mut months = Vec::with_capacity(EXPENSE_WINDOW_MONTHS);
    let mut current = month_before(anchor.year(), anchor.month());
    for _ in 0..EXPENSE_WINDOW_MONTHS {
        months.push(current);
        current = month_before(current.0, current.1);
    }
    months
}

/// The calendar days feeding the occupancy average: the seven days ending
/// the day before the anchor date. The anchor itself is excluded so the
/// average reflects the latest fully known state.
pub fn occupancy_window(anchor: NaiveDate) -> (NaiveDate, NaiveDate) {
    (
        anchor - Duration::days(OCCUPANCY_WINDOW_DAYS),
        anchor - Duration::days(1),
    )
}

// ============================================================================
// MERGER
// ============================================================================

/// Merge the two cached sources for one anchor date.
///
/// Join key is the trimmed building name, matched exactly and
/// case-sensitively. "Holding" entries and zero-seat locations are excluded
/// before the join and never appear in either output list.
pub fn merge_sources(
    expenses: &[ExpenseRecord],
    occupancies: &[OccupancyRecord],
    anchor: NaiveDate,
) -> MergeOutput {
    // BTreeMap keeps the per-run output order deterministic.
    let mut expense_by_building: BTreeMap<String, Vec<&ExpenseRecord>> = BTreeMap::new();
    for rec in expenses {
        let name = rec.building_name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case(EXCLUDED_BUILDING) {
            continue;
        }
        expense_by_building
            .entry(name.to_string())
            .or_default()
            .push(rec);
    }

    let mut occupancy_by_building: BTreeMap<String, Vec<&OccupancyRecord>> = BTreeMap::new();
    for rec in occupancies {
        let name = rec.building_name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case(EXCLUDED_BUILDING) {
            continue;
        }
        occupancy_by_building
            .entry(name.to_string())
            .or_default()
            .push(rec);
    }

    let mut output = MergeOutput::default();

    for (name, records) in &expense_by_building {
        // Most recent record at or before the anchor month carries the seat
        // count and anchors the sold-price scan.
        let anchor_period = (anchor.year(), anchor.month());
        let mut known: Vec<&ExpenseRecord> = records
            .iter()
            .copied()
            .filter(|r| (r.year, r.month) <= anchor_period)
            .collect();
        known.sort_by_key(|r| (r.year, r.month));

        let latest = match known.last() {
            Some(rec) => *rec,
            None => {
                output.skips.push(PricingError::DataNotFound {
                    location: name.clone(),
                    what: format!("no expense records at or before {}", anchor),
                });
                continue;
            }
        };

        // Zero-seat locations are excluded outright, before the join.
        if latest.total_seats == 0 {
            continue;
        }

        let occupancy_records = match occupancy_by_building.get(name) {
            Some(recs) => recs,
            None => {
                output.skips.push(PricingError::DataNotFound {
                    location: name.clone(),
                    what: "present in expense data only (no occupancy source)".to_string(),
                });
                continue;
            }
        };

        match build_snapshot(name, latest, &known, occupancy_records, anchor) {
            Ok(snapshot) => output.snapshots.push(snapshot),
            Err(err) => output.skips.push(err),
        }
    }

    // Locations only the occupancy source knows about are excluded too.
    for name in occupancy_by_building.keys() {
        if !expense_by_building.contains_key(name) {
            output.skips.push(PricingError::DataNotFound {
                location: name.clone(),
                what: "present in occupancy data only (no expense source)".to_string(),
            });
        }
    }

    output
}

fn build_snapshot(
    name: &str,
    latest: &ExpenseRecord,
    known: &[&ExpenseRecord],
    occupancy_records: &[&OccupancyRecord],
    anchor: NaiveDate,
) -> Result<LocationSnapshot, PricingError> {
    // Expense window: months strictly before the anchor month. Missing
    // months are excluded from the average, not zeroed. When no prior month
    // has data the anchor month itself stands in.
    let window = expense_window(anchor);
    let window_totals: Vec<f64> = known
        .iter()
        .filter(|r| window.contains(&(r.year, r.month)))
        .map(|r| r.total_expense)
        .collect();

    let avg_expense = if !window_totals.is_empty() {
        window_totals.iter().sum::<f64>() / window_totals.len() as f64
    } else if (latest.year, latest.month) == (anchor.year(), anchor.month()) {
        latest.total_expense
    } else {
        return Err(PricingError::DataNotFound {
            location: name.to_string(),
            what: format!("no expense months available in the window before {}", anchor),
        });
    };

    // Sold price: most recent non-null value at or before the anchor month.
    let sold_price = known
        .iter()
        .rev()
        .find_map(|r| r.sold_price_per_seat_actual)
        .ok_or_else(|| PricingError::DataNotFound {
            location: name.to_string(),
            what: "no sold price per seat on record".to_string(),
        })?;

    // Occupancy window: seven days ending the day before the anchor.
    let (window_start, window_end) = occupancy_window(anchor);
    let readings: Vec<f64> = occupancy_records
        .iter()
        .filter(|r| r.date >= window_start && r.date <= window_end)
        .map(|r| r.occupancy_pct)
        .collect();

    if readings.is_empty() {
        return Err(PricingError::DataNotFound {
            location: name.to_string(),
            what: format!(
                "no occupancy readings between {} and {}",
                window_start, window_end
            ),
        });
    }

    let avg_occupancy = readings.iter().sum::<f64>() / readings.len() as f64;
    if !avg_occupancy.is_finite() || !(0.0..=100.0).contains(&avg_occupancy) {
        return Err(PricingError::InvalidInput {
            location: name.to_string(),
            field: "avg_occupancy_7d".to_string(),
            reason: format!("{} is outside [0,100]", avg_occupancy),
        });
    }

    Ok(LocationSnapshot {
        name: name.to_string(),
        total_seats: latest.total_seats,
        avg_expense_3mo: avg_expense,
        avg_occupancy_7d: avg_occupancy,
        sold_price_per_seat_actual: sold_price,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn expense(building: &str, year: i32, month: u32, total: f64, seats: u32) -> ExpenseRecord {
        ExpenseRecord {
            building_name: building.to_string(),
            year,
            month,
            total_expense: total,
            total_seats: seats,
            sold_price_per_seat_actual: Some(300_000.0),
        }
    }

    fn occupancy(building: &str, date: NaiveDate, pct: f64) -> OccupancyRecord {
        OccupancyRecord {
            building_name: building.to_string(),
            date,
            occupancy_pct: pct,
        }
    }

    fn week_of_occupancy(building: &str, anchor: NaiveDate, pct: f64) -> Vec<OccupancyRecord> {
        (1..=7)
            .map(|d| occupancy(building, anchor - Duration::days(d), pct))
            .collect()
    }

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 15).unwrap()
    }

    #[test]
    fn test_expense_window_crosses_year_boundary() {
        let window = expense_window(NaiveDate::from_ymd_opt(2025, 2, 10).unwrap());
        assert_eq!(window, vec![(2025, 1), (2024, 12), (2024, 11)]);
    }

    #[test]
    fn test_occupancy_window_excludes_anchor() {
        let (start, end) = occupancy_window(anchor());
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 7, 8).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 7, 14).unwrap());
    }

    #[test]
    fn test_merge_averages_both_windows() {
        let expenses = vec![
            expense("Pacific Place", 2025, 4, 880_000_000.0, 100),
            expense("Pacific Place", 2025, 5, 900_000_000.0, 100),
            expense("Pacific Place", 2025, 6, 920_000_000.0, 100),
        ];
        let occupancies = week_of_occupancy("Pacific Place", anchor(), 55.0);

        let output = merge_sources(&expenses, &occupancies, anchor());
        assert!(output.skips.is_empty());
        assert_eq!(output.snapshots.len(), 1);

        let snap = &output.snapshots[0];
        assert_eq!(snap.avg_expense_3mo, 900_000_000.0);
        assert_eq!(snap.avg_occupancy_7d, 55.0);
        assert_eq!(snap.total_seats, 100);
        assert_eq!(snap.sold_price_per_seat_actual, 300_000.0);
    }

    #[test]
    fn test_missing_months_excluded_from_average() {
        // Only one of the three window months has data; the average is that
        // month's value, not a third of it.
        let expenses = vec![expense("Pacific Place", 2025, 6, 900_000_000.0, 100)];
        let occupancies = week_of_occupancy("Pacific Place", anchor(), 55.0);

        let output = merge_sources(&expenses, &occupancies, anchor());
        assert_eq!(output.snapshots[0].avg_expense_3mo, 900_000_000.0);
    }

    #[test]
    fn test_anchor_month_fallback_when_window_empty() {
        let expenses = vec![expense("Pacific Place", 2025, 7, 950_000_000.0, 100)];
        let occupancies = week_of_occupancy("Pacific Place", anchor(), 55.0);

        let output = merge_sources(&expenses, &occupancies, anchor());
        assert_eq!(output.snapshots.len(), 1);
        assert_eq!(output.snapshots[0].avg_expense_3mo, 950_000_000.0);
    }

    #[test]
    fn test_occupancy_outside_window_not_counted() {
        let expenses = vec![expense("Pacific Place", 2025, 6, 900_000_000.0, 100)];
        let mut occupancies = week_of_occupancy("Pacific Place", anchor(), 50.0);
        // A reading on the anchor date itself must not move the average.
        occupancies.push(occupancy("Pacific Place", anchor(), 100.0));

        let output = merge_sources(&expenses, &occupancies, anchor());
        assert_eq!(output.snapshots[0].avg_occupancy_7d, 50.0);
    }

    #[test]
    fn test_holding_never_appears() {
        let expenses = vec![
            expense("Holding", 2025, 6, 900_000_000.0, 100),
            expense("HOLDING", 2025, 6, 900_000_000.0, 100),
        ];
        let occupancies = week_of_occupancy("Holding", anchor(), 55.0);

        let output = merge_sources(&expenses, &occupancies, anchor());
        assert!(output.snapshots.is_empty());
        assert!(output.skips.is_empty());
    }

    #[test]
    fn test_zero_seats_never_appears() {
        let expenses = vec![expense("Pacific Place", 2025, 6, 900_000_000.0, 0)];
        let occupancies = week_of_occupancy("Pacific Place", anchor(), 55.0);

        let output = merge_sources(&expenses, &occupancies, anchor());
        assert!(output.snapshots.is_empty());
        assert!(output.skips.is_empty());
    }

    #[test]
    fn test_single_source_locations_are_reported_skips() {
        let expenses = vec![expense("Expense Only", 2025, 6, 900_000_000.0, 100)];
        let occupancies = week_of_occupancy("Occupancy Only", anchor(), 55.0);

        let output = merge_sources(&expenses, &occupancies, anchor());
        assert!(output.snapshots.is_empty());
        assert_eq!(output.skips.len(), 2);
        assert!(output.skips.iter().all(|s| s.kind() == "data_not_found"));
    }

    #[test]
    fn test_join_is_case_sensitive() {
        let expenses = vec![expense("Pacific Place", 2025, 6, 900_000_000.0, 100)];
        let occupancies = week_of_occupancy("pacific place", anchor(), 55.0);

        let output = merge_sources(&expenses, &occupancies, anchor());
        assert!(output.snapshots.is_empty());
        assert_eq!(output.skips.len(), 2);
    }

    #[test]
    fn test_no_occupancy_readings_in_window() {
        let expenses = vec![expense("Pacific Place", 2025, 6, 900_000_000.0, 100)];
        // Readings exist, but a month before the window.
        let occupancies = week_of_occupancy(
            "Pacific Place",
            NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
            55.0,
        );

        let output = merge_sources(&expenses, &occupancies, anchor());
        assert!(output.snapshots.is_empty());
        assert_eq!(output.skips.len(), 1);
        assert!(output.skips[0].to_string().contains("no occupancy readings"));
    }

    #[test]
    fn test_sold_price_uses_most_recent_known() {
        let mut old = expense("Pacific Place", 2025, 5, 900_000_000.0, 100);
        old.sold_price_per_seat_actual = Some(280_000.0);
        let mut newer = expense("Pacific Place", 2025, 6, 910_000_000.0, 100);
        newer.sold_price_per_seat_actual = None;

        let occupancies = week_of_occupancy("Pacific Place", anchor(), 55.0);
        let output = merge_sources(&[old, newer], &occupancies, anchor());

        // June has no sold price; May's value is the most recent known.
        assert_eq!(output.snapshots[0].sold_price_per_seat_actual, 280_000.0);
    }

    #[test]
    fn test_no_sold_price_anywhere_is_a_skip() {
        let mut rec = expense("Pacific Place", 2025, 6, 900_000_000.0, 100);
        rec.sold_price_per_seat_actual = None;
        let occupancies = week_of_occupancy("Pacific Place", anchor(), 55.0);

        let output = merge_sources(&[rec], &occupancies, anchor());
        assert!(output.snapshots.is_empty());
        assert!(output.skips[0].to_string().contains("sold price"));
    }
}
