// Manual Override Log
// Analyst price overrides are an append-only history: a new entry supersedes
// rather than mutates, so the audit trail survives. The most recent entry
// for a location+period wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// OVERRIDE ENTRY
// ============================================================================

/// One recorded override. Immutable once created; superseding means
/// appending a newer entry for the same location and period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Override {
    /// Stable identity, never reused.
    pub id: String,

    pub location: String,

    /// Pricing period this override applies to.
    pub year: i32,
    pub month: u32,

    pub analyst_name: String,
    pub reason: String,
    pub override_price: f64,

    /// When the analyst recorded it. Selection key for "most recent wins".
    pub created_at: DateTime<Utc>,
}

impl Override {
    pub fn new(
        location: &str,
        year: i32,
        month: u32,
        analyst_name: &str,
        reason: &str,
        override_price: f64,
    ) -> Self {
        Override {
            id: uuid::Uuid::new_v4().to_string(),
            location: location.to_string(),
            year,
            month,
            analyst_name: analyst_name.to_string(),
            reason: reason.to_string(),
            override_price,
            created_at: Utc::now(),
        }
    }

    pub fn matches(&self, location: &str, year: i32, month: u32) -> bool {
        self.location == location && self.year == year && self.month == month
    }
}

// ============================================================================
// OVERRIDE LOG
// ============================================================================

/// Append-only collection of overrides for one run.
///
/// The log never removes or rewrites entries. `latest_for` picks the active
/// override deterministically: newest `created_at`, with insertion order
/// breaking ties so a replayed log selects the same entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverrideLog {
    entries: Vec<Override>,
}

impl OverrideLog {
    pub fn new() -> Self {
        OverrideLog {
            entries: Vec::new(),
        }
    }

    pub fn from_entries(entries: Vec<Override>) -> Self {
        OverrideLog { entries }
    }

    pub fn append(&mut self, entry: Override) {
        self.entries.push(entry);
    }

    /// The active override for a location+period, if any.
    pub fn latest_for(&self, location: &str, year: i32, month: u32) -> Option<&Override> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, o)| o.matches(location, year, month))
            .max_by_key(|(idx, o)| (o.created_at, *idx))
            .map(|(_, o)| o)
    }

    /// Full history for a location, oldest first.
    pub fn history_for(&self, location: &str) -> Vec<&Override> {
        self.entries
            .iter()
            .filter(|o| o.location == location)
            .collect()
    }

    pub fn entries(&self) -> &[Override] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Audit metadata exposed on a priced result when an override applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverrideInfo {
    pub analyst_name: String,
    pub reason: String,
    pub overridden_at: DateTime<Utc>,
    /// The calculated price the analyst overrode, kept for side-by-side
    /// display.
    pub original_price: f64,
}

/// Outcome of override resolution for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPrice {
    pub recommended_price: f64,
    pub is_override: bool,
    pub override_info: Option<OverrideInfo>,
}

/// Apply the active override, if any. The calculated price always survives
/// in `override_info.original_price` when one does.
pub fn resolve_price(
    log: &OverrideLog,
    location: &str,
    year: i32,
    month: u32,
    calculated_price: f64,
) -> ResolvedPrice {
    match log.latest_for(location, year, month) {
        Some(active) => ResolvedPrice {
            recommended_price: active.override_price,
            is_override: true,
            override_info: Some(OverrideInfo {
                analyst_name: active.analyst_name.clone(),
                reason: active.reason.clone(),
                overridden_at: active.created_at,
                original_price: calculated_price,
            }),
        },
        None => ResolvedPrice {
            recommended_price: calculated_price,
            is_override: false,
            override_info: None,
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry_at(
        location: &str,
        price: f64,
        created_at: DateTime<Utc>,
        analyst: &str,
    ) -> Override {
        Override {
            id: uuid::Uuid::new_v4().to_string(),
            location: location.to_string(),
            year: 2025,
            month: 7,
            analyst_name: analyst.to_string(),
            reason: "market check".to_string(),
            override_price: price,
            created_at,
        }
    }

    #[test]
    fn test_no_override_keeps_calculated() {
        let log = OverrideLog::new();
        let resolved = resolve_price(&log, "Pacific Place", 2025, 7, 2_500_000.0);

        assert!(!resolved.is_override);
        assert_eq!(resolved.recommended_price, 2_500_000.0);
        assert!(resolved.override_info.is_none());
    }

    #[test]
    fn test_override_wins_and_keeps_calculated() {
        let mut log = OverrideLog::new();
        log.append(entry_at(
            "Pacific Place",
            2_200_000.0,
            Utc.with_ymd_and_hms(2025, 7, 3, 9, 0, 0).unwrap(),
            "sari",
        ));

        let resolved = resolve_price(&log, "Pacific Place", 2025, 7, 2_500_000.0);

        assert!(resolved.is_override);
        assert_eq!(resolved.recommended_price, 2_200_000.0);
        let info = resolved.override_info.unwrap();
        assert_eq!(info.original_price, 2_500_000.0);
        assert_eq!(info.analyst_name, "sari");
    }

    #[test]
    fn test_most_recent_override_supersedes() {
        let mut log = OverrideLog::new();
        log.append(entry_at(
            "Pacific Place",
            2_200_000.0,
            Utc.with_ymd_and_hms(2025, 7, 3, 9, 0, 0).unwrap(),
            "sari",
        ));
        log.append(entry_at(
            "Pacific Place",
            2_350_000.0,
            Utc.with_ymd_and_hms(2025, 7, 5, 14, 30, 0).unwrap(),
            "budi",
        ));

        let active = log.latest_for("Pacific Place", 2025, 7).unwrap();
        assert_eq!(active.override_price, 2_350_000.0);
        assert_eq!(active.analyst_name, "budi");

        // Both entries survive in history
        assert_eq!(log.history_for("Pacific Place").len(), 2);
    }

    #[test]
    fn test_identical_timestamps_break_ties_by_insertion() {
        let ts = Utc.with_ymd_and_hms(2025, 7, 3, 9, 0, 0).unwrap();
        let mut log = OverrideLog::new();
        log.append(entry_at("Pacific Place", 2_200_000.0, ts, "sari"));
        log.append(entry_at("Pacific Place", 2_300_000.0, ts, "budi"));

        let active = log.latest_for("Pacific Place", 2025, 7).unwrap();
        assert_eq!(active.override_price, 2_300_000.0);
    }

    #[test]
    fn test_override_scoped_to_period_and_location() {
        let mut log = OverrideLog::new();
        log.append(entry_at(
            "Pacific Place",
            2_200_000.0,
            Utc.with_ymd_and_hms(2025, 7, 3, 9, 0, 0).unwrap(),
            "sari",
        ));

        assert!(log.latest_for("Pacific Place", 2025, 8).is_none());
        assert!(log.latest_for("Menara Astra", 2025, 7).is_none());
    }
}
