// Error taxonomy for the pricing engine
// Per-location failures become skip outcomes; they never abort a batch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// PRICING ERROR
// ============================================================================

/// Typed errors raised while pricing a single location.
///
/// Every variant names the location it belongs to so the batch summary can
/// report skips without extra bookkeeping at the call site.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PricingError {
    /// Required data is missing for a location (empty window, absent join
    /// partner). The location is skipped and reported.
    #[error("data not found for '{location}': {what}")]
    DataNotFound { location: String, what: String },

    /// A value is present but unusable (zero sold price, non-finite result).
    #[error("invalid input for '{location}': {field} {reason}")]
    InvalidInput {
        location: String,
        field: String,
        reason: String,
    },

    /// Rules for the location are malformed (min > max, tier gaps). The
    /// caller falls back to safe defaults where defined, otherwise skips.
    #[error("configuration error for '{location}': {reason}")]
    Configuration { location: String, reason: String },

    /// A calculation step failed. Target-adjuster failures never surface as
    /// this variant; they recover to the static target internally.
    #[error("calculation failed for '{location}' at step '{step}'")]
    Calculation { location: String, step: String },
}

impl PricingError {
    pub fn location(&self) -> &str {
        match self {
            PricingError::DataNotFound { location, .. } => location,
            PricingError::InvalidInput { location, .. } => location,
            PricingError::Configuration { location, .. } => location,
            PricingError::Calculation { location, .. } => location,
        }
    }

    /// Short category code used in batch summaries and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            PricingError::DataNotFound { .. } => "data_not_found",
            PricingError::InvalidInput { .. } => "invalid_input",
            PricingError::Configuration { .. } => "configuration",
            PricingError::Calculation { .. } => "calculation",
        }
    }
}

// ============================================================================
// SKIP REPORT
// ============================================================================

/// One skipped location in a batch run, serializable for API responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkipReport {
    pub location: String,
    pub kind: String,
    pub reason: String,
}

impl From<&PricingError> for SkipReport {
    fn from(err: &PricingError) -> Self {
        SkipReport {
            location: err.location().to_string(),
            kind: err.kind().to_string(),
            reason: err.to_string(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_carries_location() {
        let err = PricingError::DataNotFound {
            location: "Pacific Place".to_string(),
            what: "no occupancy readings in window".to_string(),
        };

        assert_eq!(err.location(), "Pacific Place");
        assert_eq!(err.kind(), "data_not_found");
        assert!(err.to_string().contains("Pacific Place"));
    }

    #[test]
    fn test_skip_report_from_error() {
        let err = PricingError::InvalidInput {
            location: "Menara Astra".to_string(),
            field: "sold_price_per_seat_actual".to_string(),
            reason: "is zero".to_string(),
        };

        let report = SkipReport::from(&err);
        assert_eq!(report.location, "Menara Astra");
        assert_eq!(report.kind, "invalid_input");
        assert!(report.reason.contains("sold_price_per_seat_actual"));
    }
}
