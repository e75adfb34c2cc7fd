// Seat Pricing Engine - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod calculator;
pub mod db;
pub mod error;
pub mod merge;
pub mod overrides;
pub mod parsing;
pub mod pipeline;
pub mod report;
pub mod rules;

// Re-export commonly used types
pub use calculator::{
    calculate, Calculation, LinearPolicy, PriceQuote, ReductionPolicy, SteppedPolicy, TargetMode,
    TargetResolution,
};
pub use db::{
    count_rows, delete_expense_period, get_expense_records, get_occupancy_records,
    get_override_log, get_published_prices, insert_expense_records, insert_occupancy_records,
    insert_override, insert_published_price, load_expense_csv, load_occupancy_csv,
    lookup_published_price, setup_database, ExpenseRecord, OccupancyRecord, PublishedPrice,
};
pub use error::{PricingError, SkipReport};
pub use merge::{merge_sources, LocationSnapshot, MergeOutput};
pub use overrides::{resolve_price, Override, OverrideInfo, OverrideLog, ResolvedPrice};
pub use pipeline::{
    attach_reasoning, location_matches, run_pipeline, BatchOutput, LocationOutcome, PipelineInput,
    PricingResult,
};
pub use report::{format_batch, format_chat_output, format_cli_output};
pub use rules::{
    default_tiers, validate_tiers, LocationRulesEntry, OccupancyTier, PricingRules,
    ReductionRange, RulesConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
