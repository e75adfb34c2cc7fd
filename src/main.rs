use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use rusqlite::Connection;
use std::env;
use std::path::Path;

use seat_pricing::{
    count_rows, delete_expense_period, format_batch, get_expense_records, get_occupancy_records,
    get_override_log, get_published_prices, insert_expense_records, insert_occupancy_records,
    insert_override, insert_published_price, load_expense_csv, load_occupancy_csv,
    run_pipeline, setup_database, LinearPolicy, Override, PipelineInput, PublishedPrice,
    ReductionPolicy, RulesConfig, SteppedPolicy,
};

const DEFAULT_DB_PATH: &str = "pricing_data.db";
const DEFAULT_RULES_PATH: &str = "pricing_rules.json";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "import-expenses" => run_import_expenses(&args[2..]),
        "import-occupancy" => run_import_occupancy(&args[2..]),
        "run" => run_pricing(&args[2..]),
        "set-override" => run_set_override(&args[2..]),
        "set-published-price" => run_set_published_price(&args[2..]),
        "overrides" => run_show_overrides(&args[2..]),
        "clear-expenses" => run_clear_expenses(&args[2..]),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("Seat Pricing Engine");
    println!("━━━━━━━━━━━━━━━━━━━");
    println!("Usage:");
    println!("  seat-pricing import-expenses <csv> [--db PATH]");
    println!("  seat-pricing import-occupancy <csv> [--db PATH]");
    println!("  seat-pricing run [--date YYYY-MM-DD] [--location NAME] [--rules PATH]");
    println!("                   [--db PATH] [--stepped] [--verbose]");
    println!("  seat-pricing set-override <location> <YYYY-MM> <price> <analyst> <reason...>");
    println!("  seat-pricing set-published-price <location> <from YYYY-MM> <to YYYY-MM> <price>");
    println!("  seat-pricing overrides <location> [--db PATH]");
    println!("  seat-pricing clear-expenses <YYYY-MM> [--db PATH]");
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Value of `--name VALUE` if present.
fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

/// Positional arguments: everything before the first `--flag`.
fn positional(args: &[String]) -> Vec<&String> {
    args.iter().take_while(|a| !a.starts_with("--")).collect()
}

fn open_db(args: &[String]) -> Result<Connection> {
    let db_path = flag_value(args, "--db").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
    let conn = Connection::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;
    setup_database(&conn)?;
    Ok(conn)
}

/// Parse "YYYY-MM" into (year, month).
fn parse_period(raw: &str) -> Result<(i32, u32)> {
    let parts: Vec<&str> = raw.split('-').collect();
    if parts.len() != 2 {
        bail!("Period must be YYYY-MM, got '{}'", raw);
    }
    let year: i32 = parts[0].parse().context("Bad year in period")?;
    let month: u32 = parts[1].parse().context("Bad month in period")?;
    if !(1..=12).contains(&month) {
        bail!("Month must be between 01-12, got {}", month);
    }
    Ok((year, month))
}

// ============================================================================
// Commands
// ============================================================================

fn run_import_expenses(args: &[String]) -> Result<()> {
    let pos = positional(args);
    let csv_path = match pos.first() {
        Some(path) => path.as_str(),
        None => bail!("Usage: seat-pricing import-expenses <csv> [--db PATH]"),
    };

    println!("🗄️  Importing monthly expense data");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading CSV...");
    let records = load_expense_csv(Path::new(csv_path))?;
    println!("✓ Loaded {} expense rows from CSV", records.len());

    let conn = open_db(args)?;
    let (inserted, duplicates) = insert_expense_records(&conn, &records)?;
    println!("✓ Inserted {} rows ({} duplicates skipped)", inserted, duplicates);

    let total = count_rows(&conn, "expense_by_month")?;
    println!("✓ Cache now holds {} expense rows", total);

    Ok(())
}

fn run_import_occupancy(args: &[String]) -> Result<()> {
    let pos = positional(args);
    let csv_path = match pos.first() {
        Some(path) => path.as_str(),
        None => bail!("Usage: seat-pricing import-occupancy <csv> [--db PATH]"),
    };

    println!("🗄️  Importing daily occupancy data");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading CSV...");
    let records = load_occupancy_csv(Path::new(csv_path))?;
    println!("✓ Loaded {} occupancy rows from CSV", records.len());

    let conn = open_db(args)?;
    let (inserted, duplicates) = insert_occupancy_records(&conn, &records)?;
    println!("✓ Inserted {} rows ({} duplicates skipped)", inserted, duplicates);

    let total = count_rows(&conn, "occupancy_by_day")?;
    println!("✓ Cache now holds {} occupancy rows", total);

    Ok(())
}

fn run_pricing(args: &[String]) -> Result<()> {
    let anchor = match flag_value(args, "--date") {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .with_context(|| format!("Bad --date '{}', expected YYYY-MM-DD", raw))?,
        None => Local::now().date_naive(),
    };

    let rules_path = flag_value(args, "--rules").unwrap_or_else(|| DEFAULT_RULES_PATH.to_string());
    let rules = RulesConfig::from_file(&rules_path)?;

    let location = flag_value(args, "--location");
    let verbose = has_flag(args, "--verbose");

    let conn = open_db(args)?;
    let expenses = get_expense_records(&conn)?;
    let occupancies = get_occupancy_records(&conn)?;
    let overrides = get_override_log(&conn)?;
    let published = get_published_prices(&conn)?;

    let input = PipelineInput {
        anchor,
        rules: &rules,
        expenses: &expenses,
        occupancies: &occupancies,
        overrides: &overrides,
        published_prices: &published,
        target_location: location.as_deref(),
    };

    let policy: &dyn ReductionPolicy = if has_flag(args, "--stepped") {
        &SteppedPolicy
    } else {
        &LinearPolicy
    };

    let output = run_pipeline(&input, policy)?;

    if output.results.is_empty() && output.skips.is_empty() {
        let location_msg = location
            .map(|l| format!(" for location '{}'", l))
            .unwrap_or_default();
        println!("\n❌ No pricing results found{} for {}.", location_msg, anchor);
        println!("This usually means:");
        println!("  1. No cached data covers the requested date");
        println!("  2. No data exists for the specified location");
        println!("\nTo load data, try:");
        println!("  seat-pricing import-expenses <csv>");
        println!("  seat-pricing import-occupancy <csv>");
        return Ok(());
    }

    println!("\n{}", format_batch(&output, verbose));
    Ok(())
}

fn run_set_override(args: &[String]) -> Result<()> {
    let pos = positional(args);
    if pos.len() < 5 {
        bail!("Usage: seat-pricing set-override <location> <YYYY-MM> <price> <analyst> <reason...>");
    }

    let location = pos[0];
    let (year, month) = parse_period(pos[1])?;
    let price: f64 = pos[2]
        .replace(',', "")
        .parse()
        .with_context(|| format!("Bad price '{}'", pos[2]))?;
    let analyst = pos[3];
    let reason = pos[4..].iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" ");

    let entry = Override::new(location, year, month, analyst, &reason, price);

    let conn = open_db(args)?;
    insert_override(&conn, &entry)?;

    println!("✓ Override recorded for {} ({}-{:02})", location, year, month);
    println!("  Price: {:.0}, by {}: {}", price, analyst, reason);
    Ok(())
}

fn run_set_published_price(args: &[String]) -> Result<()> {
    let pos = positional(args);
    if pos.len() < 4 {
        bail!(
            "Usage: seat-pricing set-published-price <location> <from YYYY-MM> <to YYYY-MM> <price>"
        );
    }

    let location = pos[0];
    let (year_from, month_from) = parse_period(pos[1])?;
    let (year_to, month_to) = parse_period(pos[2])?;
    let price: i64 = pos[3]
        .replace(',', "")
        .parse()
        .with_context(|| format!("Bad price '{}'", pos[3]))?;

    if (year_from, month_from) > (year_to, month_to) {
        bail!("Published price range starts after it ends");
    }

    let conn = open_db(args)?;
    insert_published_price(
        &conn,
        &PublishedPrice {
            building_name: location.to_string(),
            year_from,
            month_from,
            year_to,
            month_to,
            price,
        },
    )?;

    println!(
        "✓ Published price {} recorded for {} ({}-{:02} to {}-{:02})",
        price, location, year_from, month_from, year_to, month_to
    );
    Ok(())
}

fn run_show_overrides(args: &[String]) -> Result<()> {
    let pos = positional(args);
    let location = match pos.first() {
        Some(loc) => loc.as_str(),
        None => bail!("Usage: seat-pricing overrides <location> [--db PATH]"),
    };

    let conn = open_db(args)?;
    let log = get_override_log(&conn)?;
    let history = log.history_for(location);

    if history.is_empty() {
        println!("No overrides recorded for {}", location);
        return Ok(());
    }

    println!("Override history for {}:", location);
    for entry in history {
        println!(
            "  {} {}-{:02}  {:>12.0}  by {} — {}",
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.year,
            entry.month,
            entry.override_price,
            entry.analyst_name,
            entry.reason
        );
    }
    Ok(())
}

fn run_clear_expenses(args: &[String]) -> Result<()> {
    let pos = positional(args);
    let period = match pos.first() {
        Some(p) => p.as_str(),
        None => bail!("Usage: seat-pricing clear-expenses <YYYY-MM> [--db PATH]"),
    };
    let (year, month) = parse_period(period)?;

    let conn = open_db(args)?;
    let deleted = delete_expense_period(&conn, year, month)?;
    println!("✓ Cleared {} expense rows for {}-{:02}", deleted, year, month);
    Ok(())
}
