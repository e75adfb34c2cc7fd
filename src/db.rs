use crate::overrides::{Override, OverrideLog};
use crate::parsing::{parse_amount, parse_pct, parse_seats};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

// ============================================================================
// CACHED RECORDS
// ============================================================================

/// One month of expense reporting for one building, as cached from the
/// analytics export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseRecord {
    pub building_name: String,
    pub year: i32,
    pub month: u32,
    /// Absolute monthly office expense.
    pub total_expense: f64,
    pub total_seats: u32,
    /// Most recent known sold price per seat; not every month reports one.
    pub sold_price_per_seat_actual: Option<f64>,
}

impl ExpenseRecord {
    /// Hash for duplicate detection on import: one row per building-month.
    pub fn row_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}",
            self.building_name, self.year, self.month
        ));
        format!("{:x}", hasher.finalize())
    }
}

/// One daily occupancy reading for one building.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OccupancyRecord {
    pub building_name: String,
    pub date: NaiveDate,
    /// Seats actually occupied, as a percentage in [0,100].
    pub occupancy_pct: f64,
}

impl OccupancyRecord {
    pub fn row_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}|{}", self.building_name, self.date));
        format!("{:x}", hasher.finalize())
    }
}

/// A published price valid for a range of months, inclusive on both ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishedPrice {
    pub building_name: String,
    pub year_from: i32,
    pub month_from: u32,
    pub year_to: i32,
    pub month_to: u32,
    pub price: i64,
}

impl PublishedPrice {
    /// Whether this entry covers the given period.
    pub fn covers(&self, year: i32, month: u32) -> bool {
        let period = (year, month);
        (self.year_from, self.month_from) <= period && period <= (self.year_to, self.month_to)
    }
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// Raw expense CSV row, headers as the analytics export writes them.
/// Values stay strings here; the safe-parse layer turns them into numbers.
#[derive(Debug, Deserialize)]
struct ExpenseCsvRow {
    #[serde(rename = "Building_Name")]
    building_name: String,

    #[serde(rename = "Year")]
    year: String,

    #[serde(rename = "Month")]
    month: String,

    #[serde(rename = "Total_PO_Expense_Amount")]
    total_expense: String,

    #[serde(rename = "Total_PO_Seats")]
    total_seats: String,

    #[serde(rename = "Sold_Price_Per_Seat_Actual", default)]
    sold_price_per_seat_actual: String,
}

/// Raw occupancy CSV row.
#[derive(Debug, Deserialize)]
struct OccupancyCsvRow {
    #[serde(rename = "Date")]
    date: String,

    #[serde(rename = "Building_Name")]
    building_name: String,

    #[serde(rename = "PO_Seats_Occupied_Actual_Pct")]
    occupancy_pct: String,
}

pub fn load_expense_csv(csv_path: &Path) -> Result<Vec<ExpenseRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open expense CSV")?;

    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let row: ExpenseCsvRow = result.context("Failed to deserialize expense row")?;

        let year: i32 = row
            .year
            .trim()
            .parse()
            .with_context(|| format!("Bad year '{}' for {}", row.year, row.building_name))?;
        let month: u32 = row
            .month
            .trim()
            .parse()
            .with_context(|| format!("Bad month '{}' for {}", row.month, row.building_name))?;

        let sold = row.sold_price_per_seat_actual.trim();
        let sold_price = if sold.is_empty() {
            None
        } else {
            let parsed = parse_amount(sold, true);
            if parsed.used_default || parsed.value == 0.0 {
                None
            } else {
                Some(parsed.value)
            }
        };

        records.push(ExpenseRecord {
            building_name: row.building_name.trim().to_string(),
            year,
            month,
            total_expense: parse_amount(&row.total_expense, true).value,
            total_seats: parse_seats(&row.total_seats).value,
            sold_price_per_seat_actual: sold_price,
        });
    }

    Ok(records)
}

pub fn load_occupancy_csv(csv_path: &Path) -> Result<Vec<OccupancyRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open occupancy CSV")?;

    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let row: OccupancyCsvRow = result.context("Failed to deserialize occupancy row")?;

        let date = NaiveDate::parse_from_str(row.date.trim(), "%Y-%m-%d")
            .with_context(|| format!("Bad date '{}' for {}", row.date, row.building_name))?;

        records.push(OccupancyRecord {
            building_name: row.building_name.trim().to_string(),
            date,
            occupancy_pct: parse_pct(&row.occupancy_pct).value,
        });
    }

    Ok(records)
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expense_by_month (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            row_hash TEXT UNIQUE NOT NULL,
            building_name TEXT NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            total_expense REAL NOT NULL,
            total_seats INTEGER NOT NULL,
            sold_price_per_seat_actual REAL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS occupancy_by_day (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            row_hash TEXT UNIQUE NOT NULL,
            building_name TEXT NOT NULL,
            date TEXT NOT NULL,
            occupancy_pct REAL NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS published_prices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            building_name TEXT NOT NULL,
            year_from INTEGER NOT NULL,
            month_from INTEGER NOT NULL,
            year_to INTEGER NOT NULL,
            month_to INTEGER NOT NULL,
            price INTEGER NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Append-only: rows are only ever inserted, never updated or deleted.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS price_overrides (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            override_uuid TEXT UNIQUE NOT NULL,
            building_name TEXT NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            analyst_name TEXT NOT NULL,
            reason TEXT NOT NULL,
            override_price REAL NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expense_building_period
         ON expense_by_month(building_name, year, month)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_occupancy_building_date
         ON occupancy_by_day(building_name, date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_prices_building_from
         ON published_prices(building_name, year_from, month_from)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_overrides_building_period
         ON price_overrides(building_name, year, month)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// EXPENSE / OCCUPANCY STORE
// ============================================================================

/// Insert expense records, skipping rows already cached (same
/// building-month). Returns (inserted, duplicates).
pub fn insert_expense_records(
    conn: &Connection,
    records: &[ExpenseRecord],
) -> Result<(usize, usize)> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for rec in records {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO expense_by_month (
                row_hash, building_name, year, month,
                total_expense, total_seats, sold_price_per_seat_actual
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                rec.row_hash(),
                rec.building_name,
                rec.year,
                rec.month,
                rec.total_expense,
                rec.total_seats,
                rec.sold_price_per_seat_actual,
            ],
        )?;

        if changed == 1 {
            inserted += 1;
        } else {
            duplicates += 1;
        }
    }

    Ok((inserted, duplicates))
}

pub fn insert_occupancy_records(
    conn: &Connection,
    records: &[OccupancyRecord],
) -> Result<(usize, usize)> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for rec in records {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO occupancy_by_day (
                row_hash, building_name, date, occupancy_pct
            ) VALUES (?1, ?2, ?3, ?4)",
            params![
                rec.row_hash(),
                rec.building_name,
                rec.date.format("%Y-%m-%d").to_string(),
                rec.occupancy_pct,
            ],
        )?;

        if changed == 1 {
            inserted += 1;
        } else {
            duplicates += 1;
        }
    }

    Ok((inserted, duplicates))
}

pub fn get_expense_records(conn: &Connection) -> Result<Vec<ExpenseRecord>> {
    let mut stmt = conn.prepare(
        "SELECT building_name, year, month, total_expense, total_seats,
                sold_price_per_seat_actual
         FROM expense_by_month
         ORDER BY building_name, year, month",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(ExpenseRecord {
            building_name: row.get(0)?,
            year: row.get(1)?,
            month: row.get(2)?,
            total_expense: row.get(3)?,
            total_seats: row.get(4)?,
            sold_price_per_seat_actual: row.get(5)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

pub fn get_occupancy_records(conn: &Connection) -> Result<Vec<OccupancyRecord>> {
    let mut stmt = conn.prepare(
        "SELECT building_name, date, occupancy_pct
         FROM occupancy_by_day
         ORDER BY building_name, date",
    )?;

    let rows = stmt.query_map([], |row| {
        let date_str: String = row.get(1)?;
        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(OccupancyRecord {
            building_name: row.get(0)?,
            date,
            occupancy_pct: row.get(2)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Clear one cached month so a corrected export can be reloaded.
pub fn delete_expense_period(conn: &Connection, year: i32, month: u32) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM expense_by_month WHERE year = ?1 AND month = ?2",
        params![year, month],
    )?;
    Ok(deleted)
}

// ============================================================================
// OVERRIDES (append-only)
// ============================================================================

pub fn insert_override(conn: &Connection, entry: &Override) -> Result<()> {
    conn.execute(
        "INSERT INTO price_overrides (
            override_uuid, building_name, year, month,
            analyst_name, reason, override_price, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id,
            entry.location,
            entry.year,
            entry.month,
            entry.analyst_name,
            entry.reason,
            entry.override_price,
            entry.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Load the whole override history in insertion order.
pub fn get_override_log(conn: &Connection) -> Result<OverrideLog> {
    let mut stmt = conn.prepare(
        "SELECT override_uuid, building_name, year, month,
                analyst_name, reason, override_price, created_at
         FROM price_overrides
         ORDER BY id",
    )?;

    let rows = stmt.query_map([], |row| {
        let created_str: String = row.get(7)?;
        let created_at = DateTime::parse_from_rfc3339(&created_str)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    7,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?
            .with_timezone(&Utc);

        Ok(Override {
            id: row.get(0)?,
            location: row.get(1)?,
            year: row.get(2)?,
            month: row.get(3)?,
            analyst_name: row.get(4)?,
            reason: row.get(5)?,
            override_price: row.get(6)?,
            created_at,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(OverrideLog::from_entries(entries))
}

// ============================================================================
// PUBLISHED PRICES
// ============================================================================

pub fn insert_published_price(conn: &Connection, price: &PublishedPrice) -> Result<()> {
    conn.execute(
        "INSERT INTO published_prices (
            building_name, year_from, month_from, year_to, month_to, price
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            price.building_name,
            price.year_from,
            price.month_from,
            price.year_to,
            price.month_to,
            price.price,
        ],
    )?;
    Ok(())
}

pub fn get_published_prices(conn: &Connection) -> Result<Vec<PublishedPrice>> {
    let mut stmt = conn.prepare(
        "SELECT building_name, year_from, month_from, year_to, month_to, price
         FROM published_prices
         ORDER BY building_name, year_from, month_from",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(PublishedPrice {
            building_name: row.get(0)?,
            year_from: row.get(1)?,
            month_from: row.get(2)?,
            year_to: row.get(3)?,
            month_to: row.get(4)?,
            price: row.get(5)?,
        })
    })?;

    let mut prices = Vec::new();
    for row in rows {
        prices.push(row?);
    }
    Ok(prices)
}

/// Among entries covering the period, the one whose validity starts latest.
pub fn lookup_published_price(
    prices: &[PublishedPrice],
    building: &str,
    year: i32,
    month: u32,
) -> Option<i64> {
    prices
        .iter()
        .filter(|p| p.building_name == building && p.covers(year, month))
        .map(|p| p.price)
        .last()
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

// ============================================================================
// TESTS
// ============================================================================
