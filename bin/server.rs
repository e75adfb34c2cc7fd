// Seat Pricing Engine - Web Server
// REST API plus the chat webhook, both thin wrappers over the pricing
// pipeline. Every request reads an immutable snapshot of the cache and the
// rules file; nothing here writes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use seat_pricing::{
    format_chat_output, get_expense_records, get_occupancy_records, get_override_log,
    get_published_prices, location_matches, run_pipeline, setup_database, BatchOutput,
    LinearPolicy, PipelineInput, PricingResult, RulesConfig,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    rules_path: Arc<String>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    fn err(data: T, message: String) -> Self {
        Self {
            success: false,
            data,
            error: Some(message),
        }
    }
}

#[derive(Deserialize)]
struct PricingQuery {
    /// Anchor date as YYYY-MM-DD; defaults to today.
    date: Option<String>,
}

// ============================================================================
// Pipeline plumbing
// ============================================================================

fn parse_anchor(raw: Option<&str>) -> Result<NaiveDate, String> {
    match raw {
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|_| format!("Bad date '{}', expected YYYY-MM-DD", text)),
        None => Ok(Local::now().date_naive()),
    }
}

/// Run the pipeline against the current cache snapshot.
fn run_for(
    state: &AppState,
    anchor: NaiveDate,
    target_location: Option<&str>,
) -> Result<BatchOutput, String> {
    let rules = RulesConfig::from_file(state.rules_path.as_str()).map_err(|e| e.to_string())?;

    let conn = state.db.lock().unwrap();
    let expenses = get_expense_records(&conn).map_err(|e| e.to_string())?;
    let occupancies = get_occupancy_records(&conn).map_err(|e| e.to_string())?;
    let overrides = get_override_log(&conn).map_err(|e| e.to_string())?;
    let published = get_published_prices(&conn).map_err(|e| e.to_string())?;

    let input = PipelineInput {
        anchor,
        rules: &rules,
        expenses: &expenses,
        occupancies: &occupancies,
        overrides: &overrides,
        published_prices: &published,
        target_location,
    };

    run_pipeline(&input, &LinearPolicy).map_err(|e| e.to_string())
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/pricing - Price every location for the anchor date
async fn get_pricing_all(
    State(state): State<AppState>,
    Query(query): Query<PricingQuery>,
) -> impl IntoResponse {
    let anchor = match parse_anchor(query.date.as_deref()) {
        Ok(anchor) => anchor,
        Err(msg) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::err(serde_json::Value::Null, msg)),
            )
                .into_response()
        }
    };

    match run_for(&state, anchor, None) {
        Ok(output) => (
            StatusCode::OK,
            Json(ApiResponse::ok(serde_json::json!(output))),
        )
            .into_response(),
        Err(msg) => {
            eprintln!("Error running pricing pipeline: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(serde_json::Value::Null, msg)),
            )
                .into_response()
        }
    }
}

/// GET /api/pricing/:location - Price one location for the anchor date
async fn get_pricing_for_location(
    State(state): State<AppState>,
    Path(location): Path<String>,
    Query(query): Query<PricingQuery>,
) -> impl IntoResponse {
    let anchor = match parse_anchor(query.date.as_deref()) {
        Ok(anchor) => anchor,
        Err(msg) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::err(serde_json::Value::Null, msg)),
            )
                .into_response()
        }
    };

    // Decode URL-encoded location name
    let decoded_location = urlencoding::decode(&location)
        .unwrap_or_else(|_| location.clone().into())
        .into_owned();

    match run_for(&state, anchor, Some(&decoded_location)) {
        Ok(output) => match output.results.into_iter().next() {
            Some(result) => {
                (StatusCode::OK, Json(ApiResponse::ok(serde_json::json!(result)))).into_response()
            }
            None => (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::err(
                    serde_json::Value::Null,
                    format!("No pricing data for location '{}'", decoded_location),
                )),
            )
                .into_response(),
        },
        Err(msg) => {
            eprintln!("Error pricing {}: {}", decoded_location, msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(serde_json::Value::Null, msg)),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Chat Webhook
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatEvent {
    #[serde(rename = "type")]
    event_type: String,
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    text: Option<String>,
}

#[derive(Serialize)]
struct ChatReply {
    text: String,
}

/// Parse "/seat-price <location> [YYYY-MM]" into its parts.
fn parse_price_command(text: &str) -> Result<(String, Option<(i32, u32)>), String> {
    let trimmed = text.trim();
    let lowered = trimmed.to_lowercase();
    if !lowered.starts_with("/seat-price") {
        return Err("Not a seat-price command".to_string());
    }

    let args_text = trimmed["/seat-price".len()..].trim();
    if args_text.is_empty() {
        return Err("Location is required. Usage: /seat-price <location> [YYYY-MM]".to_string());
    }

    let parts: Vec<&str> = args_text.split_whitespace().collect();
    let last = parts[parts.len() - 1];

    let period = parse_month_arg(last);
    let location_parts = if period.is_some() && parts.len() > 1 {
        &parts[..parts.len() - 1]
    } else {
        &parts[..]
    };

    if let Some((year, month)) = period {
        if !(1..=12).contains(&month) {
            return Err("Month must be between 01-12".to_string());
        }
        if !(2020..=2030).contains(&year) {
            return Err("Year must be between 2020-2030".to_string());
        }
    }

    Ok((location_parts.join(" "), period))
}

/// A trailing "YYYY-MM" token, if the text looks like one.
fn parse_month_arg(token: &str) -> Option<(i32, u32)> {
    let bytes = token.as_bytes();
    if bytes.len() != 7 || bytes[4] != b'-' {
        return None;
    }
    let year: i32 = token[..4].parse().ok()?;
    let month: u32 = token[5..].parse().ok()?;
    Some((year, month))
}

/// Anchor a month query mid-month so the occupancy window stays inside it.
fn anchor_for_period(period: Option<(i32, u32)>) -> NaiveDate {
    match period {
        Some((year, month)) => {
            NaiveDate::from_ymd_opt(year, month, 15).unwrap_or_else(|| Local::now().date_naive())
        }
        None => Local::now().date_naive(),
    }
}

/// POST /webhook/chat - Chat-bot entry point
async fn receive_chat_event(
    State(state): State<AppState>,
    Json(event): Json<ChatEvent>,
) -> impl IntoResponse {
    match event.event_type.as_str() {
        "MESSAGE" => {
            let text = event
                .message
                .and_then(|m| m.text)
                .unwrap_or_default();

            let (location, period) = match parse_price_command(&text) {
                Ok(parsed) => parsed,
                Err(msg) => {
                    return Json(ChatReply {
                        text: format!("**Error:** {}", msg),
                    })
                }
            };

            let anchor = anchor_for_period(period);
            match run_for(&state, anchor, Some(&location)) {
                Ok(output) => {
                    match output
                        .results
                        .iter()
                        .find(|r: &&PricingResult| location_matches(&r.location, &location))
                    {
                        Some(result) => Json(ChatReply {
                            text: format_chat_output(result),
                        }),
                        None => Json(ChatReply {
                            text: format!("**Error:** Location '{}' not found", location),
                        }),
                    }
                }
                Err(msg) => Json(ChatReply {
                    text: format!("**Error:** {}", msg),
                }),
            }
        }
        "ADDED_TO_SPACE" => Json(ChatReply {
            text: "Bot added to space".to_string(),
        }),
        "REMOVED_FROM_SPACE" => Json(ChatReply {
            text: "Bot removed from space".to_string(),
        }),
        other => Json(ChatReply {
            text: format!("Unknown event type: {}", other),
        }),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    println!("🌐 Seat Pricing Engine - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = std::env::var("PRICING_DB").unwrap_or_else(|_| "pricing_data.db".to_string());
    let rules_path =
        std::env::var("PRICING_RULES").unwrap_or_else(|_| "pricing_rules.json".to_string());

    let conn = Connection::open(&db_path).expect("Failed to open database");
    setup_database(&conn).expect("Failed to initialize database schema");
    println!("✓ Database opened: {}", db_path);
    println!("✓ Rules file: {}", rules_path);

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        rules_path: Arc::new(rules_path),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/pricing", get(get_pricing_all))
        .route("/pricing/:location", get(get_pricing_for_location));

    // Build main router
    let app = Router::new()
        .nest("/api", api_routes)
        .route("/webhook/chat", post(receive_chat_event))
        .with_state(state)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   API: http://localhost:3000/api/pricing");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

// ============================================================================
// TESTS
// ============================================================================
