// Country Cache - Web Server
// Query Service layer over the refresh pipeline and persisted store

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use country_cache::{
    artifact::ARTIFACT_FILE, count_countries, delete_by_name, find_by_name, last_refreshed,
    list_countries, run_refresh, setup_database, Country, HttpSources, RefreshError,
    UniformMultiplier,
};

/// Shared application state. Holding the connection behind one async mutex
/// also serializes refresh runs, which the pipeline itself does not do.
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    sources: Arc<HttpSources>,
    cache_dir: PathBuf,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

fn error_res(status: StatusCode, error: &str, details: Option<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            details,
        }),
    )
        .into_response()
}

#[derive(Serialize)]
struct RefreshResponse {
    success: bool,
    total_countries: i64,
    image: String,
}

#[derive(Serialize)]
struct StatusResponse {
    total_countries: i64,
    last_refreshed_at: Option<String>,
}

#[derive(Deserialize, Default)]
struct ListParams {
    region: Option<String>,
    currency: Option<String>,
    sort: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// POST /countries/refresh - run the full refresh pipeline
async fn refresh_countries(State(state): State<AppState>) -> impl IntoResponse {
    let mut conn = state.db.lock().await;

    let result = run_refresh(
        &mut conn,
        state.sources.as_ref(),
        &mut UniformMultiplier,
        &state.cache_dir,
    )
    .await;

    match result {
        Ok(outcome) => Json(RefreshResponse {
            success: true,
            total_countries: outcome.total,
            image: outcome.artifact_path.to_string_lossy().into_owned(),
        })
        .into_response(),
        // Artifact failures happen after the commit; everything else means
        // the upstream data never made it into the store
        Err(err @ RefreshError::Artifact(_)) => {
            eprintln!("Refresh artifact error: {err}");
            error_res(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Summary image generation failed",
                Some(err.to_string()),
            )
        }
        Err(err) => {
            eprintln!("Refresh error: {err}");
            error_res(
                StatusCode::SERVICE_UNAVAILABLE,
                "External data source unavailable",
                Some(err.to_string()),
            )
        }
    }
}

/// GET /countries?region=&currency=&sort=gdp_desc - filtered listing
async fn get_countries(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let conn = state.db.lock().await;
    let gdp_desc = params.sort.as_deref() == Some("gdp_desc");

    match list_countries(
        &conn,
        params.region.as_deref(),
        params.currency.as_deref(),
        gdp_desc,
    ) {
        Ok(countries) => Json(countries).into_response(),
        Err(err) => {
            eprintln!("Error listing countries: {err}");
            error_res(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
        }
    }
}

/// GET /countries/:name - case-insensitive single lookup
async fn get_country(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let conn = state.db.lock().await;
    let name = urlencoding::decode(&name)
        .map(|s| s.into_owned())
        .unwrap_or(name);

    match find_by_name(&conn, &name) {
        Ok(Some(country)) => Json::<Country>(country).into_response(),
        Ok(None) => error_res(StatusCode::NOT_FOUND, "Country not found", None),
        Err(err) => {
            eprintln!("Error fetching country {name}: {err}");
            error_res(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
        }
    }
}

/// DELETE /countries/:name
async fn delete_country(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let conn = state.db.lock().await;
    let name = urlencoding::decode(&name)
        .map(|s| s.into_owned())
        .unwrap_or(name);

    match delete_by_name(&conn, &name) {
        Ok(true) => Json(serde_json::json!({ "success": true })).into_response(),
        Ok(false) => error_res(StatusCode::NOT_FOUND, "Country not found", None),
        Err(err) => {
            eprintln!("Error deleting country {name}: {err}");
            error_res(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
        }
    }
}

/// GET /status - total count and most recent refresh stamp
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().await;

    let total = match count_countries(&conn) {
        Ok(total) => total,
        Err(err) => {
            eprintln!("Error counting countries: {err}");
            return error_res(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None);
        }
    };

    match last_refreshed(&conn) {
        Ok(stamp) => Json(StatusResponse {
            total_countries: total,
            last_refreshed_at: stamp.map(|dt| dt.to_rfc3339()),
        })
        .into_response(),
        Err(err) => {
            eprintln!("Error reading last refresh: {err}");
            error_res(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
        }
    }
}

/// GET /countries/image - serve the summary artifact
async fn get_summary_image(State(state): State<AppState>) -> impl IntoResponse {
    let path = state.cache_dir.join(ARTIFACT_FILE);

    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            error_res(StatusCode::NOT_FOUND, "Summary image not found", None)
        }
        Err(err) => {
            eprintln!("Error reading summary image: {err}");
            error_res(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    println!("🌍 Country Cache - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = std::env::var("COUNTRY_CACHE_DB").unwrap_or_else(|_| "countries.db".to_string());
    let cache_dir =
        PathBuf::from(std::env::var("COUNTRY_CACHE_DIR").unwrap_or_else(|_| "cache".to_string()));
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let conn = Connection::open(&db_path).expect("Failed to open database");
    setup_database(&conn).expect("Failed to set up database schema");
    println!("✓ Database opened: {db_path}");

    let sources = match (
        std::env::var("CATALOG_API_URL"),
        std::env::var("RATES_API_URL"),
    ) {
        (Ok(catalog), Ok(rates)) => HttpSources::with_endpoints(catalog, rates),
        _ => HttpSources::new(),
    }
    .expect("Failed to build HTTP client");

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        sources: Arc::new(sources),
        cache_dir,
    };

    let app = Router::new()
        .route("/countries/refresh", post(refresh_countries))
        .route("/countries/image", get(get_summary_image))
        .route("/countries", get(get_countries))
        .route("/countries/:name", get(get_country).delete(delete_country))
        .route("/status", get(get_status))
        .with_state(state)
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:{port}");
    println!("   Refresh: POST http://localhost:{port}/countries/refresh");
    println!("   Listing: GET  http://localhost:{port}/countries");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
