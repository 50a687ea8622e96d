use anyhow::{Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::PathBuf;

use country_cache::{
    count_countries, last_refreshed, run_refresh, setup_database, HttpSources, UniformMultiplier,
};

fn db_path() -> PathBuf {
    PathBuf::from(env::var("COUNTRY_CACHE_DB").unwrap_or_else(|_| "countries.db".to_string()))
}

fn cache_dir() -> PathBuf {
    PathBuf::from(env::var("COUNTRY_CACHE_DIR").unwrap_or_else(|_| "cache".to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("status") => run_status(),
        Some("refresh") | None => run_refresh_cmd().await,
        Some(other) => {
            eprintln!("Unknown command: {other}");
            eprintln!("Usage: country-cache [refresh|status]");
            std::process::exit(2);
        }
    }
}

async fn run_refresh_cmd() -> Result<()> {
    println!("🌍 Country Cache - Refresh");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = db_path();
    let cache_dir = cache_dir();

    println!("\n🔧 Setting up database...");
    let mut conn = Connection::open(&db_path)
        .with_context(|| format!("Failed to open database at {db_path:?}"))?;
    setup_database(&conn)?;
    println!("✓ Database initialized with WAL mode: {db_path:?}");

    let sources = match (env::var("CATALOG_API_URL"), env::var("RATES_API_URL")) {
        (Ok(catalog), Ok(rates)) => HttpSources::with_endpoints(catalog, rates)?,
        _ => HttpSources::new()?,
    };

    println!("\n🌐 Fetching external data and reconciling...");
    let outcome = run_refresh(&mut conn, &sources, &mut UniformMultiplier, &cache_dir)
        .await
        .context("Refresh run failed")?;

    println!("✓ Inserted: {} countries", outcome.inserted);
    println!("✓ Updated:  {} countries", outcome.updated);
    println!("✓ Total:    {} countries cached", outcome.total);
    println!("\n🖼️  Summary artifact: {:?}", outcome.artifact_path);

    Ok(())
}

fn run_status() -> Result<()> {
    let db_path = db_path();

    if !db_path.exists() {
        eprintln!("❌ Database not found at {db_path:?}");
        eprintln!("   Run: country-cache refresh");
        std::process::exit(1);
    }

    let conn = Connection::open(&db_path)?;
    setup_database(&conn)?;

    let total = count_countries(&conn)?;
    println!("📊 Countries cached: {total}");

    match last_refreshed(&conn)? {
        Some(stamp) => println!("🕒 Last refresh: {}", stamp.to_rfc3339()),
        None => println!("🕒 Last refresh: never"),
    }

    Ok(())
}
