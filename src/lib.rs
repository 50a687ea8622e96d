// Country Cache - Core Library
// Exposes all modules for use in the CLI, API server, and tests

pub mod artifact;
pub mod db;
pub mod fetch;
pub mod reconcile;
pub mod refresh;
pub mod transform;

// Re-export commonly used types
pub use artifact::{generate_summary, ArtifactError, ARTIFACT_FILE, ARTIFACT_HEIGHT, ARTIFACT_WIDTH};
pub use db::{
    count_countries, delete_by_name, find_by_name, last_refreshed, list_countries,
    setup_database, top_by_gdp, Country,
};
pub use fetch::{
    fetch_both, CatalogEntry, CurrencyEntry, ExternalSources, FetchError, HttpSources,
    RatesResponse, CATALOG_API, RATES_API,
};
pub use reconcile::{reconcile_batch, ReconcileError, ReconcileStats};
pub use refresh::{run_refresh, RefreshError, RefreshOutcome};
pub use transform::{
    transform_batch, transform_entry, FixedMultiplier, Multiplier, UniformMultiplier,
    MULTIPLIER_MAX, MULTIPLIER_MIN,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
