use crate::artifact::{self, ArtifactError};
use crate::db;
use crate::fetch::{self, ExternalSources, FetchError};
use crate::reconcile::{self, ReconcileError};
use crate::transform::{self, Multiplier};
use chrono::Utc;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How many records the summary artifact lists.
pub const TOP_COUNT: i64 = 5;

/// Failure taxonomy of one refresh run, ordered by pipeline stage.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Either upstream call failed, timed out, or the rate source did not
    /// report success. Nothing was written.
    #[error("external fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Mapping raw entries to records failed. Nothing was written; not
    /// expected under normal inputs.
    #[error("transform failed: {0}")]
    Transform(String),

    /// Store failure mid-batch; the whole transaction was rolled back and
    /// the store is in its prior state.
    #[error("reconcile failed: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Summary rendering or writing failed AFTER the data commit. Callers
    /// must not read this as "no data changed".
    #[error("summary artifact failed: {0}")]
    Artifact(#[from] ArtifactError),
}

impl RefreshError {
    /// True when the data commit already succeeded despite the overall
    /// failure (artifact-stage errors only).
    pub fn data_committed(&self) -> bool {
        matches!(self, RefreshError::Artifact(_))
    }
}

/// Result of a fully successful refresh run.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// Total records in the store after commit.
    pub total: i64,
    pub inserted: usize,
    pub updated: usize,
    pub artifact_path: PathBuf,
}

/// One end-to-end refresh run: fetch both datasets, transform, reconcile the
/// whole batch transactionally, then render the summary artifact from
/// post-commit state.
///
/// The store handle is passed in explicitly; callers are responsible for
/// serializing concurrent runs (the pipeline itself provides no mutual
/// exclusion).
pub async fn run_refresh<S, M>(
    conn: &mut Connection,
    sources: &S,
    multiplier: &mut M,
    cache_dir: &Path,
) -> Result<RefreshOutcome, RefreshError>
where
    S: ExternalSources + Sync,
    M: Multiplier,
{
    let (catalog, rates) = fetch::fetch_both(sources).await?;

    let batch = transform::transform_batch(&catalog, &rates.rates, multiplier);

    let stats = reconcile::reconcile_batch(conn, &batch)?;

    // Data is committed from here on; remaining failures are artifact-stage
    let total = db::count_countries(conn).map_err(ArtifactError::from)?;
    let top = db::top_by_gdp(conn, TOP_COUNT).map_err(ArtifactError::from)?;
    let artifact_path = artifact::generate_summary(total, &top, Utc::now(), cache_dir)?;

    Ok(RefreshOutcome {
        total,
        inserted: stats.inserted,
        updated: stats.updated,
        artifact_path,
    })
}
