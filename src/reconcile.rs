use crate::db::{self, Country};
use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Store failure anywhere in the batch. The surrounding transaction has
    /// already been rolled back when this surfaces.
    #[error("store error during reconcile: {0}")]
    Store(#[from] rusqlite::Error),
}

/// Counts reported by a committed reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub inserted: usize,
    pub updated: usize,
}

/// Insert-or-update the whole batch inside one transaction.
///
/// Each record is matched against the store by case-insensitive name: a hit
/// overwrites every field in place (keeping the row id), a miss inserts.
/// Commit happens once after the full batch; any per-record failure rolls
/// back everything, leaving the store exactly as it was before the call.
pub fn reconcile_batch(
    conn: &mut Connection,
    batch: &[Country],
) -> Result<ReconcileStats, ReconcileError> {
    // Dropping the transaction without an explicit commit rolls it back
    let tx = conn.transaction()?;

    let mut stats = ReconcileStats {
        inserted: 0,
        updated: 0,
    };

    for record in batch {
        match db::find_id_by_name(&tx, &record.name)? {
            Some(id) => {
                db::update_country(&tx, id, record)?;
                stats.updated += 1;
            }
            None => {
                db::insert_country(&tx, record)?;
                stats.inserted += 1;
            }
        }
    }

    tx.commit()?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(name: &str, population: i64) -> Country {
        Country {
            id: None,
            name: name.to_string(),
            capital: None,
            region: None,
            population,
            currency_code: Some("TST".to_string()),
            exchange_rate: Some(1.0),
            estimated_gdp: Some(population as f64),
            flag_url: None,
            last_refreshed_at: Utc::now(),
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_reconcile_inserts_then_updates() {
        let mut conn = test_conn();

        let stats = reconcile_batch(&mut conn, &[record("Testland", 100)]).unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.updated, 0);

        let first = db::find_by_name(&conn, "testland").unwrap().unwrap();

        // Second run matches case-insensitively and overwrites in place
        let stats = reconcile_batch(&mut conn, &[record("TESTLAND", 250)]).unwrap();
        assert_eq!(stats.inserted, 0);
        assert_eq!(stats.updated, 1);

        let second = db::find_by_name(&conn, "testland").unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "TESTLAND");
        assert_eq!(second.population, 250);
        assert_eq!(db::count_countries(&conn).unwrap(), 1);
    }

    #[test]
    fn test_last_write_wins_within_one_batch() {
        let mut conn = test_conn();

        let batch = vec![record("Dupeland", 1), record("dupeland", 2)];
        let stats = reconcile_batch(&mut conn, &batch).unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.updated, 1);

        let stored = db::find_by_name(&conn, "Dupeland").unwrap().unwrap();
        assert_eq!(stored.population, 2);
        assert_eq!(db::count_countries(&conn).unwrap(), 1);
    }

    #[test]
    fn test_mid_batch_failure_rolls_back_everything() {
        let mut conn = test_conn();

        // Pre-existing state that must survive the failed run untouched
        reconcile_batch(&mut conn, &[record("Oldland", 42)]).unwrap();

        // Injected store failure on the third record of five
        conn.execute_batch(
            "CREATE TRIGGER fail_on_poison BEFORE INSERT ON countries
             WHEN lower(NEW.name) = 'poison'
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
        )
        .unwrap();

        let batch = vec![
            record("Aland", 1),
            record("Bland", 2),
            record("Poison", 3),
            record("Dland", 4),
            record("Oldland", 99),
        ];

        let err = reconcile_batch(&mut conn, &batch);
        assert!(err.is_err());

        // Store equals the pre-run state: nothing inserted, nothing modified
        assert_eq!(db::count_countries(&conn).unwrap(), 1);
        let old = db::find_by_name(&conn, "Oldland").unwrap().unwrap();
        assert_eq!(old.population, 42);
        assert!(db::find_by_name(&conn, "Aland").unwrap().is_none());
        assert!(db::find_by_name(&conn, "Bland").unwrap().is_none());
    }

    #[test]
    fn test_empty_batch_commits_cleanly() {
        let mut conn = test_conn();
        let stats = reconcile_batch(&mut conn, &[]).unwrap();
        assert_eq!(stats.inserted, 0);
        assert_eq!(stats.updated, 0);
        assert_eq!(db::count_countries(&conn).unwrap(), 0);
    }
}
