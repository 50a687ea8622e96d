use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Persisted per-country record.
/// `name` is the natural key; the refresh pipeline treats it as unique
/// case-insensitively even though the schema declares no constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Country {
    /// Row id. `None` for records that have not been stored yet; the
    /// reconciler preserves it across in-place updates.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub name: String,
    pub capital: Option<String>,
    pub region: Option<String>,

    /// Defaults to 0 when the catalog omits it.
    pub population: i64,

    /// First code in the catalog entry's currency list, if any.
    pub currency_code: Option<String>,

    /// Looked-up rate. `None` when the country has no currency or the
    /// currency is not in the rate table.
    pub exchange_rate: Option<f64>,

    /// Derived metric: population * multiplier / exchange_rate.
    /// Exactly 0 (not null) when the country has no currency at all;
    /// null when the currency exists but is unpriced.
    pub estimated_gdp: Option<f64>,

    pub flag_url: Option<String>,

    /// Stamped by the transformer on every write the pipeline performs.
    pub last_refreshed_at: DateTime<Utc>,
}

const COUNTRY_COLUMNS: &str = "id, name, capital, region, population, currency_code, \
     exchange_rate, estimated_gdp, flag_url, last_refreshed_at";

fn country_from_row(row: &Row<'_>) -> rusqlite::Result<Country> {
    let refreshed_str: String = row.get(9)?;
    let last_refreshed_at = DateTime::parse_from_rfc3339(&refreshed_str)
        .map_err(|_| rusqlite::Error::InvalidQuery)?
        .with_timezone(&Utc);

    Ok(Country {
        id: row.get(0)?,
        name: row.get(1)?,
        capital: row.get(2)?,
        region: row.get(3)?,
        population: row.get(4)?,
        currency_code: row.get(5)?,
        exchange_rate: row.get(6)?,
        estimated_gdp: row.get(7)?,
        flag_url: row.get(8)?,
        last_refreshed_at,
    })
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS countries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            capital TEXT,
            region TEXT,
            population INTEGER NOT NULL DEFAULT 0,
            currency_code TEXT,
            exchange_rate REAL,
            estimated_gdp REAL,
            flag_url TEXT,
            last_refreshed_at TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Backs the reconciler's case-insensitive lookup
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_countries_name_lower ON countries(lower(name))",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_countries_gdp ON countries(estimated_gdp)",
        [],
    )?;

    Ok(())
}

/// Case-insensitive lookup by name.
pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Country>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COUNTRY_COLUMNS} FROM countries WHERE lower(name) = lower(?1)"
    ))?;

    let country = stmt
        .query_row(params![name], country_from_row)
        .optional()?;

    Ok(country)
}

/// Case-insensitive id-only lookup, used by the reconciler inside its
/// transaction to decide insert vs update.
pub fn find_id_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM countries WHERE lower(name) = lower(?1)",
        params![name],
        |row| row.get(0),
    )
    .optional()
}

pub fn insert_country(conn: &Connection, country: &Country) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO countries (
            name, capital, region, population, currency_code,
            exchange_rate, estimated_gdp, flag_url, last_refreshed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            country.name,
            country.capital,
            country.region,
            country.population,
            country.currency_code,
            country.exchange_rate,
            country.estimated_gdp,
            country.flag_url,
            country.last_refreshed_at.to_rfc3339(),
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Overwrite every field of an existing row, preserving its id.
pub fn update_country(conn: &Connection, id: i64, country: &Country) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE countries
         SET name = ?1, capital = ?2, region = ?3, population = ?4,
             currency_code = ?5, exchange_rate = ?6, estimated_gdp = ?7,
             flag_url = ?8, last_refreshed_at = ?9
         WHERE id = ?10",
        params![
            country.name,
            country.capital,
            country.region,
            country.population,
            country.currency_code,
            country.exchange_rate,
            country.estimated_gdp,
            country.flag_url,
            country.last_refreshed_at.to_rfc3339(),
            id,
        ],
    )?;

    Ok(())
}

/// Delete by case-insensitive name. Returns true when a row was removed.
pub fn delete_by_name(conn: &Connection, name: &str) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM countries WHERE lower(name) = lower(?1)",
        params![name],
    )?;

    Ok(removed > 0)
}

pub fn count_countries(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM countries", [], |row| row.get(0))
}

/// Top `limit` records by estimated GDP descending, nulls last.
pub fn top_by_gdp(conn: &Connection, limit: i64) -> rusqlite::Result<Vec<Country>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COUNTRY_COLUMNS} FROM countries
         ORDER BY estimated_gdp IS NULL, estimated_gdp DESC
         LIMIT ?1"
    ))?;

    let countries = stmt
        .query_map(params![limit], country_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(countries)
}

/// Most recent refresh stamp across all rows, if any row exists.
pub fn last_refreshed(conn: &Connection) -> Result<Option<DateTime<Utc>>> {
    let max: Option<String> = conn.query_row(
        "SELECT MAX(last_refreshed_at) FROM countries",
        [],
        |row| row.get(0),
    )?;

    Ok(max
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

/// Filtered listing for the query layer: optional exact region and
/// currency-code matches, optionally sorted by estimated GDP descending.
pub fn list_countries(
    conn: &Connection,
    region: Option<&str>,
    currency: Option<&str>,
    gdp_desc: bool,
) -> Result<Vec<Country>> {
    let mut sql = format!("SELECT {COUNTRY_COLUMNS} FROM countries");
    let mut args: Vec<String> = Vec::new();

    let mut clauses: Vec<String> = Vec::new();
    if let Some(region) = region {
        args.push(region.to_string());
        clauses.push(format!("region = ?{}", args.len()));
    }
    if let Some(currency) = currency {
        args.push(currency.to_string());
        clauses.push(format!("currency_code = ?{}", args.len()));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if gdp_desc {
        sql.push_str(" ORDER BY estimated_gdp IS NULL, estimated_gdp DESC");
    } else {
        sql.push_str(" ORDER BY name");
    }

    let mut stmt = conn.prepare(&sql)?;
    let countries = stmt
        .query_map(params_from_iter(args), country_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(countries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_country(name: &str, gdp: Option<f64>) -> Country {
        Country {
            id: None,
            name: name.to_string(),
            capital: Some("Capital City".to_string()),
            region: Some("Testing".to_string()),
            population: 1_000,
            currency_code: Some("TST".to_string()),
            exchange_rate: Some(2.0),
            estimated_gdp: gdp,
            flag_url: None,
            last_refreshed_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_case_insensitive_lookup() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let id = insert_country(&conn, &test_country("Testland", Some(1.0))).unwrap();

        let found = find_by_name(&conn, "tEsTlAnD").unwrap().unwrap();
        assert_eq!(found.id, Some(id));
        assert_eq!(found.name, "Testland");
        assert_eq!(found.population, 1_000);

        assert!(find_by_name(&conn, "Atlantis").unwrap().is_none());
    }

    #[test]
    fn test_update_preserves_id() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let id = insert_country(&conn, &test_country("Testland", Some(1.0))).unwrap();

        let mut replacement = test_country("TESTLAND", Some(99.0));
        replacement.population = 2_000;
        update_country(&conn, id, &replacement).unwrap();

        let found = find_by_name(&conn, "testland").unwrap().unwrap();
        assert_eq!(found.id, Some(id));
        assert_eq!(found.name, "TESTLAND");
        assert_eq!(found.population, 2_000);
        assert_eq!(found.estimated_gdp, Some(99.0));
        assert_eq!(count_countries(&conn).unwrap(), 1);
    }

    #[test]
    fn test_top_by_gdp_nulls_last() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        insert_country(&conn, &test_country("NoGdp", None)).unwrap();
        insert_country(&conn, &test_country("Small", Some(10.0))).unwrap();
        insert_country(&conn, &test_country("Big", Some(500.0))).unwrap();
        insert_country(&conn, &test_country("Mid", Some(50.0))).unwrap();

        let top = top_by_gdp(&conn, 3).unwrap();
        let names: Vec<&str> = top.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Big", "Mid", "Small"]);
    }

    #[test]
    fn test_list_countries_filters() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let mut a = test_country("Aland", Some(5.0));
        a.region = Some("North".to_string());
        a.currency_code = Some("AAA".to_string());
        insert_country(&conn, &a).unwrap();

        let mut b = test_country("Bland", Some(50.0));
        b.region = Some("South".to_string());
        b.currency_code = Some("BBB".to_string());
        insert_country(&conn, &b).unwrap();

        let north = list_countries(&conn, Some("North"), None, false).unwrap();
        assert_eq!(north.len(), 1);
        assert_eq!(north[0].name, "Aland");

        let bbb = list_countries(&conn, None, Some("BBB"), false).unwrap();
        assert_eq!(bbb.len(), 1);
        assert_eq!(bbb[0].name, "Bland");

        let sorted = list_countries(&conn, None, None, true).unwrap();
        assert_eq!(sorted[0].name, "Bland");
    }

    #[test]
    fn test_delete_by_name() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        insert_country(&conn, &test_country("Testland", None)).unwrap();

        assert!(delete_by_name(&conn, "TESTLAND").unwrap());
        assert!(!delete_by_name(&conn, "TESTLAND").unwrap());
        assert_eq!(count_countries(&conn).unwrap(), 0);
    }
}
