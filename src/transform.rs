use crate::db::Country;
use crate::fetch::{CatalogEntry, CurrencyEntry};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;

/// Bounds of the random GDP multiplier. The draw range is a documented
/// contract: estimated GDP is intentionally non-reproducible across runs.
pub const MULTIPLIER_MIN: f64 = 1000.0;
pub const MULTIPLIER_MAX: f64 = 2000.0;

/// Source of the GDP multiplier, isolated so tests can pin the draw.
pub trait Multiplier {
    /// Returns a value in [MULTIPLIER_MIN, MULTIPLIER_MAX).
    fn draw(&mut self) -> f64;
}

/// Production multiplier: uniform draw from the thread RNG.
#[derive(Debug, Default)]
pub struct UniformMultiplier;

impl Multiplier for UniformMultiplier {
    fn draw(&mut self) -> f64 {
        rand::thread_rng().gen_range(MULTIPLIER_MIN..MULTIPLIER_MAX)
    }
}

/// Pinned multiplier for deterministic tests.
#[derive(Debug)]
pub struct FixedMultiplier(pub f64);

impl Multiplier for FixedMultiplier {
    fn draw(&mut self) -> f64 {
        self.0
    }
}

/// Code of the first entry in the currency list, if any.
pub fn pick_currency_code(currencies: Option<&[CurrencyEntry]>) -> Option<String> {
    currencies?.first()?.code.clone()
}

/// Map one raw catalog entry to a country record using the fetched rate
/// table. Pure given the injected multiplier source.
///
/// Currency-availability policy:
/// - no currency at all: rate null, GDP exactly 0
/// - currency priced in the table: rate looked up, GDP derived
/// - currency present but unpriced: rate and GDP both null
pub fn transform_entry<M: Multiplier>(
    entry: &CatalogEntry,
    rates: &HashMap<String, f64>,
    multiplier: &mut M,
    now: DateTime<Utc>,
) -> Country {
    let currency_code = pick_currency_code(entry.currencies.as_deref());
    let population = entry.population.unwrap_or(0).max(0);

    let mut exchange_rate = None;
    let mut estimated_gdp = None;

    match &currency_code {
        None => {
            // "no currency" is distinguishable from "unpriceable": zero, not null
            estimated_gdp = Some(0.0);
        }
        Some(code) => {
            // Zero or negative upstream rates are unusable, treat as unpriced
            if let Some(&rate) = rates.get(code).filter(|r| **r > 0.0) {
                exchange_rate = Some(rate);
                estimated_gdp = Some(population as f64 * multiplier.draw() / rate);
            }
        }
    }

    Country {
        id: None,
        name: entry.name.clone(),
        capital: entry.capital.clone(),
        region: entry.region.clone(),
        population,
        currency_code,
        exchange_rate,
        estimated_gdp,
        flag_url: entry.flag.clone(),
        last_refreshed_at: now,
    }
}

/// Transform the whole catalog with one shared refresh timestamp.
pub fn transform_batch<M: Multiplier>(
    entries: &[CatalogEntry],
    rates: &HashMap<String, f64>,
    multiplier: &mut M,
) -> Vec<Country> {
    let now = Utc::now();
    entries
        .iter()
        .map(|entry| transform_entry(entry, rates, multiplier, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, population: Option<i64>, codes: &[&str]) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            capital: Some("Capital".to_string()),
            region: Some("Region".to_string()),
            population,
            flag: None,
            currencies: Some(
                codes
                    .iter()
                    .map(|code| CurrencyEntry {
                        code: Some(code.to_string()),
                        name: None,
                        symbol: None,
                    })
                    .collect(),
            ),
        }
    }

    fn rates(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs
            .iter()
            .map(|(code, rate)| (code.to_string(), *rate))
            .collect()
    }

    #[test]
    fn test_no_currency_means_zero_gdp_not_null() {
        let mut e = entry("Testland", Some(1000), &[]);
        let out = transform_entry(&e, &rates(&[]), &mut FixedMultiplier(1500.0), Utc::now());
        assert_eq!(out.currency_code, None);
        assert_eq!(out.exchange_rate, None);
        assert_eq!(out.estimated_gdp, Some(0.0));
        assert_eq!(out.population, 1000);

        // Absent list behaves like an empty one
        e.currencies = None;
        let out = transform_entry(&e, &rates(&[]), &mut FixedMultiplier(1500.0), Utc::now());
        assert_eq!(out.estimated_gdp, Some(0.0));
    }

    #[test]
    fn test_priced_currency_derives_gdp() {
        let e = entry("A", Some(100), &["EUR"]);
        let table = rates(&[("EUR", 0.5)]);
        let out = transform_entry(&e, &table, &mut FixedMultiplier(1200.0), Utc::now());

        assert_eq!(out.currency_code.as_deref(), Some("EUR"));
        assert_eq!(out.exchange_rate, Some(0.5));
        assert_eq!(out.estimated_gdp, Some(100.0 * 1200.0 / 0.5));
    }

    #[test]
    fn test_unpriced_currency_yields_nulls() {
        let e = entry("A", Some(100), &["XYZ"]);
        let table = rates(&[("EUR", 0.5)]);
        let out = transform_entry(&e, &table, &mut FixedMultiplier(1200.0), Utc::now());

        assert_eq!(out.currency_code.as_deref(), Some("XYZ"));
        assert_eq!(out.exchange_rate, None);
        assert_eq!(out.estimated_gdp, None);
    }

    #[test]
    fn test_first_currency_wins() {
        let e = entry("A", Some(10), &["AAA", "BBB"]);
        let table = rates(&[("AAA", 2.0), ("BBB", 4.0)]);
        let out = transform_entry(&e, &table, &mut FixedMultiplier(1000.0), Utc::now());
        assert_eq!(out.currency_code.as_deref(), Some("AAA"));
        assert_eq!(out.exchange_rate, Some(2.0));
    }

    #[test]
    fn test_missing_population_defaults_to_zero() {
        let e = entry("A", None, &["EUR"]);
        let table = rates(&[("EUR", 0.5)]);
        let out = transform_entry(&e, &table, &mut FixedMultiplier(1999.0), Utc::now());
        assert_eq!(out.population, 0);
        assert_eq!(out.estimated_gdp, Some(0.0));
    }

    #[test]
    fn test_zero_rate_treated_as_unpriced() {
        let e = entry("A", Some(100), &["ZRR"]);
        let table = rates(&[("ZRR", 0.0)]);
        let out = transform_entry(&e, &table, &mut FixedMultiplier(1000.0), Utc::now());
        assert_eq!(out.exchange_rate, None);
        assert_eq!(out.estimated_gdp, None);
    }

    #[test]
    fn test_uniform_multiplier_stays_in_range() {
        let mut m = UniformMultiplier;
        for _ in 0..1000 {
            let draw = m.draw();
            assert!((MULTIPLIER_MIN..MULTIPLIER_MAX).contains(&draw));
        }
    }

    #[test]
    fn test_batch_shares_one_timestamp() {
        let entries = vec![entry("A", Some(1), &[]), entry("B", Some(2), &[])];
        let batch = transform_batch(&entries, &rates(&[]), &mut FixedMultiplier(1000.0));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].last_refreshed_at, batch[1].last_refreshed_at);
    }
}
