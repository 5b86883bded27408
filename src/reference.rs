use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use tracing::{info, warn};

use crate::config::PanelConfig;
use crate::error::PanelError;
use crate::frame::{
    parse_code, parse_flag, parse_float, parse_int, read_csv_any_separator, require_columns,
};
use crate::schema::*;

/// Rows skipped per reference table because a key column was missing or unparseable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadDiagnostics {
    pub malformed_rows: BTreeMap<String, usize>,
}

impl LoadDiagnostics {
    fn record(&mut self, table: &str, skipped: usize) {
        if skipped > 0 {
            warn!(table, skipped, "skipped malformed reference rows");
        }
        *self.malformed_rows.entry(table.to_string()).or_default() += skipped;
    }

    pub fn total(&self) -> usize {
        self.malformed_rows.values().sum()
    }
}

/// City-market id to name, plus the vacation flag per city market.
#[derive(Debug, Clone)]
pub struct CityMarketLookup {
    /// `Code` (Int64), `Description` (String).
    pub names: DataFrame,
    /// `CityMarketID` (Int64), `Vacation` (Float64 0/1).
    pub vacations: DataFrame,
}

/// Normalized, keyed reference tables. Built once and shared read-only by all periods.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub city_markets: CityMarketLookup,
    /// `AirportID` (Int64), `Year` (Int64), `Population` (Float64, may be null).
    pub populations: DataFrame,
    /// `AirportID` (Int64), `SlotControlled` (Float64 0/1).
    pub slot_controlled: DataFrame,
    /// Long form: `AirportID` (Int64), `Carrier` (String), `Hub` (Float64 0/1).
    pub hubs: DataFrame,
    /// `carrier_code`, `carrier_name`; empty when no crosswalk was supplied.
    pub carrier_names: DataFrame,
    conus: BTreeSet<i64>,
    cpi: BTreeMap<i64, f64>,
    pub diagnostics: LoadDiagnostics,
}

impl ReferenceData {
    pub fn is_conus(&self, airport_id: i64) -> bool {
        self.conus.contains(&airport_id)
    }

    /// Eligible airport ids as a Series for `is_in` filters.
    pub fn conus_series(&self) -> Series {
        let ids: Vec<i64> = self.conus.iter().copied().collect();
        Series::new("conus".into(), ids)
    }

    /// CPI index for `year`, normalized so the base year is 1.0.
    pub fn deflator(&self, year: i64) -> Option<f64> {
        self.cpi.get(&year).copied()
    }

    /// Assemble reference data from already-normalized parts.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        city_markets: CityMarketLookup,
        populations: DataFrame,
        slot_controlled: DataFrame,
        hubs: DataFrame,
        carrier_names: DataFrame,
        conus: impl IntoIterator<Item = i64>,
        cpi: BTreeMap<i64, f64>,
    ) -> Self {
        Self {
            city_markets,
            populations,
            slot_controlled,
            hubs,
            carrier_names,
            conus: conus.into_iter().collect(),
            cpi,
            diagnostics: LoadDiagnostics::default(),
        }
    }
}

/// Loads every reference table named in the config and normalizes its keys.
pub struct ReferenceDataLoader<'a> {
    config: &'a PanelConfig,
    diagnostics: LoadDiagnostics,
}

impl<'a> ReferenceDataLoader<'a> {
    pub fn new(config: &'a PanelConfig) -> Self {
        Self {
            config,
            diagnostics: LoadDiagnostics::default(),
        }
    }

    pub fn load(mut self) -> Result<ReferenceData, PanelError> {
        let config = self.config;
        let files = &config.reference;

        let city_markets = CityMarketLookup {
            names: self.load_city_names(&config.reference_path(&files.city_markets))?,
            vacations: self.load_vacations(&config.reference_path(&files.vacations))?,
        };
        let populations = self.load_populations(&config.reference_path(&files.populations))?;
        let slot_controlled =
            self.load_slot_controlled(&config.reference_path(&files.slot_controlled))?;
        let conus = self.load_conus(
            &config.reference_path(&files.airports),
            &config.filters.excluded_states,
        )?;
        let hubs = self.load_hubs(&config.reference_path(&files.hubs))?;
        let cpi = load_cpi(
            &config.reference_path(&files.cpi),
            config.filters.cpi_base_year,
        )?;
        let carrier_names = self.load_carrier_names(&config.reference_path(&files.carriers))?;

        info!(
            city_markets = city_markets.names.height(),
            populations = populations.height(),
            slot_controlled = slot_controlled.height(),
            conus_airports = conus.len(),
            hubs = hubs.height(),
            cpi_years = cpi.len(),
            malformed_rows = self.diagnostics.total(),
            "reference data loaded"
        );

        Ok(ReferenceData {
            city_markets,
            populations,
            slot_controlled,
            hubs,
            carrier_names,
            conus,
            cpi,
            diagnostics: self.diagnostics,
        })
    }

    // ── Individual tables ───────────────────────────────────────────────────

    fn load_city_names(&mut self, path: &Path) -> Result<DataFrame, PanelError> {
        let required = [city_market::CODE, city_market::DESCRIPTION];
        let raw = read_table(path, "city_markets", &required)?;
        let parsed = raw
            .lazy()
            .select([
                parse_int(city_market::CODE),
                col(city_market::DESCRIPTION).str().strip_chars(lit(" \t\r\n")),
            ])
            .collect()?;
        let kept = self.drop_malformed(parsed, "city_markets", &[city_market::CODE])?;
        dedup_first(kept, &[city_market::CODE], &[city_market::DESCRIPTION])
    }

    fn load_vacations(&mut self, path: &Path) -> Result<DataFrame, PanelError> {
        let required = [vacation::CITY_MARKET_ID, vacation::VACATION];
        let raw = read_table(path, "vacations", &required)?;
        let parsed = raw
            .lazy()
            .select([parse_int(vacation::CITY_MARKET_ID), parse_flag(vacation::VACATION)])
            .collect()?;
        let kept = self.drop_malformed(parsed, "vacations", &[vacation::CITY_MARKET_ID])?;
        dedup_max(kept, &[vacation::CITY_MARKET_ID], vacation::VACATION)
    }

    fn load_populations(&mut self, path: &Path) -> Result<DataFrame, PanelError> {
        let required = [population::AIRPORT_ID, population::YEAR, population::POPULATION];
        let raw = read_table(path, "populations", &required)?;
        let parsed = raw
            .lazy()
            .select([
                parse_int(population::AIRPORT_ID),
                parse_int(population::YEAR),
                parse_float(population::POPULATION),
            ])
            .collect()?;
        let kept = self.drop_malformed(
            parsed,
            "populations",
            &[population::AIRPORT_ID, population::YEAR],
        )?;
        dedup_first(
            kept,
            &[population::AIRPORT_ID, population::YEAR],
            &[population::POPULATION],
        )
    }

    fn load_slot_controlled(&mut self, path: &Path) -> Result<DataFrame, PanelError> {
        let required = [slot::AIRPORT_ID, slot::SLOT_CONTROLLED];
        let raw = read_table(path, "slot_controlled", &required)?;
        let parsed = raw
            .lazy()
            .select([parse_int(slot::AIRPORT_ID), parse_flag(slot::SLOT_CONTROLLED)])
            .collect()?;
        let kept = self.drop_malformed(parsed, "slot_controlled", &[slot::AIRPORT_ID])?;
        dedup_max(kept, &[slot::AIRPORT_ID], slot::SLOT_CONTROLLED)
    }

    /// US airports outside the excluded states.
    fn load_conus(
        &mut self,
        path: &Path,
        excluded_states: &[String],
    ) -> Result<BTreeSet<i64>, PanelError> {
        let required = [airport::AIRPORT_ID, airport::COUNTRY, airport::STATE];
        let raw = read_table(path, "airports", &required)?;
        let parsed = raw
            .lazy()
            .select([
                parse_int(airport::AIRPORT_ID),
                parse_code(airport::COUNTRY),
                parse_code(airport::STATE),
            ])
            .collect()?;
        let kept = self.drop_malformed(parsed, "airports", &[airport::AIRPORT_ID])?;

        let excluded: Vec<String> = excluded_states
            .iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .collect();
        let excluded = Series::new("excluded".into(), excluded);

        let eligible = kept
            .lazy()
            .filter(
                col(airport::COUNTRY)
                    .eq(lit("US"))
                    .and(col(airport::STATE).is_in(lit(excluded).implode(), false).not()),
            )
            .collect()?;

        let ids = eligible
            .column(airport::AIRPORT_ID)?
            .as_materialized_series()
            .i64()?
            .into_iter()
            .flatten()
            .collect();
        Ok(ids)
    }

    /// Hub indicator in long form, reshaping the wide one-column-per-carrier layout.
    fn load_hubs(&mut self, path: &Path) -> Result<DataFrame, PanelError> {
        let raw = read_table_with(
            path,
            "hubs",
            &[hub::AIRPORT_ID],
            &[hub::AIRPORT_ID, hub::CARRIER, hub::HUB],
        )?;

        let long = if raw.column(hub::CARRIER).is_ok() {
            require_columns(&raw, "hubs", &[hub::HUB])?;
            raw.lazy()
                .select([
                    parse_int(hub::AIRPORT_ID),
                    parse_code(hub::CARRIER),
                    parse_flag(hub::HUB),
                ])
                .collect()?
        } else {
            let carriers: Vec<String> = raw
                .get_column_names_str()
                .iter()
                .filter(|c| **c != hub::AIRPORT_ID)
                .map(|c| c.to_string())
                .collect();
            wide_hubs_to_long(&raw, &carriers)?
        };

        let kept = self.drop_malformed(long, "hubs", &[hub::AIRPORT_ID, hub::CARRIER])?;
        dedup_max(kept, &[hub::AIRPORT_ID, hub::CARRIER], hub::HUB)
    }

    fn load_carrier_names(&mut self, path: &Path) -> Result<DataFrame, PanelError> {
        if !path.exists() {
            warn!(path = %path.display(), "no carrier crosswalk; carrier_name stays empty");
            return Ok(DataFrame::new(vec![
                Column::new(carrier_names::CODE.into(), Vec::<String>::new()),
                Column::new(carrier_names::NAME.into(), Vec::<String>::new()),
            ])?);
        }
        let required = [carrier_names::CODE, carrier_names::NAME];
        let raw = read_table(path, "carriers", &required)?;
        let parsed = raw
            .lazy()
            .select([
                parse_code(carrier_names::CODE),
                col(carrier_names::NAME).str().strip_chars(lit(" \t\r\n")),
            ])
            .filter(col(carrier_names::CODE).neq(lit("")))
            .collect()?;
        let kept = self.drop_malformed(parsed, "carriers", &[carrier_names::CODE])?;
        dedup_first(kept, &[carrier_names::CODE], &[carrier_names::NAME])
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    fn drop_malformed(
        &mut self,
        df: DataFrame,
        table: &str,
        keys: &[&str],
    ) -> Result<DataFrame, PanelError> {
        let before = df.height();
        let predicate = keys
            .iter()
            .map(|k| col(*k).is_not_null())
            .reduce(|acc, e| acc.and(e))
            .unwrap_or_else(|| lit(true));
        let kept = df.lazy().filter(predicate).collect()?;
        self.diagnostics.record(table, before - kept.height());
        Ok(kept)
    }
}

fn read_table(path: &Path, table: &str, required: &[&str]) -> Result<DataFrame, PanelError> {
    read_table_with(path, table, required, required)
}

/// Like [`read_table`], also matching the optional `canonical` headers
/// case-insensitively.
fn read_table_with(
    path: &Path,
    table: &str,
    required: &[&str],
    canonical: &[&str],
) -> Result<DataFrame, PanelError> {
    let df = read_csv_any_separator(path, required, canonical)?;
    require_columns(&df, table, required)?;
    Ok(df)
}

fn wide_hubs_to_long(raw: &DataFrame, carriers: &[String]) -> Result<DataFrame, PanelError> {
    if carriers.is_empty() {
        return Ok(DataFrame::new(vec![
            Column::new(hub::AIRPORT_ID.into(), Vec::<i64>::new()),
            Column::new(hub::CARRIER.into(), Vec::<String>::new()),
            Column::new(hub::HUB.into(), Vec::<f64>::new()),
        ])?);
    }
    let frames: Vec<LazyFrame> = carriers
        .iter()
        .map(|carrier| {
            raw.clone().lazy().select([
                parse_int(hub::AIRPORT_ID),
                lit(carrier.trim().to_ascii_uppercase()).alias(hub::CARRIER),
                parse_flag(carrier).alias(hub::HUB),
            ])
        })
        .collect();
    Ok(concat(frames, UnionArgs::default())?.collect()?)
}

/// Keep the first row per primary key, in file order.
fn dedup_first(df: DataFrame, keys: &[&str], values: &[&str]) -> Result<DataFrame, PanelError> {
    let key_exprs: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
    let value_exprs: Vec<Expr> = values.iter().map(|v| col(*v).first()).collect();
    Ok(df.lazy().group_by_stable(key_exprs).agg(value_exprs).collect()?)
}

/// Collapse duplicate keys of a 0/1 flag table; any positive row wins.
fn dedup_max(df: DataFrame, keys: &[&str], flag: &str) -> Result<DataFrame, PanelError> {
    let key_exprs: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
    Ok(df
        .lazy()
        .group_by_stable(key_exprs)
        .agg([col(flag).max()])
        .collect()?)
}

/// Annual CPI normalized so `base_year` is 1.0.
///
/// Accepts an annual table (`year`, `value`) or monthly observations
/// (`date` as YYYY-MM-DD, `value`), which are averaged per calendar year.
pub fn load_cpi(path: &Path, base_year: i64) -> Result<BTreeMap<i64, f64>, PanelError> {
    let raw = read_table_with(path, "cpi", &[cpi::VALUE], &[cpi::VALUE, cpi::YEAR, cpi::DATE])?;
    let values: Vec<Option<f64>> = raw
        .clone()
        .lazy()
        .select([parse_float(cpi::VALUE)])
        .collect()?
        .column(cpi::VALUE)?
        .as_materialized_series()
        .f64()?
        .into_iter()
        .collect();

    let years: Vec<Option<i64>> = if raw.column(cpi::YEAR).is_ok() {
        raw.clone()
            .lazy()
            .select([parse_int(cpi::YEAR)])
            .collect()?
            .column(cpi::YEAR)?
            .as_materialized_series()
            .i64()?
            .into_iter()
            .collect()
    } else if raw.column(cpi::DATE).is_ok() {
        raw.column(cpi::DATE)?
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|d| {
                d.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
                    .map(|date| date.year() as i64)
            })
            .collect()
    } else {
        return Err(PanelError::missing_column("cpi", cpi::YEAR));
    };

    let mut sums: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for (year, value) in years.into_iter().zip(values) {
        if let (Some(year), Some(value)) = (year, value) {
            let entry = sums.entry(year).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    let annual: BTreeMap<i64, f64> = sums
        .into_iter()
        .map(|(year, (sum, n))| (year, sum / n as f64))
        .collect();

    let base = annual
        .get(&base_year)
        .copied()
        .filter(|b| *b > 0.0)
        .ok_or_else(|| {
            PanelError::InvalidData(format!("CPI has no positive value for base year {base_year}"))
        })?;

    Ok(annual.into_iter().map(|(year, v)| (year, v / base)).collect())
}
