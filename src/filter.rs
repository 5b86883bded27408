use std::path::Path;

use polars::prelude::*;
use tracing::debug;

use crate::config::{FilterConfig, MarketSizeConfig};
use crate::error::PanelError;
use crate::frame::{parse_code, parse_float, parse_int, read_csv_any_separator, require_columns};
use crate::reference::ReferenceData;
use crate::schema::{enriched, extract, hub, population, slot, vacation};

/// Rows surviving each step of the filter/join stage for one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCounts {
    /// Rows in the extract file.
    pub raw: usize,
    /// Rows with usable keys that belong to the period.
    pub valid: usize,
    pub after_continuity: usize,
    pub after_fare_band: usize,
    pub after_conus: usize,
    pub after_market_size: usize,
    /// Surviving rows with no population match, per endpoint.
    pub unmatched_origin_population: usize,
    pub unmatched_dest_population: usize,
}

/// Read one period's raw extract into the typed ticket layout.
///
/// Returns the typed frame and the number of rows in the file. Rows with a
/// missing identifier, fewer than one passenger, or another period's
/// year/quarter are dropped here.
pub fn read_extract(
    path: &Path,
    year: i64,
    quarter: i64,
) -> Result<(DataFrame, usize), PanelError> {
    if !path.exists() {
        return Err(PanelError::MissingPeriodExtract {
            year,
            quarter,
            reason: format!("{} not found", path.display()),
        });
    }
    let raw = read_csv_any_separator(path, &extract::REQUIRED, &extract::REQUIRED)?;
    require_columns(&raw, "extract", &extract::REQUIRED)?;
    let raw_rows = raw.height();

    let mut parsed: Vec<Expr> = extract::ID_COLUMNS.iter().map(|c| parse_int(c)).collect();
    parsed.extend(extract::VALUE_COLUMNS.iter().map(|c| parse_float(c)));
    parsed.push(parse_code(extract::CARRIER));

    let typed = raw
        .lazy()
        .select(parsed)
        .with_column(col(extract::PASSENGERS).cast(DataType::Float64))
        .filter(
            col(extract::YEAR)
                .eq(lit(year))
                .and(col(extract::QUARTER).eq(lit(quarter))),
        )
        .collect()?;
    Ok((typed, raw_rows))
}

/// Business filters followed by the reference-table joins.
pub struct RecordFilterAndJoinStage<'a> {
    refs: &'a ReferenceData,
    filters: &'a FilterConfig,
    market_threshold: f64,
}

impl<'a> RecordFilterAndJoinStage<'a> {
    pub fn new(
        refs: &'a ReferenceData,
        filters: &'a FilterConfig,
        market_size: &MarketSizeConfig,
    ) -> Self {
        Self {
            refs,
            filters,
            market_threshold: market_size.quarterly_threshold(),
        }
    }

    /// Filter and enrich one period of typed tickets.
    ///
    /// `deflator` is the period's CPI index (base year = 1.0).
    pub fn run(
        &self,
        tickets: DataFrame,
        deflator: f64,
    ) -> Result<(DataFrame, FilterCounts), PanelError> {
        let mut counts = FilterCounts {
            raw: tickets.height(),
            ..Default::default()
        };

        let valid = tickets
            .lazy()
            .filter(
                [
                    extract::ORIGIN_CITY_MARKET_ID,
                    extract::DEST_CITY_MARKET_ID,
                    extract::ORIGIN_AIRPORT_ID,
                    extract::DEST_AIRPORT_ID,
                    extract::CARRIER,
                    extract::MKT_FARE,
                    extract::MKT_DISTANCE,
                    extract::NONSTOP_MILES,
                ]
                .iter()
                .map(|c| col(*c).is_not_null())
                .fold(col(extract::PASSENGERS).gt_eq(lit(1.0)), |acc, e| acc.and(e)),
            )
            .collect()?;
        counts.valid = valid.height();

        // 1. carrier did not change mid-itinerary
        let continuous = valid
            .lazy()
            .filter(col(extract::CARRIER_CHANGE).eq(lit(0.0)))
            .collect()?;
        counts.after_continuity = continuous.height();

        // 2. real fare inside the band
        let in_band = continuous
            .lazy()
            .with_column((col(extract::MKT_FARE) / lit(deflator)).alias(enriched::REAL_FARE))
            .filter(
                col(enriched::REAL_FARE)
                    .gt_eq(lit(self.filters.min_real_fare))
                    .and(col(enriched::REAL_FARE).lt_eq(lit(self.filters.max_real_fare))),
            )
            .collect()?;
        counts.after_fare_band = in_band.height();

        // 3. both endpoints in the CONUS set
        let conus = self.refs.conus_series();
        let domestic = in_band
            .lazy()
            .filter(
                col(extract::ORIGIN_AIRPORT_ID)
                    .is_in(lit(conus.clone()).implode(), false)
                    .and(col(extract::DEST_AIRPORT_ID).is_in(lit(conus).implode(), false)),
            )
            .collect()?;
        counts.after_conus = domestic.height();

        let joined = self.join_reference(domestic)?.collect()?;
        counts.unmatched_origin_population =
            joined.column(enriched::ORIGIN_POPULATION)?.null_count();
        counts.unmatched_dest_population = joined.column(enriched::DEST_POPULATION)?.null_count();

        // 4. city-market pairs with enough traffic
        let dense = joined
            .lazy()
            .with_column(
                col(extract::PASSENGERS)
                    .sum()
                    .over([
                        col(extract::ORIGIN_CITY_MARKET_ID),
                        col(extract::DEST_CITY_MARKET_ID),
                    ])
                    .alias(enriched::MARKET_PASSENGERS),
            )
            .filter(col(enriched::MARKET_PASSENGERS).gt_eq(lit(self.market_threshold)))
            .collect()?;
        counts.after_market_size = dense.height();

        debug!(?counts, "filter stage finished");
        Ok((dense, counts))
    }

    /// Left-join every reference attribute; unmatched flags become 0, unmatched
    /// populations stay null.
    fn join_reference(&self, tickets: DataFrame) -> Result<LazyFrame, PanelError> {
        let refs = self.refs;
        let left = JoinArgs::new(JoinType::Left);

        let slot_for = |key: &str, alias: &str| {
            refs.slot_controlled.clone().lazy().select([
                col(slot::AIRPORT_ID).alias(key),
                col(slot::SLOT_CONTROLLED).alias(alias),
            ])
        };
        let population_for = |key: &str, alias: &str| {
            refs.populations.clone().lazy().select([
                col(population::AIRPORT_ID).alias(key),
                col(population::YEAR).alias(extract::YEAR),
                col(population::POPULATION).alias(alias),
            ])
        };
        let hub_for = |key: &str, alias: &str| {
            refs.hubs.clone().lazy().select([
                col(hub::AIRPORT_ID).alias(key),
                col(hub::CARRIER).alias(extract::CARRIER),
                col(hub::HUB).alias(alias),
            ])
        };
        let vacations = refs.city_markets.vacations.clone().lazy().select([
            col(vacation::CITY_MARKET_ID).alias(extract::DEST_CITY_MARKET_ID),
            col(vacation::VACATION).alias(enriched::DEST_VACATION),
        ]);

        let lf = tickets
            .lazy()
            .join(
                slot_for(extract::ORIGIN_AIRPORT_ID, enriched::ORIGIN_SLOT),
                [col(extract::ORIGIN_AIRPORT_ID)],
                [col(extract::ORIGIN_AIRPORT_ID)],
                left.clone(),
            )
            .join(
                slot_for(extract::DEST_AIRPORT_ID, enriched::DEST_SLOT),
                [col(extract::DEST_AIRPORT_ID)],
                [col(extract::DEST_AIRPORT_ID)],
                left.clone(),
            )
            .join(
                vacations,
                [col(extract::DEST_CITY_MARKET_ID)],
                [col(extract::DEST_CITY_MARKET_ID)],
                left.clone(),
            )
            .join(
                population_for(extract::ORIGIN_AIRPORT_ID, enriched::ORIGIN_POPULATION),
                [col(extract::ORIGIN_AIRPORT_ID), col(extract::YEAR)],
                [col(extract::ORIGIN_AIRPORT_ID), col(extract::YEAR)],
                left.clone(),
            )
            .join(
                population_for(extract::DEST_AIRPORT_ID, enriched::DEST_POPULATION),
                [col(extract::DEST_AIRPORT_ID), col(extract::YEAR)],
                [col(extract::DEST_AIRPORT_ID), col(extract::YEAR)],
                left.clone(),
            )
            .join(
                hub_for(extract::ORIGIN_AIRPORT_ID, enriched::ORIGIN_HUB),
                [col(extract::ORIGIN_AIRPORT_ID), col(extract::CARRIER)],
                [col(extract::ORIGIN_AIRPORT_ID), col(extract::CARRIER)],
                left.clone(),
            )
            .join(
                hub_for(extract::DEST_AIRPORT_ID, enriched::DEST_HUB),
                [col(extract::DEST_AIRPORT_ID), col(extract::CARRIER)],
                [col(extract::DEST_AIRPORT_ID), col(extract::CARRIER)],
                left,
            )
            .with_columns([
                col(enriched::ORIGIN_SLOT).fill_null(lit(0.0)),
                col(enriched::DEST_SLOT).fill_null(lit(0.0)),
                col(enriched::DEST_VACATION).fill_null(lit(0.0)),
                col(enriched::ORIGIN_HUB).fill_null(lit(0.0)),
                col(enriched::DEST_HUB).fill_null(lit(0.0)),
                when(col(extract::MKT_COUPONS).eq(lit(1)))
                    .then(lit(1.0))
                    .otherwise(lit(0.0))
                    .alias(enriched::NONSTOP),
            ]);
        Ok(lf)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::records::TicketRecord;
    use crate::reference::CityMarketLookup;
    use crate::schema::{carrier_names, city_market};

    pub(crate) fn ticket(
        origin: i64,
        dest: i64,
        carrier: &str,
        pax: f64,
        fare: f64,
    ) -> TicketRecord {
        TicketRecord {
            origin_city_market: origin + 20000,
            dest_city_market: dest + 20000,
            origin_airport: origin,
            dest_airport: dest,
            carrier: carrier.to_string(),
            passengers: pax,
            fare,
            distance: 600.0,
            nonstop_miles: 500.0,
            coupons: 1,
            carrier_changed: false,
            year: 2010,
            quarter: 1,
        }
    }

    /// Airports 10001..=10004 are CONUS; 10001 is slot-controlled and a DL hub;
    /// 10002 is a vacation market; every airport but 10004 has a 2010 population.
    pub(crate) fn reference_fixture() -> ReferenceData {
        let city_markets = CityMarketLookup {
            names: DataFrame::new(vec![
                Column::new(city_market::CODE.into(), vec![30001i64, 30002]),
                Column::new(city_market::DESCRIPTION.into(), vec!["Alpha", "Beta"]),
            ])
            .unwrap(),
            vacations: DataFrame::new(vec![
                Column::new(vacation::CITY_MARKET_ID.into(), vec![30002i64]),
                Column::new(vacation::VACATION.into(), vec![1.0]),
            ])
            .unwrap(),
        };
        let populations = DataFrame::new(vec![
            Column::new(population::AIRPORT_ID.into(), vec![10001i64, 10002, 10003]),
            Column::new(population::YEAR.into(), vec![2010i64, 2010, 2010]),
            Column::new(population::POPULATION.into(), vec![4.0e6, 1.0e6, 9.0e6]),
        ])
        .unwrap();
        let slots = DataFrame::new(vec![
            Column::new(slot::AIRPORT_ID.into(), vec![10001i64]),
            Column::new(slot::SLOT_CONTROLLED.into(), vec![1.0]),
        ])
        .unwrap();
        let hubs = DataFrame::new(vec![
            Column::new(hub::AIRPORT_ID.into(), vec![10001i64, 10001]),
            Column::new(hub::CARRIER.into(), vec!["DL", "AA"]),
            Column::new(hub::HUB.into(), vec![1.0, 0.0]),
        ])
        .unwrap();
        let names = DataFrame::new(vec![
            Column::new(carrier_names::CODE.into(), vec!["DL"]),
            Column::new(carrier_names::NAME.into(), vec!["Delta Air Lines Inc."]),
        ])
        .unwrap();
        let cpi = BTreeMap::from([(2008, 1.0), (2010, 2.0)]);
        ReferenceData::from_parts(
            city_markets,
            populations,
            slots,
            hubs,
            names,
            [10001, 10002, 10003, 10004],
            cpi,
        )
    }

    fn lenient_market_size() -> MarketSizeConfig {
        MarketSizeConfig {
            target_daily_passengers: 0.0,
            sampling_rate: 1.0,
        }
    }

    fn f64_at(df: &DataFrame, column: &str, row: usize) -> Option<f64> {
        df.column(column)
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .get(row)
    }

    #[test]
    fn test_filters_apply_in_order_and_are_counted() {
        let refs = reference_fixture();
        let filters = FilterConfig::default();
        let stage = RecordFilterAndJoinStage::new(&refs, &filters, &lenient_market_size());

        let mut changed = ticket(10001, 10002, "DL", 1.0, 200.0);
        changed.carrier_changed = true;
        let tickets = vec![
            ticket(10001, 10002, "DL", 1.0, 200.0),
            changed,
            // real fare 20 and 5100 with a deflator of 2
            ticket(10001, 10002, "DL", 1.0, 40.0),
            ticket(10001, 10002, "DL", 1.0, 5200.0),
            // 99999 is not CONUS
            ticket(10001, 99999, "DL", 1.0, 200.0),
            ticket(10001, 10002, "DL", 0.0, 200.0),
        ];
        let df = TicketRecord::to_frame(&tickets).unwrap();

        let (out, counts) = stage.run(df, 2.0).unwrap();
        assert_eq!(counts.raw, 6);
        assert_eq!(counts.valid, 5);
        assert_eq!(counts.after_continuity, 4);
        assert_eq!(counts.after_fare_band, 2);
        assert_eq!(counts.after_conus, 1);
        assert_eq!(counts.after_market_size, 1);
        assert_eq!(out.height(), 1);
        assert_eq!(f64_at(&out, enriched::REAL_FARE, 0), Some(100.0));
    }

    #[test]
    fn test_rows_without_distance_are_invalid() {
        let refs = reference_fixture();
        let filters = FilterConfig::default();
        let stage = RecordFilterAndJoinStage::new(&refs, &filters, &lenient_market_size());

        let mut df = TicketRecord::to_frame(&[
            ticket(10001, 10002, "DL", 10.0, 200.0),
            ticket(10001, 10002, "DL", 20.0, 200.0),
            ticket(10001, 10002, "DL", 30.0, 200.0),
        ])
        .unwrap();
        df.with_column(Column::new(
            extract::MKT_DISTANCE.into(),
            vec![Some(600.0), None, Some(800.0)],
        ))
        .unwrap();
        df.with_column(Column::new(
            extract::NONSTOP_MILES.into(),
            vec![Some(500.0), Some(500.0), None],
        ))
        .unwrap();

        let (out, counts) = stage.run(df, 1.0).unwrap();
        assert_eq!(counts.raw, 3);
        assert_eq!(counts.valid, 1);
        assert_eq!(out.height(), 1);
        assert_eq!(f64_at(&out, extract::PASSENGERS, 0), Some(10.0));
    }

    #[test]
    fn test_joins_default_unmatched_rows() {
        let refs = reference_fixture();
        let filters = FilterConfig::default();
        let stage = RecordFilterAndJoinStage::new(&refs, &filters, &lenient_market_size());

        let mut connecting = ticket(10003, 10004, "AA", 1.0, 300.0);
        connecting.coupons = 2;
        let df = TicketRecord::to_frame(&[ticket(10001, 10002, "DL", 1.0, 200.0), connecting])
            .unwrap();
        let (out, counts) = stage.run(df, 1.0).unwrap();
        let out = out
            .lazy()
            .sort([extract::ORIGIN_AIRPORT_ID], Default::default())
            .collect()
            .unwrap();

        assert_eq!(out.height(), 2);
        assert_eq!(f64_at(&out, enriched::ORIGIN_SLOT, 0), Some(1.0));
        assert_eq!(f64_at(&out, enriched::ORIGIN_HUB, 0), Some(1.0));
        assert_eq!(f64_at(&out, enriched::DEST_VACATION, 0), Some(1.0));
        assert_eq!(f64_at(&out, enriched::NONSTOP, 0), Some(1.0));
        assert_eq!(f64_at(&out, enriched::ORIGIN_POPULATION, 0), Some(4.0e6));

        assert_eq!(f64_at(&out, enriched::ORIGIN_SLOT, 1), Some(0.0));
        assert_eq!(f64_at(&out, enriched::ORIGIN_HUB, 1), Some(0.0));
        assert_eq!(f64_at(&out, enriched::DEST_VACATION, 1), Some(0.0));
        assert_eq!(f64_at(&out, enriched::NONSTOP, 1), Some(0.0));
        assert_eq!(f64_at(&out, enriched::DEST_POPULATION, 1), None);
        assert_eq!(counts.unmatched_dest_population, 1);
        assert_eq!(counts.unmatched_origin_population, 0);
    }

    #[test]
    fn test_market_size_threshold() {
        let refs = reference_fixture();
        let filters = FilterConfig::default();
        // 4 passengers/day on a 1% sample: 3.65 sampled passengers per quarter
        let market_size = MarketSizeConfig {
            target_daily_passengers: 4.0,
            sampling_rate: 0.01,
        };
        let stage = RecordFilterAndJoinStage::new(&refs, &filters, &market_size);

        let df = TicketRecord::to_frame(&[
            ticket(10001, 10002, "DL", 2.0, 200.0),
            ticket(10001, 10002, "AA", 2.0, 200.0),
            ticket(10003, 10002, "DL", 3.0, 200.0),
        ])
        .unwrap();
        let (out, counts) = stage.run(df, 1.0).unwrap();
        assert_eq!(counts.after_conus, 3);
        assert_eq!(counts.after_market_size, 2);
        assert_eq!(out.height(), 2);
    }

    #[test]
    fn test_read_extract_missing_file() {
        let err = read_extract(Path::new("/nonexistent/db1b_market_2010q1.csv"), 2010, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            PanelError::MissingPeriodExtract { year: 2010, quarter: 1, .. }
        ));
    }

    #[test]
    fn test_read_extract_parses_and_scopes_period() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        std::fs::write(
            &path,
            "ORIGINCITYMARKETID|DestCityMarketID|OriginAirportID|DestAirportID|Passengers|MktFare|\
             MktDistance|NonStopMiles|MktCoupons|TkCarrier|TkCarrierChange|Year|Quarter|Extra\n\
             30001|30002|10001|10002|1.00|210.50|600.00|500.00|1|dl|0.00|2010|1|x\n\
             30001|30002|10001|10002|1.00|210.50|600.00|500.00|1|DL|0.00|2010|2|x\n",
        )
        .unwrap();

        let (df, raw) = read_extract(&path, 2010, 1).unwrap();
        assert_eq!(raw, 2);
        assert_eq!(df.height(), 1);
        let carrier = df
            .column(extract::CARRIER)
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .get(0)
            .map(|s| s.to_string());
        assert_eq!(carrier.as_deref(), Some("DL"));
        assert_eq!(f64_at(&df, extract::MKT_FARE, 0), Some(210.5));
    }
}
