use polars::prelude::*;
use tracing::debug;

use crate::carrier::CarrierClassifier;
use crate::error::PanelError;
use crate::records::{ProductKey, ProductMarketRecord};
use crate::reference::ReferenceData;
use crate::schema::{carrier_names, city_market, enriched, extract, panel};

/// Declarative aggregation specification, executed as a polars expression
/// inside a group-by.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub(crate) kind: AggKind,
}

#[derive(Debug, Clone)]
pub enum AggKind {
    Sum {
        column: String,
        alias: String,
    },
    Avg {
        column: String,
        alias: String,
    },
    WeightedAvg {
        column: String,
        weight: String,
        alias: String,
    },
    First {
        column: String,
        alias: String,
    },
}

impl Aggregation {
    pub fn sum(column: &str, alias: &str) -> Self {
        Self {
            kind: AggKind::Sum {
                column: column.to_string(),
                alias: alias.to_string(),
            },
        }
    }

    pub fn avg(column: &str, alias: &str) -> Self {
        Self {
            kind: AggKind::Avg {
                column: column.to_string(),
                alias: alias.to_string(),
            },
        }
    }

    pub fn weighted_avg(column: &str, weight: &str, alias: &str) -> Self {
        Self {
            kind: AggKind::WeightedAvg {
                column: column.to_string(),
                weight: weight.to_string(),
                alias: alias.to_string(),
            },
        }
    }

    pub fn first(column: &str, alias: &str) -> Self {
        Self {
            kind: AggKind::First {
                column: column.to_string(),
                alias: alias.to_string(),
            },
        }
    }

    pub fn to_expr(&self) -> Expr {
        match &self.kind {
            AggKind::Sum { column, alias } => col(column.as_str()).sum().alias(alias.as_str()),
            AggKind::Avg { column, alias } => col(column.as_str()).mean().alias(alias.as_str()),
            // sum(v * w) / sum(w), over rows where v is present
            AggKind::WeightedAvg {
                column,
                weight,
                alias,
            } => {
                let w = when(col(column.as_str()).is_not_null())
                    .then(col(weight.as_str()))
                    .otherwise(lit(0.0));
                ((col(column.as_str()) * col(weight.as_str())).sum() / w.sum())
                    .alias(alias.as_str())
            }
            AggKind::First { column, alias } => col(column.as_str()).first().alias(alias.as_str()),
        }
    }
}

/// Rolls enriched ticket records up to the carrier-route-quarter grain.
pub struct MarketAggregator<'a> {
    refs: &'a ReferenceData,
    classifier: &'a CarrierClassifier,
}

impl<'a> MarketAggregator<'a> {
    pub fn new(refs: &'a ReferenceData, classifier: &'a CarrierClassifier) -> Self {
        Self { refs, classifier }
    }

    pub fn grain() -> [&'static str; 5] {
        [
            extract::ORIGIN_AIRPORT_ID,
            extract::DEST_AIRPORT_ID,
            extract::CARRIER,
            extract::YEAR,
            extract::QUARTER,
        ]
    }

    pub fn aggregations() -> Vec<Aggregation> {
        let pax = extract::PASSENGERS;
        vec![
            Aggregation::sum(pax, panel::PASSENGERS),
            Aggregation::weighted_avg(extract::MKT_FARE, pax, panel::AVERAGE_FARE),
            Aggregation::weighted_avg(enriched::REAL_FARE, pax, panel::AVERAGE_REAL_FARE),
            Aggregation::weighted_avg(extract::MKT_DISTANCE, pax, panel::AVERAGE_DISTANCE),
            Aggregation::weighted_avg(extract::NONSTOP_MILES, pax, panel::AVERAGE_NONSTOP_MILES),
            Aggregation::avg(enriched::NONSTOP, panel::SHARE_NONSTOP),
            // every member of a group carries the same airport-level value
            Aggregation::avg(enriched::ORIGIN_HUB, panel::ORIGIN_HUB),
            Aggregation::avg(enriched::DEST_HUB, panel::DEST_HUB),
            Aggregation::avg(enriched::ORIGIN_SLOT, panel::ORIGIN_SLOT),
            Aggregation::avg(enriched::DEST_SLOT, panel::DEST_SLOT),
            Aggregation::avg(enriched::DEST_VACATION, panel::DEST_VACATION),
            Aggregation::first(extract::ORIGIN_CITY_MARKET_ID, panel::ORIGIN_CITY_MARKET),
            Aggregation::first(extract::DEST_CITY_MARKET_ID, panel::DEST_CITY_MARKET),
            Aggregation::first(enriched::ORIGIN_POPULATION, panel::ORIGIN_POPULATION),
            Aggregation::first(enriched::DEST_POPULATION, panel::DEST_POPULATION),
        ]
    }

    /// Group, roll up and label one period. An empty input yields no records.
    pub fn aggregate(&self, enriched: DataFrame) -> Result<Vec<ProductMarketRecord>, PanelError> {
        if enriched.height() == 0 {
            return Ok(Vec::new());
        }

        let keys: Vec<Expr> = Self::grain().iter().map(|k| col(*k)).collect();
        let aggs: Vec<Expr> = Self::aggregations().iter().map(Aggregation::to_expr).collect();

        let names = &self.refs.city_markets.names;
        let city_for = |key: &str, alias: &str| {
            names.clone().lazy().select([
                col(city_market::CODE).alias(key),
                col(city_market::DESCRIPTION).alias(alias),
            ])
        };
        let left = JoinArgs::new(JoinType::Left);

        let grouped = enriched
            .lazy()
            .with_columns([
                col(enriched::ORIGIN_POPULATION).cast(DataType::Float64),
                col(enriched::DEST_POPULATION).cast(DataType::Float64),
            ])
            .group_by_stable(keys)
            .agg(aggs)
            .join(
                city_for(panel::ORIGIN_CITY_MARKET, panel::ORIGIN_CITY),
                [col(panel::ORIGIN_CITY_MARKET)],
                [col(panel::ORIGIN_CITY_MARKET)],
                left.clone(),
            )
            .join(
                city_for(panel::DEST_CITY_MARKET, panel::DEST_CITY),
                [col(panel::DEST_CITY_MARKET)],
                [col(panel::DEST_CITY_MARKET)],
                left.clone(),
            )
            .join(
                self.refs.carrier_names.clone().lazy().select([
                    col(carrier_names::CODE).alias(extract::CARRIER),
                    col(carrier_names::NAME).alias(panel::CARRIER_NAME),
                ]),
                [col(extract::CARRIER)],
                [col(extract::CARRIER)],
                left,
            )
            .collect()?;

        let records = self.to_records(&grouped)?;
        debug!(products = records.len(), "aggregated period");
        Ok(records)
    }

    fn to_records(&self, df: &DataFrame) -> Result<Vec<ProductMarketRecord>, PanelError> {
        let int = |name: &str| -> Result<Int64Chunked, PanelError> {
            Ok(df.column(name)?.as_materialized_series().i64()?.clone())
        };
        let float = |name: &str| -> Result<Float64Chunked, PanelError> {
            Ok(df.column(name)?.as_materialized_series().f64()?.clone())
        };
        let text = |name: &str| -> Result<StringChunked, PanelError> {
            Ok(df.column(name)?.as_materialized_series().str()?.clone())
        };

        let origin = int(extract::ORIGIN_AIRPORT_ID)?;
        let destination = int(extract::DEST_AIRPORT_ID)?;
        let carrier = text(extract::CARRIER)?;
        let year = int(extract::YEAR)?;
        let quarter = int(extract::QUARTER)?;
        let origin_market = int(panel::ORIGIN_CITY_MARKET)?;
        let dest_market = int(panel::DEST_CITY_MARKET)?;
        let origin_city = text(panel::ORIGIN_CITY)?;
        let dest_city = text(panel::DEST_CITY)?;
        let carrier_name = text(panel::CARRIER_NAME)?;

        let passengers = float(panel::PASSENGERS)?;
        let fare = float(panel::AVERAGE_FARE)?;
        let real_fare = float(panel::AVERAGE_REAL_FARE)?;
        let distance = float(panel::AVERAGE_DISTANCE)?;
        let nonstop_miles = float(panel::AVERAGE_NONSTOP_MILES)?;
        let share_nonstop = float(panel::SHARE_NONSTOP)?;
        let origin_hub = float(panel::ORIGIN_HUB)?;
        let dest_hub = float(panel::DEST_HUB)?;
        let origin_slot = float(panel::ORIGIN_SLOT)?;
        let dest_slot = float(panel::DEST_SLOT)?;
        let dest_vacation = float(panel::DEST_VACATION)?;
        let origin_pop = float(panel::ORIGIN_POPULATION)?;
        let dest_pop = float(panel::DEST_POPULATION)?;

        let null = |what: &str, i: usize| {
            PanelError::InvalidData(format!("null {what} in aggregated row {i}"))
        };

        let mut records = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let key = ProductKey {
                year: year.get(i).ok_or_else(|| null("year", i))?,
                quarter: quarter.get(i).ok_or_else(|| null("quarter", i))?,
                origin: origin.get(i).ok_or_else(|| null("origin", i))?,
                destination: destination.get(i).ok_or_else(|| null("destination", i))?,
                carrier: carrier
                    .get(i)
                    .ok_or_else(|| null("carrier", i))?
                    .to_string(),
            };
            let flags = self.classifier.classify(key.year, &key.carrier);

            let average_distance = distance.get(i).unwrap_or(f64::NAN);
            let average_nonstop_miles = nonstop_miles.get(i).unwrap_or(f64::NAN);
            let origin_population = origin_pop.get(i);
            let dest_population = dest_pop.get(i);
            let market_size = match (origin_population, dest_population) {
                (Some(o), Some(d)) => Some((o * d).sqrt()),
                _ => None,
            };

            records.push(ProductMarketRecord {
                key,
                origin_city_market: origin_market.get(i).ok_or_else(|| null("origin market", i))?,
                dest_city_market: dest_market.get(i).ok_or_else(|| null("dest market", i))?,
                origin_city: origin_city.get(i).map(str::to_string),
                dest_city: dest_city.get(i).map(str::to_string),
                carrier_name: carrier_name.get(i).map(str::to_string),
                passengers: passengers.get(i).unwrap_or(0.0),
                average_fare: fare.get(i).unwrap_or(f64::NAN),
                average_real_fare: real_fare.get(i).unwrap_or(f64::NAN),
                average_distance,
                average_nonstop_miles,
                average_extra_miles: average_distance - average_nonstop_miles,
                share_nonstop: share_nonstop.get(i).unwrap_or(0.0),
                origin_hub: origin_hub.get(i).unwrap_or(0.0),
                dest_hub: dest_hub.get(i).unwrap_or(0.0),
                origin_slot: origin_slot.get(i).unwrap_or(0.0),
                dest_slot: dest_slot.get(i).unwrap_or(0.0),
                dest_vacation: dest_vacation.get(i).unwrap_or(0.0),
                origin_population,
                dest_population,
                market_size,
                flags,
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilterConfig, MarketSizeConfig};
    use crate::filter::tests::{reference_fixture, ticket};
    use crate::filter::RecordFilterAndJoinStage;
    use crate::records::TicketRecord;

    fn aggregate(tickets: &[TicketRecord]) -> Vec<ProductMarketRecord> {
        let refs = reference_fixture();
        let filters = FilterConfig::default();
        let market_size = MarketSizeConfig {
            target_daily_passengers: 0.0,
            sampling_rate: 1.0,
        };
        let stage = RecordFilterAndJoinStage::new(&refs, &filters, &market_size);
        let (enriched, _) = stage
            .run(TicketRecord::to_frame(tickets).unwrap(), 1.0)
            .unwrap();
        let classifier = CarrierClassifier::default();
        let mut records = MarketAggregator::new(&refs, &classifier)
            .aggregate(enriched)
            .unwrap();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    #[test]
    fn test_weighted_average_fare() {
        let mut connecting = ticket(10001, 10002, "DL", 30.0, 200.0);
        connecting.coupons = 2;
        connecting.distance = 800.0;
        let records = aggregate(&[ticket(10001, 10002, "DL", 10.0, 100.0), connecting]);

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.passengers, 40.0);
        assert!((r.average_fare - 175.0).abs() < 1e-9);
        assert!((r.average_distance - 750.0).abs() < 1e-9);
        assert!((r.average_extra_miles - 250.0).abs() < 1e-9);
        // unweighted: one of two records is nonstop
        assert!((r.share_nonstop - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_average_skips_null_values() {
        let df = DataFrame::new(vec![
            Column::new("k".into(), vec![1i64, 1]),
            Column::new("distance".into(), vec![None, Some(800.0)]),
            Column::new("pax".into(), vec![10.0, 30.0]),
        ])
        .unwrap();
        let out = df
            .lazy()
            .group_by([col("k")])
            .agg([Aggregation::weighted_avg("distance", "pax", "avg").to_expr()])
            .collect()
            .unwrap();

        let avg = out.column("avg").unwrap().as_materialized_series().f64().unwrap().get(0);
        assert_eq!(avg, Some(800.0));
    }

    #[test]
    fn test_joined_attributes_and_labels() {
        let records = aggregate(&[
            ticket(10001, 10002, "DL", 5.0, 100.0),
            ticket(10001, 10002, "AA", 5.0, 100.0),
            ticket(10003, 10004, "DL", 5.0, 100.0),
        ]);
        assert_eq!(records.len(), 3);

        let dl = records
            .iter()
            .find(|r| r.key.carrier == "DL" && r.key.origin == 10001)
            .unwrap();
        assert_eq!(dl.origin_hub, 1.0);
        assert_eq!(dl.origin_slot, 1.0);
        assert_eq!(dl.dest_vacation, 1.0);
        assert_eq!(dl.origin_city.as_deref(), Some("Alpha"));
        assert_eq!(dl.dest_city.as_deref(), Some("Beta"));
        assert_eq!(dl.carrier_name.as_deref(), Some("Delta Air Lines Inc."));
        assert!((dl.market_size.unwrap() - 2.0e6).abs() < 1e-6);
        assert!(dl.flags.major && dl.flags.legacy);

        let aa = records.iter().find(|r| r.key.carrier == "AA").unwrap();
        assert_eq!(aa.origin_hub, 0.0);
        assert_eq!(aa.carrier_name, None);

        let no_pop = records.iter().find(|r| r.key.origin == 10003).unwrap();
        assert_eq!(no_pop.market_size, None);
        assert_eq!(no_pop.dest_city, None);
    }

    #[test]
    fn test_empty_period_yields_nothing() {
        let records = aggregate(&[]);
        assert!(records.is_empty());
    }
}
