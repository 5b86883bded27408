//! Typed records passed between the pipeline stages.
use polars::prelude::*;

use crate::carrier::CarrierFlags;
use crate::error::PanelError;
use crate::schema::extract;

/// One raw survey observation, in the typed layout produced by
/// [`crate::filter::read_extract`].
#[derive(Debug, Clone, PartialEq)]
pub struct TicketRecord {
    pub origin_city_market: i64,
    pub dest_city_market: i64,
    pub origin_airport: i64,
    pub dest_airport: i64,
    pub carrier: String,
    pub passengers: f64,
    pub fare: f64,
    pub distance: f64,
    pub nonstop_miles: f64,
    pub coupons: i64,
    pub carrier_changed: bool,
    pub year: i64,
    pub quarter: i64,
}

impl TicketRecord {
    /// Typed ticket frame, same dtypes as a parsed extract.
    pub fn to_frame(records: &[TicketRecord]) -> Result<DataFrame, PanelError> {
        let ints = |f: fn(&TicketRecord) -> i64| records.iter().map(f).collect::<Vec<i64>>();
        let floats = |f: fn(&TicketRecord) -> f64| records.iter().map(f).collect::<Vec<f64>>();

        let df = DataFrame::new(vec![
            Column::new(extract::ORIGIN_CITY_MARKET_ID.into(), ints(|r| r.origin_city_market)),
            Column::new(extract::DEST_CITY_MARKET_ID.into(), ints(|r| r.dest_city_market)),
            Column::new(extract::ORIGIN_AIRPORT_ID.into(), ints(|r| r.origin_airport)),
            Column::new(extract::DEST_AIRPORT_ID.into(), ints(|r| r.dest_airport)),
            Column::new(extract::PASSENGERS.into(), floats(|r| r.passengers)),
            Column::new(extract::MKT_FARE.into(), floats(|r| r.fare)),
            Column::new(extract::MKT_DISTANCE.into(), floats(|r| r.distance)),
            Column::new(extract::NONSTOP_MILES.into(), floats(|r| r.nonstop_miles)),
            Column::new(extract::MKT_COUPONS.into(), ints(|r| r.coupons)),
            Column::new(
                extract::CARRIER.into(),
                records.iter().map(|r| r.carrier.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                extract::CARRIER_CHANGE.into(),
                floats(|r| if r.carrier_changed { 1.0 } else { 0.0 }),
            ),
            Column::new(extract::YEAR.into(), ints(|r| r.year)),
            Column::new(extract::QUARTER.into(), ints(|r| r.quarter)),
        ])?;
        Ok(df)
    }
}

/// Aggregation grain: one carrier on one airport pair in one quarter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductKey {
    pub year: i64,
    pub quarter: i64,
    pub origin: i64,
    pub destination: i64,
    pub carrier: String,
}

impl ProductKey {
    /// Market-period this product competes in.
    pub fn market_period(&self) -> (i64, i64, i64, i64) {
        (self.year, self.quarter, self.origin, self.destination)
    }

    pub fn market_code(&self) -> String {
        format!("{}-{}", self.origin, self.destination)
    }

    /// `year * 10 + quarter`, e.g. 20193.
    pub fn time_code(&self) -> i64 {
        self.year * 10 + self.quarter
    }
}

/// One carrier-route-quarter observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductMarketRecord {
    pub key: ProductKey,
    pub origin_city_market: i64,
    pub dest_city_market: i64,
    pub origin_city: Option<String>,
    pub dest_city: Option<String>,
    pub carrier_name: Option<String>,

    pub passengers: f64,
    pub average_fare: f64,
    pub average_real_fare: f64,
    pub average_distance: f64,
    pub average_nonstop_miles: f64,
    pub average_extra_miles: f64,
    pub share_nonstop: f64,

    pub origin_hub: f64,
    pub dest_hub: f64,
    pub origin_slot: f64,
    pub dest_slot: f64,
    pub dest_vacation: f64,

    pub origin_population: Option<f64>,
    pub dest_population: Option<f64>,
    /// Geometric mean of the two endpoint populations.
    pub market_size: Option<f64>,

    pub flags: CarrierFlags,
}

/// Network and rival instruments of one product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompetitionStats {
    pub presence: f64,
    pub num_destinations: usize,
    pub num_markets: usize,
    pub carriers_in_market: usize,
    pub rival_carriers: usize,
    pub fringe_carriers: usize,
    pub average_distance_rival: f64,
    pub average_presence_rival: f64,
    pub average_destinations_rival: f64,
    pub average_markets_rival: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompetingProduct {
    pub product: ProductMarketRecord,
    pub competition: CompetitionStats,
}

/// Position of a product in the nest hierarchy and its share decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct NestShares {
    pub nest_lower: String,
    pub nest_upper: String,
    pub s_jt: f64,
    pub s_inside: f64,
    pub s_0t: f64,
    pub s_h: f64,
    pub s_g: f64,
    pub s_j_given_h: f64,
    pub s_h_given_g: f64,
    pub ln_s_minus_ln_0: f64,
    pub ln_s_j_given_h: f64,
    pub ln_s_h_given_g: f64,
    /// The outside share was raised to the epsilon floor.
    pub outside_floored: bool,
}

/// One row of the output panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRow {
    pub product: ProductMarketRecord,
    pub competition: CompetitionStats,
    pub shares: NestShares,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElasticityResult {
    pub key: ProductKey,
    pub logit: f64,
    pub nested: f64,
    pub nested_two_level: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let key = ProductKey {
            year: 2019,
            quarter: 3,
            origin: 10397,
            destination: 13930,
            carrier: "DL".into(),
        };
        assert_eq!(key.market_code(), "10397-13930");
        assert_eq!(key.time_code(), 20193);
        assert_eq!(key.market_period(), (2019, 3, 10397, 13930));
    }
}
