/// Column-name constants for the airfare panel.
/// Single source of truth - input matching, joins and the output panel all read these.

// ── Raw market extract columns ──────────────────────────────────────────────
pub mod extract {
    pub const ORIGIN_CITY_MARKET_ID: &str = "OriginCityMarketID";
    pub const DEST_CITY_MARKET_ID: &str = "DestCityMarketID";
    pub const ORIGIN_AIRPORT_ID: &str = "OriginAirportID";
    pub const DEST_AIRPORT_ID: &str = "DestAirportID";
    pub const PASSENGERS: &str = "Passengers";
    pub const MKT_FARE: &str = "MktFare";
    pub const MKT_DISTANCE: &str = "MktDistance";
    pub const NONSTOP_MILES: &str = "NonStopMiles";
    pub const MKT_COUPONS: &str = "MktCoupons";
    pub const CARRIER: &str = "TkCarrier";
    pub const CARRIER_CHANGE: &str = "TkCarrierChange";
    pub const YEAR: &str = "Year";
    pub const QUARTER: &str = "Quarter";

    pub const REQUIRED: [&str; 13] = [
        ORIGIN_CITY_MARKET_ID,
        DEST_CITY_MARKET_ID,
        ORIGIN_AIRPORT_ID,
        DEST_AIRPORT_ID,
        PASSENGERS,
        MKT_FARE,
        MKT_DISTANCE,
        NONSTOP_MILES,
        MKT_COUPONS,
        CARRIER,
        CARRIER_CHANGE,
        YEAR,
        QUARTER,
    ];

    pub const ID_COLUMNS: [&str; 8] = [
        ORIGIN_CITY_MARKET_ID,
        DEST_CITY_MARKET_ID,
        ORIGIN_AIRPORT_ID,
        DEST_AIRPORT_ID,
        PASSENGERS,
        MKT_COUPONS,
        YEAR,
        QUARTER,
    ];

    pub const VALUE_COLUMNS: [&str; 4] = [MKT_FARE, MKT_DISTANCE, NONSTOP_MILES, CARRIER_CHANGE];
}

// ── Columns added to ticket records by the filter/join stage ────────────────
pub mod enriched {
    pub const REAL_FARE: &str = "real_fare";
    pub const NONSTOP: &str = "nonstop";
    pub const ORIGIN_SLOT: &str = "origin_slot";
    pub const DEST_SLOT: &str = "dest_slot";
    pub const DEST_VACATION: &str = "dest_vacation";
    pub const ORIGIN_POPULATION: &str = "origin_population";
    pub const DEST_POPULATION: &str = "dest_population";
    pub const ORIGIN_HUB: &str = "origin_hub";
    pub const DEST_HUB: &str = "dest_hub";
    pub const MARKET_PASSENGERS: &str = "_market_passengers";
}

// ── Reference tables ────────────────────────────────────────────────────────
pub mod city_market {
    pub const CODE: &str = "Code";
    pub const DESCRIPTION: &str = "Description";
}

pub mod vacation {
    pub const CITY_MARKET_ID: &str = "CityMarketID";
    pub const VACATION: &str = "Vacation";
}

pub mod population {
    pub const AIRPORT_ID: &str = "AirportID";
    pub const YEAR: &str = "Year";
    pub const POPULATION: &str = "Population";
}

pub mod slot {
    pub const AIRPORT_ID: &str = "AirportID";
    pub const SLOT_CONTROLLED: &str = "SlotControlled";
}

pub mod hub {
    pub const AIRPORT_ID: &str = "AirportID";
    pub const CARRIER: &str = "Carrier";
    pub const HUB: &str = "Hub";
}

pub mod airport {
    pub const AIRPORT_ID: &str = "AIRPORT_ID";
    pub const COUNTRY: &str = "AIRPORT_COUNTRY_CODE_ISO";
    pub const STATE: &str = "AIRPORT_STATE_CODE";
}

pub mod cpi {
    pub const YEAR: &str = "year";
    pub const DATE: &str = "date";
    pub const VALUE: &str = "value";
}

pub mod carrier_names {
    pub const CODE: &str = "carrier_code";
    pub const NAME: &str = "carrier_name";
}

// ── Output panel columns ────────────────────────────────────────────────────
pub mod panel {
    pub const ORIGIN: &str = "origin";
    pub const DESTINATION: &str = "destination";
    pub const CARRIER: &str = "carrier";
    pub const CARRIER_NAME: &str = "carrier_name";
    pub const YEAR: &str = "year";
    pub const QUARTER: &str = "quarter";
    pub const MARKET_CODE: &str = "market_code";
    pub const TIME_CODE: &str = "time_code";
    pub const ORIGIN_CITY_MARKET: &str = "origin_city_market";
    pub const DEST_CITY_MARKET: &str = "dest_city_market";
    pub const ORIGIN_CITY: &str = "origin_city";
    pub const DEST_CITY: &str = "dest_city";

    pub const PASSENGERS: &str = "passengers";
    pub const AVERAGE_FARE: &str = "average_fare";
    pub const AVERAGE_REAL_FARE: &str = "average_real_fare";
    pub const AVERAGE_DISTANCE: &str = "average_distance";
    pub const AVERAGE_NONSTOP_MILES: &str = "average_nonstop_miles";
    pub const AVERAGE_EXTRA_MILES: &str = "average_extra_miles";
    pub const SHARE_NONSTOP: &str = "share_nonstop";
    pub const ORIGIN_HUB: &str = "origin_hub";
    pub const DEST_HUB: &str = "dest_hub";
    pub const ORIGIN_SLOT: &str = "origin_slot";
    pub const DEST_SLOT: &str = "dest_slot";
    pub const DEST_VACATION: &str = "dest_vacation";
    pub const ORIGIN_POPULATION: &str = "origin_population";
    pub const DEST_POPULATION: &str = "dest_population";
    pub const MARKET_SIZE: &str = "market_size";

    pub const MAJOR: &str = "major";
    pub const FRINGE: &str = "fringe";
    pub const LEGACY: &str = "legacy";
    pub const LCC: &str = "lcc";
    pub const CARRIER_TYPE: &str = "carrier_type";

    pub const PRESENCE: &str = "presence";
    pub const NUM_DESTINATIONS: &str = "num_destinations";
    pub const NUM_MARKETS: &str = "num_markets";
    pub const CARRIERS_IN_MARKET: &str = "carriers_in_market";
    pub const RIVAL_CARRIERS: &str = "rival_carriers";
    pub const FRINGE_CARRIERS: &str = "fringe_carriers";
    pub const AVERAGE_DISTANCE_RIVAL: &str = "average_distance_rival";
    pub const AVERAGE_PRESENCE_RIVAL: &str = "average_presence_rival";
    pub const AVERAGE_DESTINATIONS_RIVAL: &str = "average_destinations_rival";
    pub const AVERAGE_MARKETS_RIVAL: &str = "average_markets_rival";

    pub const NEST_LOWER: &str = "nest_lower";
    pub const NEST_UPPER: &str = "nest_upper";
    pub const SHARE: &str = "s_jt";
    pub const SHARE_INSIDE: &str = "s_inside";
    pub const SHARE_OUTSIDE: &str = "s_0t";
    pub const SHARE_LOWER_NEST: &str = "s_h";
    pub const SHARE_UPPER_NEST: &str = "s_g";
    pub const SHARE_J_GIVEN_H: &str = "s_j_given_h";
    pub const SHARE_H_GIVEN_G: &str = "s_h_given_g";
    pub const LN_S_MINUS_LN_0: &str = "ln_s_minus_ln_0";
    pub const LN_S_J_GIVEN_H: &str = "ln_s_j_given_h";
    pub const LN_S_H_GIVEN_G: &str = "ln_s_h_given_g";
    pub const OUTSIDE_SHARE_FLOORED: &str = "outside_share_floored";
}

// ── Elasticity output columns ───────────────────────────────────────────────
pub mod elasticity {
    pub const LOGIT: &str = "elasticity_logit";
    pub const NESTED: &str = "elasticity_nested";
    pub const NESTED_TWO_LEVEL: &str = "elasticity_nested2";
}

// ── Run report columns ──────────────────────────────────────────────────────
pub mod report {
    pub const RUN_ID: &str = "run_id";
    pub const YEAR: &str = "year";
    pub const QUARTER: &str = "quarter";
    pub const STATUS: &str = "status";
    pub const REASON: &str = "reason";
    pub const RAW: &str = "raw";
    pub const VALID: &str = "valid";
    pub const AFTER_CONTINUITY: &str = "after_continuity";
    pub const AFTER_FARE_BAND: &str = "after_fare_band";
    pub const AFTER_CONUS: &str = "after_conus";
    pub const AFTER_MARKET_SIZE: &str = "after_market_size";
    pub const PRODUCTS: &str = "products";
    pub const AFTER_MONOPOLY: &str = "after_monopoly";
    pub const AFTER_SHARES: &str = "after_shares";
    pub const MONOPOLY_MARKETS: &str = "monopoly_markets";
    pub const DEGENERATE_PRODUCTS: &str = "degenerate_products";
    pub const SINGLETON_MARKETS: &str = "singleton_markets";
    pub const UNMATCHED_ORIGIN_POPULATION: &str = "unmatched_origin_population";
    pub const UNMATCHED_DEST_POPULATION: &str = "unmatched_dest_population";

    pub const PROCESSED: &str = "processed";
    pub const SKIPPED: &str = "skipped";
}
