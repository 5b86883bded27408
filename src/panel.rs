//! Output panel layout.
use polars::prelude::*;

use crate::error::PanelError;
use crate::records::PanelRow;
use crate::schema::panel;

/// Sort rows into the canonical output order: period, then market, then carrier.
pub fn sort_rows(rows: &mut [PanelRow]) {
    rows.sort_by(|a, b| a.product.key.cmp(&b.product.key));
}

/// One frame row per panel row, in the order given.
pub fn to_frame(rows: &[PanelRow]) -> Result<DataFrame, PanelError> {
    let ints = |f: &dyn Fn(&PanelRow) -> i64| rows.iter().map(f).collect::<Vec<i64>>();
    let floats = |f: &dyn Fn(&PanelRow) -> f64| rows.iter().map(f).collect::<Vec<f64>>();
    let maybe = |f: &dyn Fn(&PanelRow) -> Option<f64>| rows.iter().map(f).collect::<Vec<_>>();
    let flags = |f: &dyn Fn(&PanelRow) -> bool| rows.iter().map(f).collect::<Vec<bool>>();
    let text = |f: &dyn Fn(&PanelRow) -> String| rows.iter().map(f).collect::<Vec<String>>();
    let labels =
        |f: &dyn Fn(&PanelRow) -> Option<String>| rows.iter().map(f).collect::<Vec<_>>();

    let df = DataFrame::new(vec![
        // ── Identifiers ─────────────────────────────────────────────────────
        Column::new(panel::ORIGIN.into(), ints(&|r| r.product.key.origin)),
        Column::new(panel::DESTINATION.into(), ints(&|r| r.product.key.destination)),
        Column::new(panel::CARRIER.into(), text(&|r| r.product.key.carrier.clone())),
        Column::new(panel::CARRIER_NAME.into(), labels(&|r| r.product.carrier_name.clone())),
        Column::new(panel::YEAR.into(), ints(&|r| r.product.key.year)),
        Column::new(panel::QUARTER.into(), ints(&|r| r.product.key.quarter)),
        Column::new(panel::MARKET_CODE.into(), text(&|r| r.product.key.market_code())),
        Column::new(panel::TIME_CODE.into(), ints(&|r| r.product.key.time_code())),
        Column::new(panel::ORIGIN_CITY_MARKET.into(), ints(&|r| r.product.origin_city_market)),
        Column::new(panel::DEST_CITY_MARKET.into(), ints(&|r| r.product.dest_city_market)),
        Column::new(panel::ORIGIN_CITY.into(), labels(&|r| r.product.origin_city.clone())),
        Column::new(panel::DEST_CITY.into(), labels(&|r| r.product.dest_city.clone())),
        // ── Traffic and fares ───────────────────────────────────────────────
        Column::new(panel::PASSENGERS.into(), floats(&|r| r.product.passengers)),
        Column::new(panel::AVERAGE_FARE.into(), floats(&|r| r.product.average_fare)),
        Column::new(panel::AVERAGE_REAL_FARE.into(), floats(&|r| r.product.average_real_fare)),
        Column::new(panel::AVERAGE_DISTANCE.into(), floats(&|r| r.product.average_distance)),
        Column::new(
            panel::AVERAGE_NONSTOP_MILES.into(),
            floats(&|r| r.product.average_nonstop_miles),
        ),
        Column::new(panel::AVERAGE_EXTRA_MILES.into(), floats(&|r| r.product.average_extra_miles)),
        Column::new(panel::SHARE_NONSTOP.into(), floats(&|r| r.product.share_nonstop)),
        // ── Airport and city attributes ─────────────────────────────────────
        Column::new(panel::ORIGIN_HUB.into(), floats(&|r| r.product.origin_hub)),
        Column::new(panel::DEST_HUB.into(), floats(&|r| r.product.dest_hub)),
        Column::new(panel::ORIGIN_SLOT.into(), floats(&|r| r.product.origin_slot)),
        Column::new(panel::DEST_SLOT.into(), floats(&|r| r.product.dest_slot)),
        Column::new(panel::DEST_VACATION.into(), floats(&|r| r.product.dest_vacation)),
        Column::new(panel::ORIGIN_POPULATION.into(), maybe(&|r| r.product.origin_population)),
        Column::new(panel::DEST_POPULATION.into(), maybe(&|r| r.product.dest_population)),
        Column::new(panel::MARKET_SIZE.into(), maybe(&|r| r.product.market_size)),
        // ── Carrier classification ──────────────────────────────────────────
        Column::new(panel::MAJOR.into(), flags(&|r| r.product.flags.major)),
        Column::new(panel::FRINGE.into(), flags(&|r| r.product.flags.fringe)),
        Column::new(panel::LEGACY.into(), flags(&|r| r.product.flags.legacy)),
        Column::new(panel::LCC.into(), flags(&|r| r.product.flags.lcc)),
        Column::new(
            panel::CARRIER_TYPE.into(),
            text(&|r| r.product.flags.carrier_type().as_str().to_string()),
        ),
        // ── Competition ─────────────────────────────────────────────────────
        Column::new(panel::PRESENCE.into(), floats(&|r| r.competition.presence)),
        Column::new(
            panel::NUM_DESTINATIONS.into(),
            ints(&|r| r.competition.num_destinations as i64),
        ),
        Column::new(panel::NUM_MARKETS.into(), ints(&|r| r.competition.num_markets as i64)),
        Column::new(
            panel::CARRIERS_IN_MARKET.into(),
            ints(&|r| r.competition.carriers_in_market as i64),
        ),
        Column::new(panel::RIVAL_CARRIERS.into(), ints(&|r| r.competition.rival_carriers as i64)),
        Column::new(
            panel::FRINGE_CARRIERS.into(),
            ints(&|r| r.competition.fringe_carriers as i64),
        ),
        Column::new(
            panel::AVERAGE_DISTANCE_RIVAL.into(),
            floats(&|r| r.competition.average_distance_rival),
        ),
        Column::new(
            panel::AVERAGE_PRESENCE_RIVAL.into(),
            floats(&|r| r.competition.average_presence_rival),
        ),
        Column::new(
            panel::AVERAGE_DESTINATIONS_RIVAL.into(),
            floats(&|r| r.competition.average_destinations_rival),
        ),
        Column::new(
            panel::AVERAGE_MARKETS_RIVAL.into(),
            floats(&|r| r.competition.average_markets_rival),
        ),
        // ── Nests and shares ────────────────────────────────────────────────
        Column::new(panel::NEST_LOWER.into(), text(&|r| r.shares.nest_lower.clone())),
        Column::new(panel::NEST_UPPER.into(), text(&|r| r.shares.nest_upper.clone())),
        Column::new(panel::SHARE.into(), floats(&|r| r.shares.s_jt)),
        Column::new(panel::SHARE_INSIDE.into(), floats(&|r| r.shares.s_inside)),
        Column::new(panel::SHARE_OUTSIDE.into(), floats(&|r| r.shares.s_0t)),
        Column::new(panel::SHARE_LOWER_NEST.into(), floats(&|r| r.shares.s_h)),
        Column::new(panel::SHARE_UPPER_NEST.into(), floats(&|r| r.shares.s_g)),
        Column::new(panel::SHARE_J_GIVEN_H.into(), floats(&|r| r.shares.s_j_given_h)),
        Column::new(panel::SHARE_H_GIVEN_G.into(), floats(&|r| r.shares.s_h_given_g)),
        Column::new(panel::LN_S_MINUS_LN_0.into(), floats(&|r| r.shares.ln_s_minus_ln_0)),
        Column::new(panel::LN_S_J_GIVEN_H.into(), floats(&|r| r.shares.ln_s_j_given_h)),
        Column::new(panel::LN_S_H_GIVEN_G.into(), floats(&|r| r.shares.ln_s_h_given_g)),
        Column::new(
            panel::OUTSIDE_SHARE_FLOORED.into(),
            flags(&|r| r.shares.outside_floored),
        ),
    ])?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::competition::tests::product;
    use crate::competition::CompetitionInstrumentEngine;
    use crate::config::NestingConfig;
    use crate::nesting::NestedShareHierarchyBuilder;

    fn rows() -> Vec<PanelRow> {
        let competing = CompetitionInstrumentEngine
            .compute(vec![
                product(5, 6, "WN", 300.0, 700.0),
                product(1, 2, "DL", 100.0, 500.0),
                product(5, 6, "AA", 200.0, 650.0),
                product(1, 2, "AA", 300.0, 700.0),
            ])
            .products;
        NestedShareHierarchyBuilder::new(NestingConfig::default())
            .build(competing)
            .rows
    }

    #[test]
    fn test_frame_has_one_row_per_product() {
        let mut rows = rows();
        rows.reverse();
        sort_rows(&mut rows);
        let df = to_frame(&rows).unwrap();

        assert_eq!(df.height(), 4);
        let codes: Vec<Option<String>> = df
            .column(panel::MARKET_CODE)
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .into_iter()
            .map(|s| s.map(str::to_string))
            .collect();
        assert_eq!(
            codes,
            ["1-2", "1-2", "5-6", "5-6"].map(|s| Some(s.to_string())).to_vec()
        );
        let carrier = df
            .column(panel::CARRIER)
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .get(0)
            .map(str::to_string);
        assert_eq!(carrier.as_deref(), Some("AA"));
        assert_eq!(
            df.column(panel::CARRIER_NAME).unwrap().null_count(),
            4,
            "no crosswalk in the fixture"
        );
    }

    #[test]
    fn test_empty_panel_keeps_schema() {
        let df = to_frame(&[]).unwrap();
        assert_eq!(df.height(), 0);
        assert!(df.column(panel::LN_S_MINUS_LN_0).is_ok());
        assert!(df.column(panel::TIME_CODE).is_ok());
    }
}
