use std::fs;
use std::path::Path;

use airfare_panel::config::PanelConfig;
use airfare_panel::elasticity::{Coefficients, ElasticityCalculator};
use airfare_panel::report::PeriodStatus;
use airfare_panel::schema::{elasticity, panel};
use airfare_panel::{run, run_and_write, PanelError};
use polars::prelude::*;
use tempfile::tempdir;

const EXTRACT_HEADER: &str = "ItinID,OriginAirportID,OriginCityMarketID,DestAirportID,DestCityMarketID,\
TkCarrier,TkCarrierChange,Passengers,MktFare,MktDistance,NonStopMiles,MktCoupons,Year,Quarter";

// ATL 10397, ORD 13930, LAX 12892, HNL 12173
fn write_reference(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("L_CITY_MARKET_ID.csv"),
        "Code,Description\n\
         30397,\"Atlanta, GA (Metropolitan Area)\"\n\
         30977,\"Chicago, IL\"\n\
         32575,\"Los Angeles, CA (Metropolitan Area)\"\n\
         32173,\"Honolulu, HI\"\n",
    )
    .unwrap();
    fs::write(dir.join("vacations.csv"), "CityMarketID,Vacation\n32173,1\n32575,0\n").unwrap();
    fs::write(
        dir.join("populations.csv"),
        "AirportID,Year,Population\n\
         10397,2010,4000000\n\
         13930,2010,9000000\n\
         12892,2010,1000000\n\
         12173,2010,900000\n\
         ,2010,5\n",
    )
    .unwrap();
    fs::write(
        dir.join("slot_controlled.csv"),
        "AirportID,SlotControlled\n13930,1\n",
    )
    .unwrap();
    fs::write(
        dir.join("T_MASTER_CORD.csv"),
        "AIRPORT_ID,AIRPORT_COUNTRY_CODE_ISO,AIRPORT_STATE_CODE,DISPLAY_AIRPORT_NAME\n\
         10397,US,GA,Hartsfield-Jackson\n\
         13930,US,IL,O'Hare\n\
         12892,US,CA,Los Angeles International\n\
         12173,US,HI,Honolulu International\n\
         16271,CA,,Toronto Pearson\n",
    )
    .unwrap();
    fs::write(dir.join("hubs.csv"), "AirportID,DL,AA\n10397,1,0\n13930,0,1\n").unwrap();
    fs::write(dir.join("cpi_index.csv"), "year,value\n2008,200\n2010,220\n").unwrap();
    fs::write(
        dir.join("carriers.csv"),
        "carrier_code,carrier_name\nDL,Delta Air Lines Inc.\nAA,American Airlines Inc.\n",
    )
    .unwrap();
}

fn write_extract(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    let rows = [
        // ATL-ORD, two carriers
        "1,10397,30397,13930,30977,DL,0.00,100,330.00,606,606,1,2010,1",
        "2,10397,30397,13930,30977,DL,0.00,80,440.00,650,606,2,2010,1",
        "3,10397,30397,13930,30977,AA,0.00,50,275.00,606,606,1,2010,1",
        "4,10397,30397,13930,30977,AA,0.00,40,220.00,606,606,1,2010,1",
        // switched carrier mid-itinerary
        "5,10397,30397,13930,30977,WN,1.00,60,300.00,606,606,2,2010,1",
        // real fare 10, below the band
        "6,10397,30397,13930,30977,AA,0.00,30,11.00,606,606,1,2010,1",
        // ATL-LAX, DL alone
        "7,10397,30397,12892,32575,DL,0.00,200,550.00,1946,1946,1,2010,1",
        // ATL-HNL, outside CONUS
        "8,10397,30397,12173,32173,DL,0.00,100,660.00,4496,4496,1,2010,1",
        "9,10397,30397,12173,32173,AA,0.00,100,660.00,4496,4496,1,2010,1",
        // ORD-LAX, too thin
        "10,13930,30977,12892,32575,AA,0.00,10,330.00,1744,1744,1,2010,1",
        "11,13930,30977,12892,32575,UA,0.00,20,330.00,1744,1744,1,2010,1",
    ];
    let mut text = format!("{EXTRACT_HEADER}\n");
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    fs::write(dir.join("db1b_market_2010q1.csv"), text).unwrap();
}

fn fixture(root: &Path, output: &str) -> PanelConfig {
    write_reference(&root.join("reference"));
    write_extract(&root.join("extracts"));
    let toml = format!(
        r#"
[paths]
reference_dir = "{reference}"
extract_dir = "{extracts}"
output = "{output}"

[periods]
start_year = 2010
end_year = 2010
quarters = [1, 2]
"#,
        reference = root.join("reference").display(),
        extracts = root.join("extracts").display(),
        output = root.join(output).display(),
    );
    let path = root.join("panel.toml");
    fs::write(&path, toml).unwrap();
    PanelConfig::from_path(&path).unwrap()
}

fn strings(df: &DataFrame, name: &str) -> Vec<String> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .str()
        .unwrap()
        .into_iter()
        .map(|s| s.unwrap_or_default().to_string())
        .collect()
}

fn floats(df: &DataFrame, name: &str) -> Vec<f64> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .f64()
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect()
}

#[test]
fn test_end_to_end_panel() {
    let dir = tempdir().unwrap();
    let config = fixture(dir.path(), "panel.csv");
    let (df, report) = run(&config).unwrap();

    assert_eq!(df.height(), 2);
    assert_eq!(strings(&df, panel::CARRIER), vec!["AA", "DL"]);
    assert_eq!(strings(&df, panel::MARKET_CODE), vec!["10397-13930"; 2]);
    assert_eq!(
        strings(&df, panel::CARRIER_NAME),
        vec!["American Airlines Inc.", "Delta Air Lines Inc."]
    );
    assert_eq!(
        strings(&df, panel::ORIGIN_CITY)[0],
        "Atlanta, GA (Metropolitan Area)"
    );

    // real fares 300 and 400 weighted 100 and 80
    let real_fare = floats(&df, panel::AVERAGE_REAL_FARE);
    assert!((real_fare[1] - (300.0 * 100.0 + 400.0 * 80.0) / 180.0).abs() < 1e-6);
    assert_eq!(floats(&df, panel::ORIGIN_HUB), vec![0.0, 1.0]);
    assert_eq!(floats(&df, panel::DEST_HUB), vec![1.0, 0.0]);
    assert_eq!(floats(&df, panel::DEST_SLOT), vec![1.0, 1.0]);
    // the monopoly ATL-LAX route still counts toward DL's presence at ATL
    let presence = floats(&df, panel::PRESENCE);
    assert!((presence[1] - 380.0 / 470.0).abs() < 1e-12);

    assert_eq!(report.periods.len(), 2);
    let q1 = report.periods[0].counts().unwrap();
    assert_eq!(q1.raw, 11);
    assert_eq!(q1.after_continuity, 10);
    assert_eq!(q1.after_fare_band, 9);
    assert_eq!(q1.after_conus, 7);
    assert_eq!(q1.after_market_size, 5);
    assert_eq!(q1.products, 3);
    assert_eq!(q1.after_monopoly, 2);
    assert_eq!(q1.after_shares, 2);
    assert_eq!(report.diagnostics.malformed_rows.get("populations"), Some(&1));
}

#[test]
fn test_missing_period_is_reported_not_fatal() {
    let dir = tempdir().unwrap();
    let config = fixture(dir.path(), "panel.csv");
    let (_, report) = run(&config).unwrap();

    let skipped: Vec<_> = report.skipped().collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!((skipped[0].year, skipped[0].quarter), (2010, 2));
    match &skipped[0].status {
        PeriodStatus::Skipped(reason) => assert!(reason.contains("2010Q2")),
        other => panic!("unexpected status {other:?}"),
    }

    let frame = report.to_frame().unwrap();
    assert_eq!(frame.height(), 2);
}

#[test]
fn test_shares_add_up_and_telescope() {
    let dir = tempdir().unwrap();
    let config = fixture(dir.path(), "panel.csv");
    let (df, _) = run(&config).unwrap();

    let s = floats(&df, panel::SHARE);
    let s_0 = floats(&df, panel::SHARE_OUTSIDE);
    assert!((s.iter().sum::<f64>() + s_0[0] - 1.0).abs() < 1e-12);
    // k * passengers / sqrt(4e6 * 9e6)
    assert!((s[1] - 10.0 * 180.0 / 6.0e6).abs() < 1e-15);

    let lhs = floats(&df, panel::LN_S_MINUS_LN_0);
    let within = floats(&df, panel::LN_S_J_GIVEN_H);
    let across = floats(&df, panel::LN_S_H_GIVEN_G);
    let s_g = floats(&df, panel::SHARE_UPPER_NEST);
    for i in 0..df.height() {
        let rhs = within[i] + across[i] + s_g[i].ln() - s_0[i].ln();
        assert!((lhs[i] - rhs).abs() < 1e-9);
    }
}

#[test]
fn test_output_is_idempotent() {
    let dir = tempdir().unwrap();
    let config = fixture(dir.path(), "out/panel.csv");

    run_and_write(&config).unwrap();
    let first = fs::read(&config.paths.output).unwrap();
    run_and_write(&config).unwrap();
    let second = fs::read(&config.paths.output).unwrap();

    assert!(!first.is_empty());
    assert_eq!(first, second);
    let header = String::from_utf8(first).unwrap();
    assert!(header.starts_with("origin,destination,carrier,"));
}

#[test]
fn test_parquet_output() {
    let dir = tempdir().unwrap();
    let config = fixture(dir.path(), "panel.parquet");
    run_and_write(&config).unwrap();

    let file = fs::File::open(&config.paths.output).unwrap();
    let df = ParquetReader::new(file).finish().unwrap();
    assert_eq!(df.height(), 2);
}

#[test]
fn test_elasticities_from_written_panel() {
    let dir = tempdir().unwrap();
    let config = fixture(dir.path(), "panel.csv");
    let (df, _) = run(&config).unwrap();

    let calc = ElasticityCalculator::new(Coefficients {
        alpha: -0.02,
        sigma: 0.0,
        sigma1: 0.0,
        sigma2: 0.0,
    })
    .unwrap();
    let out = calc.compute_frame(&df).unwrap();

    let fare = floats(&df, panel::AVERAGE_REAL_FARE);
    let s = floats(&df, panel::SHARE);
    let logit = floats(&out, elasticity::LOGIT);
    let nested = floats(&out, elasticity::NESTED);
    let nested2 = floats(&out, elasticity::NESTED_TWO_LEVEL);
    for i in 0..out.height() {
        let expected = -0.02 * fare[i] * (1.0 - s[i]);
        assert!((logit[i] - expected).abs() < 1e-9);
        assert!((nested[i] - expected).abs() < 1e-9);
        assert!((nested2[i] - expected).abs() < 1e-9);
    }
}

#[test]
fn test_missing_reference_column_is_fatal() {
    let dir = tempdir().unwrap();
    let config = fixture(dir.path(), "panel.csv");
    fs::write(
        config.paths.reference_dir.join("slot_controlled.csv"),
        "AirportID,Slot\n13930,1\n",
    )
    .unwrap();

    let err = run(&config).unwrap_err();
    assert!(matches!(err, PanelError::MissingColumn { .. }));
}
