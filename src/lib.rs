pub mod aggregation;
pub mod carrier;
pub mod competition;
pub mod config;
pub mod elasticity;
pub mod error;
pub mod filter;
pub mod frame;
pub mod logging;
pub mod nesting;
pub mod panel;
pub mod pipeline;
pub mod records;
pub mod reference;
pub mod report;
pub mod schema;

#[cfg(feature = "python")]
mod python;

pub use config::PanelConfig;
pub use error::PanelError;
pub use pipeline::{run, run_and_write, PanelPipeline};
pub use records::{PanelRow, ProductMarketRecord, TicketRecord};
pub use report::PanelReport;

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::types::PyModule;

/// Export column names as Python submodules
#[cfg(feature = "python")]
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    use schema::{elasticity, panel, report};

    // Panel
    let columns = PyModule::new(m.py(), "columns")?;
    for (name, value) in [
        ("ORIGIN", panel::ORIGIN),
        ("DESTINATION", panel::DESTINATION),
        ("CARRIER", panel::CARRIER),
        ("CARRIER_NAME", panel::CARRIER_NAME),
        ("YEAR", panel::YEAR),
        ("QUARTER", panel::QUARTER),
        ("MARKET_CODE", panel::MARKET_CODE),
        ("TIME_CODE", panel::TIME_CODE),
        ("PASSENGERS", panel::PASSENGERS),
        ("AVERAGE_FARE", panel::AVERAGE_FARE),
        ("AVERAGE_REAL_FARE", panel::AVERAGE_REAL_FARE),
        ("AVERAGE_DISTANCE", panel::AVERAGE_DISTANCE),
        ("MARKET_SIZE", panel::MARKET_SIZE),
        ("PRESENCE", panel::PRESENCE),
        ("AVERAGE_DISTANCE_RIVAL", panel::AVERAGE_DISTANCE_RIVAL),
        ("AVERAGE_PRESENCE_RIVAL", panel::AVERAGE_PRESENCE_RIVAL),
        ("AVERAGE_DESTINATIONS_RIVAL", panel::AVERAGE_DESTINATIONS_RIVAL),
        ("AVERAGE_MARKETS_RIVAL", panel::AVERAGE_MARKETS_RIVAL),
        ("NEST_LOWER", panel::NEST_LOWER),
        ("NEST_UPPER", panel::NEST_UPPER),
        ("SHARE", panel::SHARE),
        ("SHARE_OUTSIDE", panel::SHARE_OUTSIDE),
        ("LN_S_MINUS_LN_0", panel::LN_S_MINUS_LN_0),
        ("LN_S_J_GIVEN_H", panel::LN_S_J_GIVEN_H),
        ("LN_S_H_GIVEN_G", panel::LN_S_H_GIVEN_G),
    ] {
        columns.add(name, value)?;
    }
    m.add_submodule(&columns)?;

    // Elasticity
    let elasticities = PyModule::new(m.py(), "elasticity")?;
    elasticities.add("LOGIT", elasticity::LOGIT)?;
    elasticities.add("NESTED", elasticity::NESTED)?;
    elasticities.add("NESTED_TWO_LEVEL", elasticity::NESTED_TWO_LEVEL)?;
    m.add_submodule(&elasticities)?;

    // Report
    let reports = PyModule::new(m.py(), "report")?;
    reports.add("RUN_ID", report::RUN_ID)?;
    reports.add("STATUS", report::STATUS)?;
    reports.add("REASON", report::REASON)?;
    reports.add("AFTER_SHARES", report::AFTER_SHARES)?;
    m.add_submodule(&reports)?;

    Ok(())
}

#[cfg(feature = "python")]
#[pymodule]
fn airfare_panel(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register(m)?;
    add_schema_exports(m)?;
    Ok(())
}
