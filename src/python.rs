use std::path::PathBuf;

use polars::prelude::*;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3_polars::PyDataFrame;

use crate::carrier::CarrierClassifier;
use crate::config::PanelConfig;
use crate::elasticity::{Coefficients, ElasticityCalculator};
use crate::frame::write_frame;
use crate::logging::init_tracing;
use crate::pipeline;
use crate::report::PanelReport;

#[pyclass]
pub struct PanelBuilder {
    config: PanelConfig,
    panel: Option<DataFrame>,
    report: Option<PanelReport>,
}

#[pymethods]
impl PanelBuilder {
    /// Build from a TOML config file, or from defaults when no path is given.
    #[new]
    #[pyo3(signature = (config_path=None))]
    fn new(config_path: Option<&str>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => PanelConfig::from_path(path)?,
            None => PanelConfig::default(),
        };
        Ok(Self {
            config,
            panel: None,
            report: None,
        })
    }

    /// Restrict the run to `start_year..=end_year`.
    #[pyo3(signature = (start_year, end_year, quarters=None))]
    fn set_periods(
        &mut self,
        start_year: i64,
        end_year: i64,
        quarters: Option<Vec<i64>>,
    ) -> PyResult<()> {
        let mut config = self.config.clone();
        config.periods.start_year = start_year;
        config.periods.end_year = end_year;
        if let Some(quarters) = quarters {
            config.periods.quarters = quarters;
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    // ── Running ─────────────────────────────────────────────────────────────

    /// Build the panel. Returns `(panel, report)`.
    fn run(&mut self, py: Python<'_>) -> PyResult<(PyDataFrame, PyDataFrame)> {
        let config = self.config.clone();
        let (panel, report) = py.allow_threads(|| pipeline::run(&config))?;
        let report_df = report.to_frame()?;
        self.panel = Some(panel.clone());
        self.report = Some(report);
        Ok((PyDataFrame(panel), PyDataFrame(report_df)))
    }

    /// Write the last panel built by `run`, to `path` or the configured output.
    #[pyo3(signature = (path=None))]
    fn write(&mut self, path: Option<&str>) -> PyResult<()> {
        let output = path
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config.paths.output.clone());
        let panel = self
            .panel
            .as_mut()
            .ok_or_else(|| PyValueError::new_err("No panel built yet. Call run() first."))?;
        write_frame(panel, &output)?;
        Ok(())
    }

    #[getter]
    fn run_id(&self) -> Option<String> {
        self.report.as_ref().map(|r| r.run_id.to_string())
    }
}

/// Own-price elasticities for a panel frame under the three demand models.
#[pyfunction]
#[pyo3(signature = (panel, alpha, sigma=0.0, sigma1=0.0, sigma2=0.0))]
fn compute_elasticities(
    panel: PyDataFrame,
    alpha: f64,
    sigma: f64,
    sigma1: f64,
    sigma2: f64,
) -> PyResult<PyDataFrame> {
    let calc = ElasticityCalculator::new(Coefficients {
        alpha,
        sigma,
        sigma1,
        sigma2,
    })?;
    Ok(PyDataFrame(calc.compute_frame(&panel.0)?))
}

/// `(major, fringe, legacy, lcc, carrier_type)` of a carrier code in a year.
#[pyfunction]
fn classify_carrier(year: i64, carrier: &str) -> (bool, bool, bool, bool, &'static str) {
    let flags = CarrierClassifier::default().classify(year, &carrier.trim().to_uppercase());
    (
        flags.major,
        flags.fringe,
        flags.legacy,
        flags.lcc,
        flags.carrier_type().as_str(),
    )
}

#[pyfunction]
fn init_logging() {
    init_tracing();
}

pub(crate) fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PanelBuilder>()?;
    m.add_function(wrap_pyfunction!(compute_elasticities, m)?)?;
    m.add_function(wrap_pyfunction!(classify_carrier, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    Ok(())
}
