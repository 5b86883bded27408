#[cfg(feature = "python")]
use pyo3::exceptions::PyRuntimeError;
#[cfg(feature = "python")]
use pyo3::PyErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("Missing column: {column} in {table}")]
    MissingColumn { table: String, column: String },

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Missing extract for {year}Q{quarter}: {reason}")]
    MissingPeriodExtract {
        year: i64,
        quarter: i64,
        reason: String,
    },

    #[error("No CPI deflator for year {0}")]
    MissingDeflator(i64),

    #[error("Failed to write output {path}: {reason}")]
    OutputWriteFailure { path: String, reason: String },

    #[error("InvalidData: {0}")]
    InvalidData(String),
}

impl PanelError {
    pub fn missing_column(table: &str, column: &str) -> Self {
        PanelError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}

#[cfg(feature = "python")]
impl From<PanelError> for PyErr {
    fn from(err: PanelError) -> PyErr {
        PyRuntimeError::new_err(err.to_string())
    }
}
