//! Run configuration, read from a TOML file.
//!
//! Every field has a default, so an empty file describes the standard
//! 2005-2019 DB1B run with a 10% ticket sample.
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::PanelError;
use crate::nesting::NestKey;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PanelConfig {
    pub paths: PathsConfig,
    pub periods: PeriodsConfig,
    pub filters: FilterConfig,
    pub market_size: MarketSizeConfig,
    pub nesting: NestingConfig,
    pub reference: ReferenceFiles,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Directory holding the reference tables.
    pub reference_dir: PathBuf,
    /// Directory holding one raw extract per period.
    pub extract_dir: PathBuf,
    /// Extract file name with `{year}` and `{quarter}` placeholders.
    pub extract_pattern: String,
    /// Panel destination; `.parquet` selects Parquet, anything else CSV.
    pub output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            reference_dir: PathBuf::from("data/reference"),
            extract_dir: PathBuf::from("data/db1b_market"),
            extract_pattern: "db1b_market_{year}q{quarter}.csv".to_string(),
            output: PathBuf::from("data/panel.csv"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PeriodsConfig {
    pub start_year: i64,
    pub end_year: i64,
    pub quarters: Vec<i64>,
}

impl Default for PeriodsConfig {
    fn default() -> Self {
        Self {
            start_year: 2005,
            end_year: 2019,
            quarters: vec![1, 2, 3, 4],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Lower bound of the real-fare band, base-year currency.
    pub min_real_fare: f64,
    /// Upper bound of the real-fare band, base-year currency.
    pub max_real_fare: f64,
    /// Year whose CPI is normalized to 1.0.
    pub cpi_base_year: i64,
    /// States (and territories) whose airports are outside the CONUS set.
    pub excluded_states: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_real_fare: 25.0,
            max_real_fare: 2500.0,
            cpi_base_year: 2008,
            excluded_states: ["PR", "VI", "TT", "HI", "AK"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MarketSizeConfig {
    /// Minimum average passengers per day on a city-market pair.
    pub target_daily_passengers: f64,
    /// Fraction of tickets present in the raw extract.
    pub sampling_rate: f64,
}

impl Default for MarketSizeConfig {
    fn default() -> Self {
        Self {
            target_daily_passengers: 20.0,
            sampling_rate: 0.10,
        }
    }
}

impl MarketSizeConfig {
    /// Sampled passengers a city-market pair must carry within one quarter.
    pub fn quarterly_threshold(&self) -> f64 {
        self.target_daily_passengers * 365.0 / 4.0 * self.sampling_rate
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NestingConfig {
    pub lower: NestKey,
    pub upper: Option<NestKey>,
    /// Multiplier applied to passengers before dividing by market size.
    pub share_scale: f64,
    /// Floor for the outside share.
    pub epsilon: f64,
}

impl Default for NestingConfig {
    fn default() -> Self {
        Self {
            lower: NestKey::CarrierType,
            upper: None,
            share_scale: 10.0,
            epsilon: 1e-7,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReferenceFiles {
    pub city_markets: String,
    pub vacations: String,
    pub populations: String,
    pub slot_controlled: String,
    pub airports: String,
    pub hubs: String,
    pub cpi: String,
    /// Optional; a missing file leaves `carrier_name` empty.
    pub carriers: String,
}

impl Default for ReferenceFiles {
    fn default() -> Self {
        Self {
            city_markets: "L_CITY_MARKET_ID.csv".to_string(),
            vacations: "vacations.csv".to_string(),
            populations: "populations.csv".to_string(),
            slot_controlled: "slot_controlled.csv".to_string(),
            airports: "T_MASTER_CORD.csv".to_string(),
            hubs: "hubs.csv".to_string(),
            cpi: "cpi_index.csv".to_string(),
            carriers: "carriers.csv".to_string(),
        }
    }
}

impl PanelConfig {
    /// Read and validate a config file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, PanelError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, PanelError> {
        let config: PanelConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PanelError> {
        let p = &self.periods;
        if p.start_year > p.end_year {
            return Err(PanelError::Config(format!(
                "start_year {} is after end_year {}",
                p.start_year, p.end_year
            )));
        }
        if let Some(q) = p.quarters.iter().find(|q| !(1..=4).contains(*q)) {
            return Err(PanelError::Config(format!("quarter {q} is not in 1..=4")));
        }

        let f = &self.filters;
        if f.min_real_fare >= f.max_real_fare {
            return Err(PanelError::Config(format!(
                "fare band [{}, {}] is empty",
                f.min_real_fare, f.max_real_fare
            )));
        }

        let rate = self.market_size.sampling_rate;
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(PanelError::Config(format!(
                "sampling_rate {rate} must lie in (0, 1]"
            )));
        }

        let n = &self.nesting;
        if n.share_scale <= 0.0 {
            return Err(PanelError::Config("share_scale must be positive".into()));
        }
        if !(n.epsilon > 0.0 && n.epsilon < 1.0) {
            return Err(PanelError::Config("epsilon must lie in (0, 1)".into()));
        }
        if n.upper == Some(n.lower) {
            return Err(PanelError::Config(
                "upper and lower nest keys must differ".into(),
            ));
        }
        Ok(())
    }

    /// All (year, quarter) periods in processing order.
    pub fn periods(&self) -> Vec<(i64, i64)> {
        let mut quarters = self.periods.quarters.clone();
        quarters.sort_unstable();
        quarters.dedup();
        (self.periods.start_year..=self.periods.end_year)
            .flat_map(|year| quarters.iter().map(move |&q| (year, q)))
            .collect()
    }

    pub fn extract_path(&self, year: i64, quarter: i64) -> PathBuf {
        let name = self
            .paths
            .extract_pattern
            .replace("{year}", &year.to_string())
            .replace("{quarter}", &quarter.to_string());
        self.paths.extract_dir.join(name)
    }

    pub fn reference_path(&self, file: &str) -> PathBuf {
        self.paths.reference_dir.join(file)
    }
}
