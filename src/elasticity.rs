//! Own-price elasticities from externally estimated demand coefficients.
//!
//! All three specifications share the `alpha * fare` scale and differ only in
//! the bracketed substitution term. With every nesting parameter at zero they
//! collapse to the plain logit `1 - s_jt`.
use polars::prelude::*;

use crate::error::PanelError;
use crate::records::{ElasticityResult, PanelRow, ProductKey};
use crate::schema::{elasticity, panel};

/// Price coefficient plus the nesting parameters of the one- and two-level models.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub alpha: f64,
    /// Single-level nesting parameter.
    pub sigma: f64,
    /// Lower-nest parameter of the two-level model.
    pub sigma1: f64,
    /// Upper-nest parameter of the two-level model.
    pub sigma2: f64,
}

impl Coefficients {
    pub fn validate(&self) -> Result<(), PanelError> {
        if !self.alpha.is_finite() {
            return Err(PanelError::Config(format!(
                "alpha must be finite, got {}",
                self.alpha
            )));
        }
        for (name, value) in [
            ("sigma", self.sigma),
            ("sigma1", self.sigma1),
            ("sigma2", self.sigma2),
        ] {
            if !(value < 1.0) {
                return Err(PanelError::Config(format!(
                    "{name} must be below 1, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Shares entering the elasticity of one product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShareInputs {
    pub fare: f64,
    pub s_jt: f64,
    pub s_j_given_h: f64,
    pub s_h_given_g: f64,
}

impl ShareInputs {
    fn from_row(row: &PanelRow) -> Self {
        Self {
            fare: row.product.average_real_fare,
            s_jt: row.shares.s_jt,
            s_j_given_h: row.shares.s_j_given_h,
            s_h_given_g: row.shares.s_h_given_g,
        }
    }
}

pub fn logit(alpha: f64, x: &ShareInputs) -> f64 {
    alpha * x.fare * (1.0 - x.s_jt)
}

pub fn nested_one_level(alpha: f64, sigma: f64, x: &ShareInputs) -> f64 {
    alpha * x.fare * (1.0 - sigma * x.s_j_given_h - (1.0 - sigma) * x.s_jt) / (1.0 - sigma)
}

/// Two-level nested logit with `lambda1 = 1 - sigma1` and `lambda2 = 1 - sigma2`.
///
/// The last term is `s_{j|h} s_{h|g} - s_jt`, equal to
/// `s_{j|h} s_{h|g} (1 - s_g)` when `s_jt = s_{j|h} s_{h|g} s_g`.
pub fn nested_two_level(alpha: f64, sigma1: f64, sigma2: f64, x: &ShareInputs) -> f64 {
    let lambda1 = 1.0 - sigma1;
    let lambda2 = 1.0 - sigma2;
    let bracket = (1.0 - x.s_j_given_h) / lambda1
        + x.s_j_given_h * (1.0 - x.s_h_given_g) / lambda2
        + x.s_j_given_h * x.s_h_given_g
        - x.s_jt;
    alpha * x.fare * bracket
}

/// Applies one set of coefficients to a whole panel.
///
/// Fares are the deflated `average_real_fare`, matching the price variable
/// of the demand regressions run on the panel.
#[derive(Debug, Clone, Copy)]
pub struct ElasticityCalculator {
    coefficients: Coefficients,
}

impl ElasticityCalculator {
    pub fn new(coefficients: Coefficients) -> Result<Self, PanelError> {
        coefficients.validate()?;
        Ok(Self { coefficients })
    }

    pub fn evaluate(&self, x: &ShareInputs) -> (f64, f64, f64) {
        let c = &self.coefficients;
        (
            logit(c.alpha, x),
            nested_one_level(c.alpha, c.sigma, x),
            nested_two_level(c.alpha, c.sigma1, c.sigma2, x),
        )
    }

    pub fn compute(&self, rows: &[PanelRow]) -> Vec<ElasticityResult> {
        rows.iter()
            .map(|row| {
                let (logit, nested, nested_two_level) = self.evaluate(&ShareInputs::from_row(row));
                ElasticityResult {
                    key: row.product.key.clone(),
                    logit,
                    nested,
                    nested_two_level,
                }
            })
            .collect()
    }

    /// Elasticities for a panel frame as written by the pipeline.
    ///
    /// Rows with a null fare or share get NaN elasticities.
    pub fn compute_frame(&self, df: &DataFrame) -> Result<DataFrame, PanelError> {
        let origin = int_column(df, panel::ORIGIN)?;
        let destination = int_column(df, panel::DESTINATION)?;
        let year = int_column(df, panel::YEAR)?;
        let quarter = int_column(df, panel::QUARTER)?;
        let carrier = string_column(df, panel::CARRIER)?;
        let fare = float_column(df, panel::AVERAGE_REAL_FARE)?;
        let s_jt = float_column(df, panel::SHARE)?;
        let s_j_given_h = float_column(df, panel::SHARE_J_GIVEN_H)?;
        let s_h_given_g = float_column(df, panel::SHARE_H_GIVEN_G)?;

        let mut results = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let key = ProductKey {
                year: year[i].unwrap_or_default(),
                quarter: quarter[i].unwrap_or_default(),
                origin: origin[i].unwrap_or_default(),
                destination: destination[i].unwrap_or_default(),
                carrier: carrier[i].clone().unwrap_or_default(),
            };
            let x = ShareInputs {
                fare: fare[i].unwrap_or(f64::NAN),
                s_jt: s_jt[i].unwrap_or(f64::NAN),
                s_j_given_h: s_j_given_h[i].unwrap_or(f64::NAN),
                s_h_given_g: s_h_given_g[i].unwrap_or(f64::NAN),
            };
            let (logit, nested, nested_two_level) = self.evaluate(&x);
            results.push(ElasticityResult {
                key,
                logit,
                nested,
                nested_two_level,
            });
        }
        results_to_frame(&results)
    }
}

pub fn results_to_frame(results: &[ElasticityResult]) -> Result<DataFrame, PanelError> {
    let df = DataFrame::new(vec![
        Column::new(
            panel::ORIGIN.into(),
            results.iter().map(|r| r.key.origin).collect::<Vec<i64>>(),
        ),
        Column::new(
            panel::DESTINATION.into(),
            results.iter().map(|r| r.key.destination).collect::<Vec<i64>>(),
        ),
        Column::new(
            panel::CARRIER.into(),
            results.iter().map(|r| r.key.carrier.clone()).collect::<Vec<String>>(),
        ),
        Column::new(
            panel::YEAR.into(),
            results.iter().map(|r| r.key.year).collect::<Vec<i64>>(),
        ),
        Column::new(
            panel::QUARTER.into(),
            results.iter().map(|r| r.key.quarter).collect::<Vec<i64>>(),
        ),
        Column::new(
            elasticity::LOGIT.into(),
            results.iter().map(|r| r.logit).collect::<Vec<f64>>(),
        ),
        Column::new(
            elasticity::NESTED.into(),
            results.iter().map(|r| r.nested).collect::<Vec<f64>>(),
        ),
        Column::new(
            elasticity::NESTED_TWO_LEVEL.into(),
            results.iter().map(|r| r.nested_two_level).collect::<Vec<f64>>(),
        ),
    ])?;
    Ok(df)
}

fn panel_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, PanelError> {
    df.column(name)
        .map_err(|_| PanelError::missing_column("panel", name))
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, PanelError> {
    let cast = panel_column(df, name)?.cast(&DataType::Float64)?;
    Ok(cast.as_materialized_series().f64()?.into_iter().collect())
}

fn int_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, PanelError> {
    let cast = panel_column(df, name)?.cast(&DataType::Int64)?;
    Ok(cast.as_materialized_series().i64()?.into_iter().collect())
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, PanelError> {
    let cast = panel_column(df, name)?.cast(&DataType::String)?;
    Ok(cast
        .as_materialized_series()
        .str()?
        .into_iter()
        .map(|s| s.map(str::to_string))
        .collect())
}
