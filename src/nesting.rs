use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use crate::config::NestingConfig;
use crate::records::{CompetingProduct, NestShares, PanelRow, ProductMarketRecord};

/// Attribute that assigns a product to a nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestKey {
    /// legacy / lcc / other
    CarrierType,
    Carrier,
    /// major / fringe
    MajorFringe,
    /// Majority-nonstop vs connecting service.
    Nonstop,
    /// A single nest holding every inside good.
    Inside,
}

impl NestKey {
    pub fn label(&self, product: &ProductMarketRecord) -> String {
        match self {
            NestKey::CarrierType => product.flags.carrier_type().as_str().to_string(),
            NestKey::Carrier => product.key.carrier.clone(),
            NestKey::MajorFringe => {
                if product.flags.major {
                    "major".to_string()
                } else {
                    "fringe".to_string()
                }
            }
            NestKey::Nonstop => {
                if product.share_nonstop >= 0.5 {
                    "nonstop".to_string()
                } else {
                    "connecting".to_string()
                }
            }
            NestKey::Inside => "inside".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NestOutcome {
    pub rows: Vec<PanelRow>,
    /// Products without a positive share (missing or zero market size).
    pub degenerate_products: usize,
    /// Market-periods left with one product.
    pub singleton_markets: usize,
}

type MarketPeriod = (i64, i64, i64, i64);

/// Builds the one- or two-level nest hierarchy and the log-share transforms.
pub struct NestedShareHierarchyBuilder {
    config: NestingConfig,
}

impl NestedShareHierarchyBuilder {
    pub fn new(config: NestingConfig) -> Self {
        Self { config }
    }

    pub fn build(&self, mut products: Vec<CompetingProduct>) -> NestOutcome {
        let k = self.config.share_scale;
        products.sort_by(|a, b| a.product.key.cmp(&b.product.key));

        let mut degenerate_products = 0;
        let mut positive: Vec<(CompetingProduct, f64)> = Vec::with_capacity(products.len());
        for p in products {
            let s_jt = p
                .product
                .market_size
                .filter(|m| *m > 0.0)
                .map(|m| k * p.product.passengers / m)
                .unwrap_or(f64::NAN);
            if s_jt.is_finite() && s_jt > 0.0 {
                positive.push((p, s_jt));
            } else {
                degenerate_products += 1;
            }
        }

        let mut markets: BTreeMap<MarketPeriod, Vec<usize>> = BTreeMap::new();
        for (i, (p, _)) in positive.iter().enumerate() {
            markets.entry(p.product.key.market_period()).or_default().push(i);
        }

        let mut shares: Vec<Option<NestShares>> = vec![None; positive.len()];
        let mut singleton_markets = 0;

        for members in markets.values() {
            if members.len() < 2 {
                singleton_markets += 1;
                continue;
            }

            let labels: Vec<(String, String)> = members
                .iter()
                .map(|&i| {
                    let product = &positive[i].0.product;
                    let lower = self.config.lower.label(product);
                    let upper = match self.config.upper {
                        Some(key) => key.label(product),
                        None => lower.clone(),
                    };
                    (upper, lower)
                })
                .collect();

            let mut s_inside = 0.0;
            let mut upper_totals: BTreeMap<&str, f64> = BTreeMap::new();
            let mut lower_totals: BTreeMap<(&str, &str), f64> = BTreeMap::new();
            for (&i, (upper, lower)) in members.iter().zip(&labels) {
                let s_jt = positive[i].1;
                s_inside += s_jt;
                *upper_totals.entry(upper.as_str()).or_default() += s_jt;
                *lower_totals
                    .entry((upper.as_str(), lower.as_str()))
                    .or_default() += s_jt;
            }

            let raw_outside = 1.0 - s_inside;
            let outside_floored = raw_outside < self.config.epsilon;
            let s_0t = raw_outside.max(self.config.epsilon);

            for (&i, (upper, lower)) in members.iter().zip(&labels) {
                let s_jt = positive[i].1;
                let s_g = upper_totals[upper.as_str()];
                let s_h = lower_totals[&(upper.as_str(), lower.as_str())];
                if !(s_0t > 0.0 && s_h > 0.0) {
                    continue;
                }
                let s_j_given_h = s_jt / s_h;
                let s_h_given_g = s_h / s_g;
                shares[i] = Some(NestShares {
                    nest_lower: lower.clone(),
                    nest_upper: upper.clone(),
                    s_jt,
                    s_inside,
                    s_0t,
                    s_h,
                    s_g,
                    s_j_given_h,
                    s_h_given_g,
                    ln_s_minus_ln_0: s_jt.ln() - s_0t.ln(),
                    ln_s_j_given_h: s_j_given_h.ln(),
                    ln_s_h_given_g: s_h_given_g.ln(),
                    outside_floored,
                });
            }
        }

        let rows: Vec<PanelRow> = positive
            .into_iter()
            .zip(shares)
            .filter_map(|((p, _), shares)| {
                shares.map(|shares| PanelRow {
                    product: p.product,
                    competition: p.competition,
                    shares,
                })
            })
            .collect();

        debug!(
            rows = rows.len(),
            degenerate_products, singleton_markets, "nest shares computed"
        );
        NestOutcome {
            rows,
            degenerate_products,
            singleton_markets,
        }
    }
}
