use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::records::{CompetingProduct, CompetitionStats, ProductMarketRecord};

/// Mean of a characteristic over the other `n - 1` members of a group.
///
/// Undefined for a group of one.
pub fn leave_one_out(group_total: f64, own: f64, n: usize) -> Option<f64> {
    if n < 2 {
        return None;
    }
    Some((group_total - own) / (n - 1) as f64)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompetitionOutcome {
    pub products: Vec<CompetingProduct>,
    /// Market-periods served by a single carrier.
    pub monopoly_markets: usize,
}

/// Network presence and leave-one-out rival instruments.
///
/// Two groupings are kept side by side: the origin-carrier-period grain for
/// presence and network size, and the market-period grain for rivals.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompetitionInstrumentEngine;

type OriginCarrier = (i64, i64, i64, String);
type MarketPeriod = (i64, i64, i64, i64);

impl CompetitionInstrumentEngine {
    pub fn compute(&self, mut records: Vec<ProductMarketRecord>) -> CompetitionOutcome {
        records.sort_by(|a, b| a.key.cmp(&b.key));

        // ── origin-carrier-period and carrier-period grains ─────────────────
        let mut carrier_at_origin: HashMap<OriginCarrier, f64> = HashMap::new();
        let mut all_at_origin: HashMap<(i64, i64, i64), f64> = HashMap::new();
        let mut destinations: HashMap<OriginCarrier, HashSet<i64>> = HashMap::new();
        let mut markets: HashMap<(i64, i64, String), HashSet<(i64, i64)>> = HashMap::new();

        for r in &records {
            let k = &r.key;
            let oc = (k.year, k.quarter, k.origin, k.carrier.clone());
            *carrier_at_origin.entry(oc.clone()).or_default() += r.passengers;
            *all_at_origin.entry((k.year, k.quarter, k.origin)).or_default() += r.passengers;
            destinations.entry(oc).or_default().insert(k.destination);
            markets
                .entry((k.year, k.quarter, k.carrier.clone()))
                .or_default()
                .insert((k.origin, k.destination));
        }

        let network: Vec<(f64, usize, usize)> = records
            .iter()
            .map(|r| {
                let k = &r.key;
                let oc = (k.year, k.quarter, k.origin, k.carrier.clone());
                let own = carrier_at_origin.get(&oc).copied().unwrap_or(0.0);
                let total = all_at_origin
                    .get(&(k.year, k.quarter, k.origin))
                    .copied()
                    .unwrap_or(0.0);
                let presence = if total > 0.0 { own / total } else { 0.0 };
                let num_destinations = destinations.get(&oc).map(HashSet::len).unwrap_or(0);
                let num_markets = markets
                    .get(&(k.year, k.quarter, k.carrier.clone()))
                    .map(HashSet::len)
                    .unwrap_or(0);
                (presence, num_destinations, num_markets)
            })
            .collect();

        // ── market-period grain ─────────────────────────────────────────────
        let mut groups: BTreeMap<MarketPeriod, Vec<usize>> = BTreeMap::new();
        for (i, r) in records.iter().enumerate() {
            groups.entry(r.key.market_period()).or_default().push(i);
        }

        let mut stats: Vec<Option<CompetitionStats>> = vec![None; records.len()];
        let mut monopoly_markets = 0;

        for members in groups.values() {
            let n = members.len();
            if n < 2 {
                monopoly_markets += 1;
                continue;
            }
            let fringe_carriers = members.iter().filter(|&&i| records[i].flags.fringe).count();
            let total = |f: &dyn Fn(usize) -> f64| members.iter().map(|&i| f(i)).sum::<f64>();
            let distance_total = total(&|i| records[i].average_distance);
            let presence_total = total(&|i| network[i].0);
            let destinations_total = total(&|i| network[i].1 as f64);
            let markets_total = total(&|i| network[i].2 as f64);

            for &i in members {
                let (presence, num_destinations, num_markets) = network[i];
                let rival = |group_total: f64, own: f64| {
                    leave_one_out(group_total, own, n).unwrap_or(f64::NAN)
                };
                stats[i] = Some(CompetitionStats {
                    presence,
                    num_destinations,
                    num_markets,
                    carriers_in_market: n,
                    rival_carriers: n - 1,
                    fringe_carriers,
                    average_distance_rival: rival(distance_total, records[i].average_distance),
                    average_presence_rival: rival(presence_total, presence),
                    average_destinations_rival: rival(destinations_total, num_destinations as f64),
                    average_markets_rival: rival(markets_total, num_markets as f64),
                });
            }
        }

        let products: Vec<CompetingProduct> = records
            .into_iter()
            .zip(stats)
            .filter_map(|(product, competition)| {
                competition.map(|competition| CompetingProduct {
                    product,
                    competition,
                })
            })
            .collect();

        debug!(
            products = products.len(),
            monopoly_markets, "competition instruments computed"
        );
        CompetitionOutcome {
            products,
            monopoly_markets,
        }
    }
}
