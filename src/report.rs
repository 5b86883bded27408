//! Per-run diagnostics: stage counts per period, skipped periods and
//! reference-load problems.
use std::collections::BTreeMap;

use polars::prelude::*;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PanelError;
use crate::filter::FilterCounts;
use crate::reference::LoadDiagnostics;
use crate::schema::report;

/// Why a row or group left the pipeline without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DropReason {
    MalformedReferenceRow,
    FilteredRecord,
    UnmatchedJoin,
    MonopolyMarket,
    DegenerateShareGroup,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::MalformedReferenceRow => "malformed_reference_row",
            DropReason::FilteredRecord => "filtered_record",
            DropReason::UnmatchedJoin => "unmatched_join",
            DropReason::MonopolyMarket => "monopoly_market",
            DropReason::DegenerateShareGroup => "degenerate_share_group",
        }
    }
}

/// Rows (or products) surviving each stage of one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    pub raw: usize,
    pub valid: usize,
    pub after_continuity: usize,
    pub after_fare_band: usize,
    pub after_conus: usize,
    pub after_market_size: usize,
    /// Carrier-route products after aggregation.
    pub products: usize,
    pub after_monopoly: usize,
    pub after_shares: usize,
    pub monopoly_markets: usize,
    pub degenerate_products: usize,
    pub singleton_markets: usize,
    pub unmatched_origin_population: usize,
    pub unmatched_dest_population: usize,
}

impl From<FilterCounts> for StageCounts {
    fn from(c: FilterCounts) -> Self {
        Self {
            raw: c.raw,
            valid: c.valid,
            after_continuity: c.after_continuity,
            after_fare_band: c.after_fare_band,
            after_conus: c.after_conus,
            after_market_size: c.after_market_size,
            unmatched_origin_population: c.unmatched_origin_population,
            unmatched_dest_population: c.unmatched_dest_population,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeriodStatus {
    Processed(StageCounts),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodReport {
    pub year: i64,
    pub quarter: i64,
    pub status: PeriodStatus,
}

impl PeriodReport {
    pub fn counts(&self) -> Option<&StageCounts> {
        match &self.status {
            PeriodStatus::Processed(counts) => Some(counts),
            PeriodStatus::Skipped(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelReport {
    pub run_id: Uuid,
    pub periods: Vec<PeriodReport>,
    pub diagnostics: LoadDiagnostics,
}

impl PanelReport {
    pub fn new(diagnostics: LoadDiagnostics) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            periods: Vec::new(),
            diagnostics,
        }
    }

    pub fn push(&mut self, period: PeriodReport) {
        self.periods.push(period);
        self.periods.sort_by_key(|p| (p.year, p.quarter));
    }

    pub fn skipped(&self) -> impl Iterator<Item = &PeriodReport> {
        self.periods
            .iter()
            .filter(|p| matches!(p.status, PeriodStatus::Skipped(_)))
    }

    pub fn panel_rows(&self) -> usize {
        self.periods
            .iter()
            .filter_map(PeriodReport::counts)
            .map(|c| c.after_shares)
            .sum()
    }

    /// Totals per drop reason over the whole run.
    pub fn drops(&self) -> BTreeMap<DropReason, usize> {
        let mut drops = BTreeMap::new();
        drops.insert(DropReason::MalformedReferenceRow, self.diagnostics.total());
        for c in self.periods.iter().filter_map(PeriodReport::counts) {
            *drops.entry(DropReason::FilteredRecord).or_default() +=
                c.raw.saturating_sub(c.after_market_size);
            *drops.entry(DropReason::UnmatchedJoin).or_default() +=
                c.unmatched_origin_population + c.unmatched_dest_population;
            *drops.entry(DropReason::MonopolyMarket).or_default() += c.monopoly_markets;
            *drops.entry(DropReason::DegenerateShareGroup).or_default() +=
                c.degenerate_products + c.singleton_markets;
        }
        drops
    }

    pub fn log_summary(&self) {
        for p in self.skipped() {
            if let PeriodStatus::Skipped(reason) = &p.status {
                warn!(year = p.year, quarter = p.quarter, %reason, "period skipped");
            }
        }
        let drops: Vec<String> = self
            .drops()
            .iter()
            .map(|(reason, n)| format!("{}={}", reason.as_str(), n))
            .collect();
        info!(
            run_id = %self.run_id,
            periods = self.periods.len(),
            skipped = self.skipped().count(),
            rows = self.panel_rows(),
            drops = %drops.join(" "),
            "panel run finished"
        );
    }

    /// One row per period; stage counts are null for skipped periods.
    pub fn to_frame(&self) -> Result<DataFrame, PanelError> {
        let count = |f: fn(&StageCounts) -> usize| {
            self.periods
                .iter()
                .map(|p| p.counts().map(|c| f(c) as i64))
                .collect::<Vec<Option<i64>>>()
        };
        let run_id = self.run_id.to_string();

        let df = DataFrame::new(vec![
            Column::new(
                report::RUN_ID.into(),
                self.periods.iter().map(|_| run_id.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                report::YEAR.into(),
                self.periods.iter().map(|p| p.year).collect::<Vec<i64>>(),
            ),
            Column::new(
                report::QUARTER.into(),
                self.periods.iter().map(|p| p.quarter).collect::<Vec<i64>>(),
            ),
            Column::new(
                report::STATUS.into(),
                self.periods
                    .iter()
                    .map(|p| match p.status {
                        PeriodStatus::Processed(_) => report::PROCESSED,
                        PeriodStatus::Skipped(_) => report::SKIPPED,
                    })
                    .collect::<Vec<&str>>(),
            ),
            Column::new(
                report::REASON.into(),
                self.periods
                    .iter()
                    .map(|p| match &p.status {
                        PeriodStatus::Processed(_) => None,
                        PeriodStatus::Skipped(reason) => Some(reason.clone()),
                    })
                    .collect::<Vec<Option<String>>>(),
            ),
            Column::new(report::RAW.into(), count(|c| c.raw)),
            Column::new(report::VALID.into(), count(|c| c.valid)),
            Column::new(report::AFTER_CONTINUITY.into(), count(|c| c.after_continuity)),
            Column::new(report::AFTER_FARE_BAND.into(), count(|c| c.after_fare_band)),
            Column::new(report::AFTER_CONUS.into(), count(|c| c.after_conus)),
            Column::new(report::AFTER_MARKET_SIZE.into(), count(|c| c.after_market_size)),
            Column::new(report::PRODUCTS.into(), count(|c| c.products)),
            Column::new(report::AFTER_MONOPOLY.into(), count(|c| c.after_monopoly)),
            Column::new(report::AFTER_SHARES.into(), count(|c| c.after_shares)),
            Column::new(report::MONOPOLY_MARKETS.into(), count(|c| c.monopoly_markets)),
            Column::new(report::DEGENERATE_PRODUCTS.into(), count(|c| c.degenerate_products)),
            Column::new(report::SINGLETON_MARKETS.into(), count(|c| c.singleton_markets)),
            Column::new(
                report::UNMATCHED_ORIGIN_POPULATION.into(),
                count(|c| c.unmatched_origin_population),
            ),
            Column::new(
                report::UNMATCHED_DEST_POPULATION.into(),
                count(|c| c.unmatched_dest_population),
            ),
        ])?;
        Ok(df)
    }
}
