//! Per-period orchestration and the full multi-period run.
//!
//! Each period goes through filter/join, aggregation, competition and nest
//! shares on its own. Periods run in parallel against the same read-only
//! reference data and are merged only at the end, so a failing period
//! leaves a gap instead of aborting the run.
use polars::prelude::*;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::aggregation::MarketAggregator;
use crate::carrier::CarrierClassifier;
use crate::competition::CompetitionInstrumentEngine;
use crate::config::PanelConfig;
use crate::error::PanelError;
use crate::filter::{read_extract, RecordFilterAndJoinStage};
use crate::frame::write_frame;
use crate::nesting::NestedShareHierarchyBuilder;
use crate::panel;
use crate::records::PanelRow;
use crate::reference::{ReferenceData, ReferenceDataLoader};
use crate::report::{PanelReport, PeriodReport, PeriodStatus, StageCounts};

/// Panel rows of one period with the counts that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodOutput {
    pub rows: Vec<PanelRow>,
    pub counts: StageCounts,
}

pub struct PanelPipeline<'a> {
    config: &'a PanelConfig,
    refs: &'a ReferenceData,
    classifier: CarrierClassifier,
}

impl<'a> PanelPipeline<'a> {
    pub fn new(config: &'a PanelConfig, refs: &'a ReferenceData) -> Self {
        Self {
            config,
            refs,
            classifier: CarrierClassifier::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: CarrierClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Read and process one period's extract.
    pub fn process_period(&self, year: i64, quarter: i64) -> Result<PeriodOutput, PanelError> {
        let deflator = self
            .refs
            .deflator(year)
            .ok_or(PanelError::MissingDeflator(year))?;
        let path = self.config.extract_path(year, quarter);
        let (tickets, raw_rows) = read_extract(&path, year, quarter)?;
        let mut output = self.process_tickets(tickets, deflator)?;
        output.counts.raw = raw_rows;
        Ok(output)
    }

    /// Run the in-period stages on an already typed ticket frame.
    pub fn process_tickets(
        &self,
        tickets: DataFrame,
        deflator: f64,
    ) -> Result<PeriodOutput, PanelError> {
        let (enriched, filter_counts) =
            RecordFilterAndJoinStage::new(self.refs, &self.config.filters, &self.config.market_size)
                .run(tickets, deflator)?;
        let mut counts = StageCounts::from(filter_counts);

        let products = MarketAggregator::new(self.refs, &self.classifier).aggregate(enriched)?;
        counts.products = products.len();

        let competition = CompetitionInstrumentEngine.compute(products);
        counts.after_monopoly = competition.products.len();
        counts.monopoly_markets = competition.monopoly_markets;

        let nests = NestedShareHierarchyBuilder::new(self.config.nesting.clone())
            .build(competition.products);
        counts.after_shares = nests.rows.len();
        counts.degenerate_products = nests.degenerate_products;
        counts.singleton_markets = nests.singleton_markets;

        Ok(PeriodOutput {
            rows: nests.rows,
            counts,
        })
    }

    /// Process periods in parallel. Failed periods are reported, not raised.
    pub fn run_periods(&self, periods: &[(i64, i64)]) -> (Vec<PanelRow>, Vec<PeriodReport>) {
        let outcomes: Vec<(i64, i64, Result<PeriodOutput, PanelError>)> = periods
            .par_iter()
            .map(|&(year, quarter)| (year, quarter, self.process_period(year, quarter)))
            .collect();

        let mut rows = Vec::new();
        let mut reports = Vec::with_capacity(outcomes.len());
        for (year, quarter, outcome) in outcomes {
            let status = match outcome {
                Ok(output) => {
                    let c = output.counts;
                    info!(
                        year,
                        quarter,
                        raw = c.raw,
                        after_continuity = c.after_continuity,
                        after_fare_band = c.after_fare_band,
                        after_conus = c.after_conus,
                        after_market_size = c.after_market_size,
                        products = c.products,
                        after_monopoly = c.after_monopoly,
                        rows = c.after_shares,
                        "period processed"
                    );
                    rows.extend(output.rows);
                    PeriodStatus::Processed(c)
                }
                Err(e) => {
                    warn!(year, quarter, error = %e, "skipping period");
                    PeriodStatus::Skipped(e.to_string())
                }
            };
            reports.push(PeriodReport {
                year,
                quarter,
                status,
            });
        }
        (rows, reports)
    }
}

/// Load the reference data and build the panel for every configured period.
///
/// Returns the sorted panel frame and the run report. Nothing is written.
pub fn run(config: &PanelConfig) -> Result<(DataFrame, PanelReport), PanelError> {
    config.validate()?;
    let refs = ReferenceDataLoader::new(config).load()?;
    let (mut rows, periods) = PanelPipeline::new(config, &refs).run_periods(&config.periods());

    let mut report = PanelReport::new(refs.diagnostics.clone());
    for period in periods {
        report.push(period);
    }

    panel::sort_rows(&mut rows);
    let df = panel::to_frame(&rows)?;
    report.log_summary();
    Ok((df, report))
}

/// [`run`], then write the panel to the configured output path.
pub fn run_and_write(config: &PanelConfig) -> Result<PanelReport, PanelError> {
    let (mut df, report) = run(config)?;
    let output = &config.paths.output;
    write_frame(&mut df, output)?;
    info!(path = %output.display(), rows = df.height(), "panel written");
    Ok(report)
}
