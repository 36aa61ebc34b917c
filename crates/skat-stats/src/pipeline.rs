use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use skat_core::model::hand::Hand;
use skat_core::null::SuitPattern;
use skat_core::signature::{Signature, extract_signature};
use thiserror::Error;
use tracing::{Level, event};

use crate::aggregate::{Aggregation, aggregate, aggregate_parallel};
use crate::config::{AnalysisKind, ContractSetting, ResolvedOutputs, StatsConfig};
use crate::dataset::{DatasetError, HandRecord, Ingest, RecordReader};
use crate::decision::{decision_map, recommendation_counts};
use crate::report::{Report, ReportBody, ReportError};
use crate::trap::{detect_traps, stagnation, threshold_table};

/// Loads a feed, runs the configured analysis and writes the reports.
pub struct StatsRunner {
    config: StatsConfig,
    outputs: ResolvedOutputs,
}

/// Summary details returned after a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub records: usize,
    pub skipped: usize,
    pub rows: usize,
    pub summary_path: PathBuf,
    pub report_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("{0}")]
    Dataset(#[from] DatasetError),
    #[error("{0}")]
    Report(#[from] ReportError),
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl StatsRunner {
    /// Build a runner from a validated configuration.
    pub fn new(config: StatsConfig, outputs: ResolvedOutputs) -> Self {
        Self { config, outputs }
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Execute the analysis and write the Markdown and JSON outputs.
    pub fn run(&self) -> Result<RunSummary, RunnerError> {
        let kind = self.config.analysis.kind;
        let reader = RecordReader::new(&self.config.dataset, kind != AnalysisKind::DecisionMap);
        let ingest = reader.read_path(&self.config.dataset.path)?;
        let report = self.analyze(&ingest);

        ensure_parent(self.outputs.summary_md.parent())?;
        ensure_parent(self.outputs.report_json.parent())?;
        report.write_markdown(&self.outputs.summary_md)?;
        report.write_json(&self.outputs.report_json)?;

        event!(
            target: "skat_stats::run",
            Level::INFO,
            run_id = %self.config.run_id,
            analysis = kind.as_str(),
            records = report.records,
            skipped = report.skipped,
            rows = report.row_count(),
        );

        Ok(RunSummary {
            records: report.records,
            skipped: report.skipped,
            rows: report.row_count(),
            summary_path: self.outputs.summary_md.clone(),
            report_path: self.outputs.report_json.clone(),
        })
    }

    /// Builds the report for already ingested records. Performs no I/O.
    pub fn analyze(&self, ingest: &Ingest) -> Report {
        let records = &ingest.records;
        let report_cfg = &self.config.report;
        let kind = self.config.analysis.kind;

        let (body, rejected) = match kind {
            AnalysisKind::Trump | AnalysisKind::Null => {
                let aggregation =
                    aggregate_parallel(records, |r| Some((self.prior_signature(r), r.outcome?)));
                let thresholds = if kind == AnalysisKind::Trump {
                    threshold_table(
                        &aggregation,
                        report_cfg.target_probability,
                        report_cfg.min_count,
                    )
                } else {
                    Vec::new()
                };
                let rows = aggregation
                    .significant(report_cfg.min_count)
                    .ranked(report_cfg.sort_by);
                (ReportBody::Buckets { rows, thresholds }, aggregation.rejected())
            }
            AnalysisKind::SuitPatterns => {
                let aggregation: Aggregation<SuitPattern> = aggregate(
                    records
                        .iter()
                        .filter_map(|r| Some((r.hand, r.outcome?)))
                        .flat_map(|(hand, outcome)| {
                            SuitPattern::all(hand)
                                .into_iter()
                                .map(move |pattern| (pattern, outcome))
                        }),
                );
                let rows = aggregation
                    .significant(report_cfg.min_count)
                    .ranked(report_cfg.sort_by);
                (ReportBody::SuitPatterns { rows }, aggregation.rejected())
            }
            AnalysisKind::Traps => {
                let prior =
                    aggregate_parallel(records, |r| Some((self.prior_signature(r), r.outcome?)));
                let posterior = aggregate_parallel(records, |r| {
                    Some((self.posterior_signature(r)?, r.outcome?))
                });
                let traps = detect_traps(
                    &prior,
                    &posterior,
                    report_cfg.trap_threshold,
                    report_cfg.min_count,
                );
                (
                    ReportBody::Traps {
                        threshold: report_cfg.trap_threshold,
                        traps,
                    },
                    prior.rejected() + posterior.rejected(),
                )
            }
            AnalysisKind::DecisionMap => {
                let by_contract: BTreeMap<String, Aggregation<Signature>> = self
                    .config
                    .dataset
                    .columns
                    .contracts
                    .keys()
                    .map(|contract| {
                        let aggregation = aggregate_parallel(records, |r| {
                            let p = r.contract_outcomes.get(contract)?;
                            Some((self.prior_signature(r), *p))
                        });
                        (contract.clone(), aggregation)
                    })
                    .collect();
                let rows = decision_map(
                    &by_contract,
                    &report_cfg.values,
                    &report_cfg.priority,
                    report_cfg.min_count,
                );
                let recommendations = recommendation_counts(&rows);
                let rejected = by_contract.values().map(Aggregation::rejected).sum();
                (
                    ReportBody::DecisionMap {
                        rows,
                        recommendations,
                    },
                    rejected,
                )
            }
            AnalysisKind::Stagnation => {
                let pairs = records.iter().filter_map(|r| {
                    let (Signature::Trump(prior), Signature::Trump(posterior)) =
                        (self.prior_signature(r), self.posterior_signature(r)?)
                    else {
                        return None;
                    };
                    Some((prior, posterior, r.outcome?))
                });
                (ReportBody::Stagnation(stagnation(pairs)), 0)
            }
        };

        let mut report = Report::new(&self.config.run_id, kind, report_cfg.min_count, body);
        report.records = records.len();
        report.skipped = ingest.skipped.len();
        report.rejected_outcomes = rejected;
        report
    }

    fn signature(&self, hand: Hand, pile: Hand) -> Signature {
        extract_signature(hand, &self.config.analysis.context(pile))
    }

    fn prior_signature(&self, record: &HandRecord) -> Signature {
        let pile = if self.is_null() {
            record.discard
        } else {
            record.prior_pile()
        };
        self.signature(record.hand, pile)
    }

    fn posterior_signature(&self, record: &HandRecord) -> Option<Signature> {
        let posterior = record.posterior?;
        let pile = if self.is_null() {
            record.discard
        } else {
            record.posterior_pile()?
        };
        Some(self.signature(posterior, pile))
    }

    fn is_null(&self) -> bool {
        self.config.analysis.contract() == ContractSetting::Null
    }
}

fn ensure_parent(path: Option<&Path>) -> Result<(), RunnerError> {
    if let Some(dir) = path.filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}
