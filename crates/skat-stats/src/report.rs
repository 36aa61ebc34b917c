use std::fmt::{Display, Write as _};
use std::fs;
use std::path::Path;

use serde::Serialize;
use skat_core::null::SuitPattern;
use skat_core::signature::Signature;
use thiserror::Error;

use crate::aggregate::BucketRow;
use crate::config::AnalysisKind;
use crate::decision::{Decision, DecisionRow};
use crate::trap::{StagnationReport, ThresholdRow, Trap};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Everything a run produces, ready for the Markdown and JSON writers.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub run_id: String,
    pub analysis: &'static str,
    pub records: usize,
    pub skipped: usize,
    pub rejected_outcomes: u64,
    pub min_count: u64,
    pub body: ReportBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportBody {
    Buckets {
        rows: Vec<BucketRow<Signature>>,
        thresholds: Vec<ThresholdRow>,
    },
    SuitPatterns {
        rows: Vec<BucketRow<SuitPattern>>,
    },
    Traps {
        threshold: f64,
        traps: Vec<Trap<Signature>>,
    },
    DecisionMap {
        rows: Vec<DecisionRow<Signature>>,
        recommendations: Vec<(String, usize)>,
    },
    Stagnation(StagnationReport),
}

impl Report {
    pub fn new(run_id: &str, kind: AnalysisKind, min_count: u64, body: ReportBody) -> Self {
        Self {
            run_id: run_id.to_string(),
            analysis: kind.as_str(),
            records: 0,
            skipped: 0,
            rejected_outcomes: 0,
            min_count,
            body,
        }
    }

    /// Rows in the main table of the report.
    pub fn row_count(&self) -> usize {
        match &self.body {
            ReportBody::Buckets { rows, .. } => rows.len(),
            ReportBody::SuitPatterns { rows } => rows.len(),
            ReportBody::Traps { traps, .. } => traps.len(),
            ReportBody::DecisionMap { rows, .. } => rows.len(),
            ReportBody::Stagnation(_) => 1,
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json).map_err(|source| ReportError::Io {
            context: "writing report json",
            source,
        })
    }

    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        fs::write(path.as_ref(), self.to_markdown()).map_err(|source| ReportError::Io {
            context: "writing summary markdown",
            source,
        })
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# {} ({})\n", self.run_id, self.analysis);
        let _ = writeln!(
            out,
            "Records: {} used, {} skipped, {} outcomes rejected. Significance floor: {}.\n",
            self.records, self.skipped, self.rejected_outcomes, self.min_count
        );

        if self.row_count() == 0 {
            out.push_str("_No data: no signature reached the significance floor._\n");
            return out;
        }

        match &self.body {
            ReportBody::Buckets { rows, thresholds } => {
                bucket_table(&mut out, "Signature", rows);
                if !thresholds.is_empty() {
                    out.push_str("\n## Safe-fulls thresholds\n\n");
                    out.push_str("| Trumps | Jacks | Min safe fulls | Mean | Count |\n");
                    out.push_str("|---|---|---|---|---|\n");
                    for row in thresholds {
                        let _ = writeln!(
                            out,
                            "| {} | {} | {} | {} | {} |",
                            row.trump_length,
                            row.jacks,
                            row.min_safe_fulls
                                .map_or_else(|| "-".to_string(), |v| v.to_string()),
                            row.mean.map_or_else(|| "-".to_string(), percent),
                            row.count
                        );
                    }
                }
            }
            ReportBody::SuitPatterns { rows } => bucket_table(&mut out, "Suit holding", rows),
            ReportBody::Traps { threshold, traps } => {
                let _ = writeln!(out, "Threshold: {}\n", percent(*threshold));
                out.push_str(
                    "| Signature | Prior | Posterior | Drop | p | Prior n | Posterior n |\n",
                );
                out.push_str("|---|---|---|---|---|---|---|\n");
                for trap in traps {
                    let _ = writeln!(
                        out,
                        "| {} | {} | {} | {} | {} | {} | {} |",
                        trap.signature,
                        percent(trap.prior_mean),
                        percent(trap.posterior_mean),
                        percent(trap.drop),
                        trap.p_value
                            .map_or_else(|| "-".to_string(), |p| format!("{p:.3}")),
                        trap.prior_count,
                        trap.posterior_count
                    );
                }
            }
            ReportBody::DecisionMap {
                rows,
                recommendations,
            } => {
                out.push_str("| Signature | Count | Probabilities | Decision | EV |\n");
                out.push_str("|---|---|---|---|---|\n");
                for row in rows {
                    let probabilities = row
                        .probabilities
                        .iter()
                        .map(|(contract, p)| format!("{contract} {}", percent(*p)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let (decision, ev) = match &row.decision {
                        Decision::Play(candidate) => {
                            (candidate.contract.clone(), candidate.expected_value)
                        }
                        Decision::NoPositiveExpectation { best } => (
                            "pass".to_string(),
                            best.as_ref().map_or(0.0, |c| c.expected_value),
                        ),
                    };
                    let _ = writeln!(
                        out,
                        "| {} | {} | {} | {} | {:+.3} |",
                        row.key, row.count, probabilities, decision, ev
                    );
                }
                out.push_str("\n## Recommendations\n\n");
                for (contract, count) in recommendations {
                    let _ = writeln!(out, "- {contract}: {count}");
                }
            }
            ReportBody::Stagnation(report) => {
                let _ = writeln!(out, "- Hands: {}", report.records);
                let _ = writeln!(
                    out,
                    "- Stagnant: {} ({})",
                    report.stagnant,
                    report.stagnant_share.map_or_else(|| "-".to_string(), percent)
                );
                let _ = writeln!(
                    out,
                    "- Mean outcome when stagnant: {}",
                    report.stagnant_mean.map_or_else(|| "-".to_string(), percent)
                );
                let _ = writeln!(
                    out,
                    "- Mean outcome when improved: {}",
                    report.improved_mean.map_or_else(|| "-".to_string(), percent)
                );
            }
        }
        out
    }
}

fn bucket_table<K: Display>(out: &mut String, label: &str, rows: &[BucketRow<K>]) {
    let _ = writeln!(out, "| {label} | Count | Win rate | 95% CI |");
    out.push_str("|---|---|---|---|\n");
    for row in rows {
        let _ = writeln!(
            out,
            "| {} | {} | {} | [{}, {}] |",
            row.key,
            row.count,
            percent(row.mean),
            percent(row.ci_low),
            percent(row.ci_high)
        );
    }
}

fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{SortKey, aggregate};
    use skat_core::signature::TrumpSignature;
    use tempfile::tempdir;

    fn trump_rows() -> Vec<BucketRow<Signature>> {
        let sig = Signature::Trump(TrumpSignature {
            trump_length: 6,
            jacks: 2,
            safe_fulls: 2,
        });
        aggregate([(sig, 1.0), (sig, 0.5)]).ranked(SortKey::Mean)
    }

    #[test]
    fn markdown_lists_buckets() {
        let report = Report::new(
            "demo",
            AnalysisKind::Trump,
            1,
            ReportBody::Buckets {
                rows: trump_rows(),
                thresholds: Vec::new(),
            },
        );
        let markdown = report.to_markdown();
        assert!(markdown.contains("# demo (trump)"));
        assert!(markdown.contains("| T6 J2 F2 | 2 | 75.0% |"));
    }

    #[test]
    fn empty_report_says_no_data() {
        let report = Report::new(
            "demo",
            AnalysisKind::Null,
            50,
            ReportBody::Buckets {
                rows: Vec::new(),
                thresholds: Vec::new(),
            },
        );
        assert!(report.to_markdown().contains("No data"));
    }

    #[test]
    fn writes_json_and_markdown() {
        let dir = tempdir().expect("temp dir");
        let report = Report::new(
            "demo",
            AnalysisKind::Trump,
            1,
            ReportBody::Buckets {
                rows: trump_rows(),
                thresholds: Vec::new(),
            },
        );
        let json_path = dir.path().join("report.json");
        report.write_json(&json_path).expect("json written");
        report
            .write_markdown(dir.path().join("summary.md"))
            .expect("markdown written");

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json_path).expect("read")).expect("json");
        assert_eq!(value["body"]["kind"], "buckets");
        assert_eq!(value["body"]["rows"][0]["key"]["trump_length"], 6);
        assert_eq!(value["body"]["rows"][0]["count"], 2);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempdir().expect("temp dir");
        let report = Report::new(
            "demo",
            AnalysisKind::Trump,
            1,
            ReportBody::Stagnation(crate::trap::stagnation(Vec::new())),
        );
        let err = report
            .write_markdown(dir.path().join("missing").join("summary.md"))
            .expect_err("parent missing");
        assert!(matches!(err, ReportError::Io { .. }));
    }

    #[test]
    fn trap_table_shows_p_value() {
        let trap = crate::trap::Trap {
            signature: trump_rows()[0].key,
            prior_mean: 0.9,
            posterior_mean: 0.3,
            prior_count: 60,
            posterior_count: 60,
            drop: 0.6,
            p_value: Some(0.0123),
        };
        let report = Report::new(
            "demo",
            AnalysisKind::Traps,
            50,
            ReportBody::Traps {
                threshold: 0.66,
                traps: vec![trap],
            },
        );
        let markdown = report.to_markdown();
        assert!(markdown.contains("| Drop | p |"));
        assert!(markdown.contains("| T6 J2 F2 | 90.0% | 30.0% | 60.0% | 0.012 | 60 | 60 |"));
    }
}
