//! JSON Lines ingestion of solver records.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use skat_core::model::card::CardParseError;
use skat_core::model::deck::Deck;
use skat_core::model::hand::Hand;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DatasetConfig;

/// Placeholder win probability written by `synth`; the solver fills in the real value.
pub const SYNTH_OUTCOME: f64 = 0.5;

/// One validated record of the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct HandRecord {
    /// 1-based line number in the source file.
    pub line: usize,
    pub hand: Hand,
    pub outcome: Option<f64>,
    pub discard: Hand,
    pub pickup: Hand,
    pub posterior: Option<Hand>,
    pub contract_outcomes: BTreeMap<String, f64>,
}

impl HandRecord {
    /// Skat cards known while holding the prior hand.
    pub fn prior_pile(&self) -> Hand {
        self.pickup.union(self.discard).difference(self.hand)
    }

    /// Skat cards known while holding the posterior hand.
    pub fn posterior_pile(&self) -> Option<Hand> {
        let posterior = self.posterior?;
        Some(self.pickup.union(self.discard).difference(posterior))
    }
}

/// A malformed record. The record is skipped, never the whole feed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("missing field '{0}'")]
    MissingField(String),
    #[error("field '{0}' is not numeric")]
    NotNumeric(String),
    #[error("field '{field}' value {value} is outside [0, 1]")]
    OutOfRange { field: String, value: f64 },
    #[error("field '{0}' is neither a card string nor a list of cards")]
    NotCards(String),
    #[error("field '{field}' holds {count} cards, more than {max}", max = Hand::MAX_CARDS)]
    TooManyCards { field: String, count: usize },
    #[error("field '{0}' shares cards with the hand")]
    Overlap(String),
    #[error("field '{field}': {source}")]
    BadCard {
        field: String,
        #[source]
        source: CardParseError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub line: usize,
    pub error: RecordError,
}

/// Result of reading a feed: the usable records and what was skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ingest {
    pub records: Vec<HandRecord>,
    pub skipped: Vec<SkippedRecord>,
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to open dataset {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read dataset: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("failed to encode synthetic record: {source}")]
    Encode {
        #[from]
        source: serde_json::Error,
    },
}

/// Turns JSON objects into [`HandRecord`]s according to a column map.
pub struct RecordReader<'a> {
    config: &'a DatasetConfig,
    require_outcome: bool,
}

impl<'a> RecordReader<'a> {
    pub fn new(config: &'a DatasetConfig, require_outcome: bool) -> Self {
        Self {
            config,
            require_outcome,
        }
    }

    pub fn read_path(&self, path: impl AsRef<Path>) -> Result<Ingest, DatasetError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DatasetError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let ingest = self.read(BufReader::new(file))?;
        info!(
            target: "skat_stats::ingest",
            path = %path.display(),
            records = ingest.records.len(),
            skipped = ingest.skipped.len(),
            "dataset loaded"
        );
        Ok(ingest)
    }

    /// Reads every non-blank line. I/O failures abort; malformed lines are
    /// logged and collected in [`Ingest::skipped`].
    pub fn read<R: BufRead>(&self, reader: R) -> Result<Ingest, DatasetError> {
        let mut ingest = Ingest::default();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let number = index + 1;
            if line.trim().is_empty() {
                continue;
            }
            match self.parse_line(number, &line) {
                Ok(record) => ingest.records.push(record),
                Err(error) => {
                    warn!(
                        target: "skat_stats::ingest",
                        line = number,
                        reason = %error,
                        "skipping malformed record"
                    );
                    ingest.skipped.push(SkippedRecord {
                        line: number,
                        error,
                    });
                }
            }
        }
        Ok(ingest)
    }

    pub fn parse_line(&self, line: usize, text: &str) -> Result<HandRecord, RecordError> {
        let value: Value =
            serde_json::from_str(text).map_err(|err| RecordError::Json(err.to_string()))?;
        let Value::Object(object) = value else {
            return Err(RecordError::Json("record is not an object".to_string()));
        };
        self.parse_object(line, &object)
    }

    fn parse_object(
        &self,
        line: usize,
        object: &Map<String, Value>,
    ) -> Result<HandRecord, RecordError> {
        let columns = &self.config.columns;

        let hand = self
            .cards(object, &columns.hand)?
            .ok_or_else(|| RecordError::MissingField(columns.hand.clone()))?;
        let posterior = match columns.posterior_hand.as_deref() {
            Some(field) => Some(
                self.cards(object, field)?
                    .ok_or_else(|| RecordError::MissingField(field.to_string()))?,
            ),
            None => None,
        };
        let discard = self.optional_cards(object, columns.discard.as_deref())?;
        let pickup = self.optional_cards(object, columns.pickup.as_deref())?;

        if let Some(field) = columns.pickup.as_deref().filter(|_| !hand.is_disjoint(pickup)) {
            return Err(RecordError::Overlap(field.to_string()));
        }
        let final_hand = posterior.unwrap_or(hand);
        if let Some(field) = columns
            .discard
            .as_deref()
            .filter(|_| !final_hand.is_disjoint(discard))
        {
            return Err(RecordError::Overlap(field.to_string()));
        }

        let outcome = match probability(object, &columns.outcome)? {
            Some(value) => Some(value),
            None if self.require_outcome => {
                return Err(match object.get(&columns.outcome) {
                    None | Some(Value::Null) => RecordError::MissingField(columns.outcome.clone()),
                    Some(_) => RecordError::NotNumeric(columns.outcome.clone()),
                });
            }
            None => None,
        };

        let mut contract_outcomes = BTreeMap::new();
        for (contract, field) in &columns.contracts {
            match probability(object, field)? {
                Some(value) => {
                    contract_outcomes.insert(contract.clone(), value);
                }
                None => debug!(
                    target: "skat_stats::ingest",
                    line,
                    field = %field,
                    "contract probability missing"
                ),
            }
        }

        Ok(HandRecord {
            line,
            hand,
            outcome,
            discard,
            pickup,
            posterior,
            contract_outcomes,
        })
    }

    fn optional_cards(
        &self,
        object: &Map<String, Value>,
        field: Option<&str>,
    ) -> Result<Hand, RecordError> {
        match field {
            Some(field) => Ok(self.cards(object, field)?.unwrap_or_default()),
            None => Ok(Hand::new()),
        }
    }

    fn cards(&self, object: &Map<String, Value>, field: &str) -> Result<Option<Hand>, RecordError> {
        let text = match object.get(field) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(text)) => text.clone(),
            Some(Value::Array(items)) => {
                let mut tokens = Vec::with_capacity(items.len());
                for item in items {
                    let Value::String(token) = item else {
                        return Err(RecordError::NotCards(field.to_string()));
                    };
                    tokens.push(token.as_str());
                }
                tokens.join(" ")
            }
            Some(_) => return Err(RecordError::NotCards(field.to_string())),
        };

        let hand = if self.config.strict_cards {
            Hand::parse_strict(&text).map_err(|source| RecordError::BadCard {
                field: field.to_string(),
                source,
            })?
        } else {
            Hand::parse(&text).hand
        };

        if hand.len() > Hand::MAX_CARDS {
            return Err(RecordError::TooManyCards {
                field: field.to_string(),
                count: hand.len(),
            });
        }
        Ok(Some(hand))
    }
}

/// Reads a numeric field. Numbers and numeric strings count; anything else
/// is missing. Values outside [0, 1] are an error.
fn probability(object: &Map<String, Value>, field: &str) -> Result<Option<f64>, RecordError> {
    let Some(value) = object.get(field).and_then(numeric) else {
        return Ok(None);
    };
    if !(0.0..=1.0).contains(&value) {
        return Err(RecordError::OutOfRange {
            field: field.to_string(),
            value,
        });
    }
    Ok(Some(value))
}

fn numeric(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

#[derive(Debug, Serialize)]
struct SynthRow {
    #[serde(rename = "Hand")]
    hand: String,
    #[serde(rename = "Skat")]
    skat: String,
    #[serde(rename = "WinProb")]
    win_prob: f64,
}

/// Deals `hands` seeded random hands into a JSONL feed with `Hand`, `Skat`
/// and a placeholder `WinProb` column.
pub fn write_synthetic(path: impl AsRef<Path>, hands: usize, seed: u64) -> Result<usize, DatasetError> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for index in 0..hands {
        let deal = Deck::shuffled_with_seed(seed.wrapping_add(index as u64)).deal();
        let row = SynthRow {
            hand: deal.hand.to_string(),
            skat: deal.skat.to_string(),
            win_prob: SYNTH_OUTCOME,
        };
        serde_json::to_writer(&mut writer, &row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    info!(
        target: "skat_stats::synth",
        path = %path.display(),
        hands,
        seed,
        "synthetic feed written"
    );
    Ok(hands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnMap;
    use skat_core::model::card::Card;
    use std::io::Cursor;

    fn config(columns: ColumnMap) -> DatasetConfig {
        DatasetConfig {
            path: PathBuf::from("unused.jsonl"),
            columns,
            strict_cards: false,
        }
    }

    fn null_columns() -> ColumnMap {
        ColumnMap {
            hand: "FinalHand".to_string(),
            outcome: "ProbNull".to_string(),
            discard: Some("SkatCards".to_string()),
            ..ColumnMap::default()
        }
    }

    #[test]
    fn reads_hand_outcome_and_discard() {
        let cfg = config(null_columns());
        let reader = RecordReader::new(&cfg, true);
        let record = reader
            .parse_line(
                1,
                r#"{"FinalHand": "[C7 C8 S7]", "ProbNull": "0.75", "SkatCards": ["HA", "DA"]}"#,
            )
            .expect("valid record");
        assert_eq!(record.hand.len(), 3);
        assert_eq!(record.outcome, Some(0.75));
        assert!(record.discard.contains("HA".parse::<Card>().expect("card")));
    }

    #[test]
    fn numeric_strings_coerce_and_text_is_missing() {
        let cfg = config(null_columns());
        let reader = RecordReader::new(&cfg, true);
        let err = reader
            .parse_line(1, r#"{"FinalHand": "C7", "ProbNull": "n/a"}"#)
            .expect_err("not numeric");
        assert_eq!(err, RecordError::NotNumeric("ProbNull".to_string()));
        let err = reader
            .parse_line(1, r#"{"FinalHand": "C7"}"#)
            .expect_err("missing");
        assert_eq!(err, RecordError::MissingField("ProbNull".to_string()));
        let err = reader
            .parse_line(1, r#"{"FinalHand": "C7", "ProbNull": 1.2}"#)
            .expect_err("out of range");
        assert!(matches!(err, RecordError::OutOfRange { .. }));
    }

    #[test]
    fn rejects_overlap_and_oversized_hands() {
        let cfg = config(null_columns());
        let reader = RecordReader::new(&cfg, true);
        let err = reader
            .parse_line(1, r#"{"FinalHand": "C7 C8", "ProbNull": 0.5, "SkatCards": "C8 HA"}"#)
            .expect_err("overlap");
        assert_eq!(err, RecordError::Overlap("SkatCards".to_string()));

        let err = reader
            .parse_line(
                1,
                r#"{"FinalHand": "C7 C8 C9 CT CJ CQ CK CA S7 S8 S9", "ProbNull": 0.5}"#,
            )
            .expect_err("eleven cards");
        assert!(matches!(err, RecordError::TooManyCards { count: 11, .. }));
    }

    #[test]
    fn strict_mode_rejects_unknown_tokens() {
        let mut cfg = config(null_columns());
        let line = r#"{"FinalHand": "C7 X9 S8", "ProbNull": 0.5}"#;
        let lenient = RecordReader::new(&cfg, true).parse_line(1, line).expect("lenient");
        assert_eq!(lenient.hand.len(), 2);

        cfg.strict_cards = true;
        let err = RecordReader::new(&cfg, true)
            .parse_line(1, line)
            .expect_err("strict");
        assert!(matches!(err, RecordError::BadCard { .. }));
    }

    #[test]
    fn feed_skips_bad_lines_and_counts_them() {
        let cfg = config(null_columns());
        let feed = concat!(
            "{\"FinalHand\": \"C7\", \"ProbNull\": 1}\n",
            "\n",
            "not json\n",
            "{\"FinalHand\": 7, \"ProbNull\": 0.5}\n",
            "{\"FinalHand\": \"S7 S8\", \"ProbNull\": 0}\n",
        );
        let ingest = RecordReader::new(&cfg, true)
            .read(Cursor::new(feed))
            .expect("readable");
        assert_eq!(ingest.records.len(), 2);
        assert_eq!(ingest.records[1].line, 5);
        let lines: Vec<usize> = ingest.skipped.iter().map(|s| s.line).collect();
        assert_eq!(lines, [3, 4]);
        assert!(matches!(ingest.skipped[0].error, RecordError::Json(_)));
        assert_eq!(
            ingest.skipped[1].error,
            RecordError::NotCards("FinalHand".to_string())
        );
    }

    #[test]
    fn contract_columns_are_optional_per_record() {
        let mut columns = ColumnMap::default();
        columns.contracts.insert("pickup".to_string(), "MaxProb".to_string());
        columns.contracts.insert("suit_hand".to_string(), "ProbHand".to_string());
        let cfg = config(columns);
        let record = RecordReader::new(&cfg, false)
            .parse_line(4, r#"{"Hand": "CJ SJ", "MaxProb": 0.8, "ProbHand": null}"#)
            .expect("record");
        assert_eq!(record.outcome, None);
        assert_eq!(record.contract_outcomes.len(), 1);
        assert_eq!(record.contract_outcomes.get("pickup"), Some(&0.8));
    }

    #[test]
    fn piles_exclude_the_hand_they_describe() {
        let mut columns = ColumnMap::default();
        columns.pickup = Some("Skat".to_string());
        columns.discard = Some("Discard".to_string());
        columns.posterior_hand = Some("PostHand".to_string());
        let cfg = config(columns);
        let record = RecordReader::new(&cfg, true)
            .parse_line(
                1,
                r#"{"Hand": "CJ C7", "Skat": "SA ST", "Discard": "C7 ST", "PostHand": "CJ SA", "WinProb": 0.6}"#,
            )
            .expect("record");
        assert_eq!(record.prior_pile().to_string(), "[ST SA]");
        assert_eq!(
            record.posterior_pile().map(|pile| pile.to_string()),
            Some("[C7 ST]".to_string())
        );
    }
}
