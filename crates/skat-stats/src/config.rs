use serde::Deserialize;
use skat_core::model::rank::Rank;
use skat_core::model::suit::Suit;
use skat_core::signature::{ContractContext, TrumpGame};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

use crate::aggregate::SortKey;
use crate::decision::Payoff;

const DEFAULT_MIN_COUNT: u64 = 50;
const DEFAULT_TRAP_THRESHOLD: f64 = 0.66;
const DEFAULT_TARGET_PROBABILITY: f64 = 0.70;
const RUN_ID_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

/// Root analysis configuration loaded from YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StatsConfig {
    pub run_id: String,
    pub dataset: DatasetConfig,
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub report: ReportConfig,
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StatsConfig {
    /// Load configuration from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: StatsConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        validate_run_id(&self.run_id)?;
        self.dataset.validate()?;
        self.analysis.validate()?;
        self.report.validate()?;
        self.outputs.validate(&self.run_id)?;
        self.logging.normalize();

        if self.analysis.kind == AnalysisKind::DecisionMap {
            validate_decision_inputs(&self.dataset.columns, &self.report)?;
        }
        if self.analysis.kind.needs_posterior() && self.dataset.columns.posterior_hand.is_none() {
            return Err(ValidationError::InvalidField {
                field: "dataset.columns.posterior_hand".to_string(),
                message: format!(
                    "analysis '{}' needs a posterior hand column",
                    self.analysis.kind.as_str()
                ),
            });
        }
        Ok(())
    }

    /// Resolve output templates (e.g., `{run_id}` placeholders) into concrete paths.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        ResolvedOutputs {
            summary_md: resolve_template(&self.run_id, &self.outputs.summary_md),
            report_json: resolve_template(&self.run_id, &self.outputs.report_json),
        }
    }
}

/// Input feed block: where the JSONL records live and which fields to read.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DatasetConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub columns: ColumnMap,
    /// Reject records with unparseable card tokens instead of skipping the token.
    #[serde(default)]
    pub strict_cards: bool,
}

impl DatasetConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.path.as_os_str().is_empty() {
            return Err(ValidationError::InvalidField {
                field: "dataset.path".to_string(),
                message: "path must not be empty".to_string(),
            });
        }
        self.columns.validate()
    }
}

/// Field names inside each JSONL record.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ColumnMap {
    #[serde(default = "default_hand_column")]
    pub hand: String,
    #[serde(default = "default_outcome_column")]
    pub outcome: String,
    /// Cards the declarer put away (Null exclusions, protected tens).
    #[serde(default)]
    pub discard: Option<String>,
    /// Cards picked up from the skat before discarding.
    #[serde(default)]
    pub pickup: Option<String>,
    /// Hand after pickup and discard, for prior/posterior studies.
    #[serde(default)]
    pub posterior_hand: Option<String>,
    /// Contract name to win-probability field, for the decision map.
    #[serde(default)]
    pub contracts: BTreeMap<String, String>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            hand: default_hand_column(),
            outcome: default_outcome_column(),
            discard: None,
            pickup: None,
            posterior_hand: None,
            contracts: BTreeMap::new(),
        }
    }
}

impl ColumnMap {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut named = vec![
            ("dataset.columns.hand", Some(&self.hand)),
            ("dataset.columns.outcome", Some(&self.outcome)),
            ("dataset.columns.discard", self.discard.as_ref()),
            ("dataset.columns.pickup", self.pickup.as_ref()),
            ("dataset.columns.posterior_hand", self.posterior_hand.as_ref()),
        ];
        named.extend(
            self.contracts
                .values()
                .map(|column| ("dataset.columns.contracts", Some(column))),
        );
        for (label, value) in named {
            if value.is_some_and(|v| v.trim().is_empty()) {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "column name must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn default_hand_column() -> String {
    "Hand".to_string()
}

fn default_outcome_column() -> String {
    "WinProb".to_string()
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Trump,
    Null,
    SuitPatterns,
    Traps,
    DecisionMap,
    Stagnation,
}

impl AnalysisKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisKind::Trump => "trump",
            AnalysisKind::Null => "null",
            AnalysisKind::SuitPatterns => "suit_patterns",
            AnalysisKind::Traps => "traps",
            AnalysisKind::DecisionMap => "decision_map",
            AnalysisKind::Stagnation => "stagnation",
        }
    }

    fn needs_posterior(self) -> bool {
        matches!(self, AnalysisKind::Traps | AnalysisKind::Stagnation)
    }
}

/// Contract under which signatures are extracted.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContractSetting {
    Clubs,
    Spades,
    Hearts,
    Diamonds,
    Grand,
    BestSuit,
    Null,
}

impl ContractSetting {
    pub fn trump_game(self) -> Option<TrumpGame> {
        match self {
            ContractSetting::Clubs => Some(TrumpGame::Suit(Suit::Clubs)),
            ContractSetting::Spades => Some(TrumpGame::Suit(Suit::Spades)),
            ContractSetting::Hearts => Some(TrumpGame::Suit(Suit::Hearts)),
            ContractSetting::Diamonds => Some(TrumpGame::Suit(Suit::Diamonds)),
            ContractSetting::Grand => Some(TrumpGame::Grand),
            ContractSetting::BestSuit => Some(TrumpGame::BestSuit),
            ContractSetting::Null => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    pub kind: AnalysisKind,
    /// Defaults to `null` for Null analyses and `best_suit` otherwise.
    #[serde(default)]
    pub contract: Option<ContractSetting>,
    #[serde(default = "default_blank_low_rank")]
    pub blank_low_rank: String,
}

impl AnalysisConfig {
    pub fn contract(&self) -> ContractSetting {
        match (self.contract, self.kind) {
            (Some(contract), _) => contract,
            (None, AnalysisKind::Null) => ContractSetting::Null,
            (None, _) => ContractSetting::BestSuit,
        }
    }

    pub fn blank_low_rank(&self) -> Option<Rank> {
        Rank::from_symbol(self.blank_low_rank.trim())
    }

    /// Extraction context for a hand whose known skat cards (or discard,
    /// for Null) are `pile`.
    pub fn context(&self, pile: skat_core::Hand) -> ContractContext {
        match self.contract().trump_game() {
            Some(game) => ContractContext::Trump { game, skat: pile },
            None => ContractContext::Null {
                discard: pile,
                blank_low_rank: self.blank_low_rank().unwrap_or(Rank::Seven),
            },
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.blank_low_rank().is_none() {
            return Err(ValidationError::InvalidField {
                field: "analysis.blank_low_rank".to_string(),
                message: format!("unknown rank '{}'", self.blank_low_rank),
            });
        }

        let contract = self.contract();
        let conflict = match self.kind {
            AnalysisKind::Null => contract != ContractSetting::Null,
            AnalysisKind::Trump | AnalysisKind::Stagnation => contract == ContractSetting::Null,
            AnalysisKind::SuitPatterns | AnalysisKind::Traps | AnalysisKind::DecisionMap => false,
        };
        if conflict {
            return Err(ValidationError::InvalidField {
                field: "analysis.contract".to_string(),
                message: format!(
                    "contract {contract:?} is not valid for analysis '{}'",
                    self.kind.as_str()
                ),
            });
        }
        Ok(())
    }
}

fn default_blank_low_rank() -> String {
    "7".to_string()
}

/// Report shaping: significance floor, ordering and decision inputs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReportConfig {
    #[serde(default = "default_min_count")]
    pub min_count: u64,
    #[serde(default)]
    pub sort_by: SortKey,
    #[serde(default = "default_trap_threshold")]
    pub trap_threshold: f64,
    #[serde(default = "default_target_probability")]
    pub target_probability: f64,
    #[serde(default = "default_values")]
    pub values: BTreeMap<String, Payoff>,
    #[serde(default)]
    pub priority: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            min_count: DEFAULT_MIN_COUNT,
            sort_by: SortKey::default(),
            trap_threshold: DEFAULT_TRAP_THRESHOLD,
            target_probability: DEFAULT_TARGET_PROBABILITY,
            values: default_values(),
            priority: Vec::new(),
        }
    }
}

impl ReportConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        for (label, value) in [
            ("report.trap_threshold", self.trap_threshold),
            ("report.target_probability", self.target_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: format!("probability {value} is outside [0, 1]"),
                });
            }
        }

        for (contract, payoff) in &self.values {
            if !(payoff.win.is_finite() && payoff.loss.is_finite())
                || payoff.win < 0.0
                || payoff.loss < 0.0
            {
                return Err(ValidationError::InvalidField {
                    field: format!("report.values.{contract}"),
                    message: "win and loss values must be finite and non-negative".to_string(),
                });
            }
        }

        let mut seen = HashSet::new();
        for contract in &self.priority {
            if !seen.insert(contract.as_str()) {
                return Err(ValidationError::InvalidField {
                    field: "report.priority".to_string(),
                    message: format!("contract '{contract}' listed more than once"),
                });
            }
        }
        Ok(())
    }
}

fn default_min_count() -> u64 {
    DEFAULT_MIN_COUNT
}

fn default_trap_threshold() -> f64 {
    DEFAULT_TRAP_THRESHOLD
}

fn default_target_probability() -> f64 {
    DEFAULT_TARGET_PROBABILITY
}

fn default_values() -> BTreeMap<String, Payoff> {
    BTreeMap::from([
        ("suit_hand".to_string(), Payoff::new(1.0, 1.0)),
        ("grand_hand".to_string(), Payoff::new(1.33, 1.33)),
        ("pickup".to_string(), Payoff::new(1.0, 2.0)),
    ])
}

fn validate_decision_inputs(
    columns: &ColumnMap,
    report: &ReportConfig,
) -> Result<(), ValidationError> {
    if columns.contracts.len() < 2 {
        return Err(ValidationError::InvalidField {
            field: "dataset.columns.contracts".to_string(),
            message: "decision map needs at least two contracts".to_string(),
        });
    }
    if let Some(missing) = columns
        .contracts
        .keys()
        .find(|contract| !report.values.contains_key(*contract))
    {
        return Err(ValidationError::InvalidField {
            field: "report.values".to_string(),
            message: format!("no value entry for contract '{missing}'"),
        });
    }
    Ok(())
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputsConfig {
    pub summary_md: String,
    pub report_json: String,
}

impl OutputsConfig {
    fn validate(&self, run_id: &str) -> Result<(), ValidationError> {
        for (label, value) in [
            ("outputs.summary_md", &self.summary_md),
            ("outputs.report_json", &self.report_json),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "path must not be empty".to_string(),
                });
            }

            let resolved = resolve_template(run_id, value);
            if resolved.components().count() == 0 {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "resolved path is invalid".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Logging configuration defaults to plain console logs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_structured: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_structured: false,
            tracing_level: default_tracing_level(),
        }
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
    }

    pub fn level(&self) -> Option<Level> {
        match self.tracing_level.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn validate_run_id(run_id: &str) -> Result<(), ValidationError> {
    if run_id.trim().is_empty() {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id must not be empty".to_string(),
        });
    }

    if !run_id.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id may only contain alphanumeric characters, '.', '_' or '-'".to_string(),
        });
    }

    Ok(())
}

fn resolve_template(run_id: &str, template: &str) -> PathBuf {
    PathBuf::from(template.replace("{run_id}", run_id))
}

/// Fully resolved output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub summary_md: PathBuf,
    pub report_json: PathBuf,
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path.as_path(),
        }
    }
}

/// Validation failures captured with contextual metadata.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}
