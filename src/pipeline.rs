//! End-to-end driver: checkpoint lookup, per-file accumulation,
//! consolidation, checkpoint write, and feature-contract export.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::accumulator::{AbsorbOutcome, SamplingConfig, SkipReason, StratifiedAccumulator};
use crate::checkpoint::{CheckpointError, CheckpointReceipt, CheckpointStore};
use crate::config::{ChunkSchema, ConfigError, PipelineConfig};
use crate::consolidate::{consolidate, ConsolidateError, ConsolidatedTable, ConsolidationReport};
use crate::feature_map::{FeatureMap, FeatureMapError};
use crate::handoff::{prepare_training_handoff, HandoffError, TrainingHandoff};
use crate::locator::{locate_daily_files, DailyFile};
use crate::preprocess::{load_chunk, preprocess_chunk, ChunkError, Preprocessed};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no daily files found under {data_root} between {start} and {end}")]
    NoFilesFound {
        data_root: PathBuf,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("no usable rows survived accumulation across {files} files")]
    NothingRetained { files: usize },
    #[error(transparent)]
    Consolidate(ConsolidateError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    FeatureMap(#[from] FeatureMapError),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
}

impl PipelineError {
    /// Stable short name for logs and exit summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::NoFilesFound { .. } => "no_files_found",
            Self::NothingRetained { .. } => "nothing_retained",
            Self::Consolidate(_) => "consolidate",
            Self::Checkpoint(_) => "checkpoint",
            Self::FeatureMap(_) => "feature_map",
            Self::Handoff(HandoffError::SingleClass { .. }) => "single_class",
            Self::Handoff(_) => "handoff",
        }
    }
}

/// What happened to one daily file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileOutcome {
    Processed {
        rows_clean: usize,
        positives: usize,
        negatives_seen: usize,
        negatives_kept: usize,
    },
    /// Key columns were absent; the pruned table was still offered to the accumulator.
    Degraded {
        missing_keys: Vec<String>,
        absorbed: AbsorbOutcome,
    },
    Skipped { reason: SkipReason },
    Failed { error: String },
}

impl FileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed { .. } => "processed",
            Self::Degraded { .. } => "degraded",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub date: NaiveDate,
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub checkpoint_hit: bool,
    pub files_found: usize,
    pub files: Vec<FileReport>,
    pub positives_retained: usize,
    pub negatives_retained: usize,
    pub consolidation: Option<ConsolidationReport>,
    pub checkpoint: Option<CheckpointReceipt>,
}

impl RunReport {
    fn from_checkpoint(receipt: Option<CheckpointReceipt>) -> Self {
        Self {
            checkpoint_hit: true,
            files_found: 0,
            files: Vec::new(),
            positives_retained: 0,
            negatives_retained: 0,
            consolidation: None,
            checkpoint: receipt,
        }
    }

    fn count(&self, kind: &str) -> usize {
        self.files
            .iter()
            .filter(|file| file.outcome.as_str() == kind)
            .count()
    }

    pub fn processed(&self) -> usize {
        self.count("processed")
    }

    pub fn degraded(&self) -> usize {
        self.count("degraded")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: ConsolidatedTable,
    pub feature_map: FeatureMap,
    pub report: RunReport,
}

/// Loads the checkpoint if present, otherwise rebuilds and saves it; then
/// exports the feature map.
pub fn run_pipeline(cfg: &PipelineConfig) -> Result<PipelineOutput, PipelineError> {
    cfg.validate()?;
    info!(
        component = "pipeline",
        event = "pipeline.run.start",
        data_root = %cfg.data_root.display(),
        start_date = %cfg.start_date,
        end_date = %cfg.end_date,
        sampling_fraction = cfg.sampling_fraction,
        seed = cfg.seed,
        checkpoint_path = %cfg.checkpoint_path.display()
    );

    let store = CheckpointStore::new(&cfg.checkpoint_path);
    let (table, report) = match store.load(&cfg.schema.label_column)? {
        Some(table) => {
            let receipt = store.fingerprint()?;
            (table, RunReport::from_checkpoint(Some(receipt)))
        }
        None => {
            let (table, mut report) = build_dataset(cfg)?;
            report.checkpoint = Some(store.save(&table)?);
            (table, report)
        }
    };

    let feature_map = export_feature_contract(&table, &cfg.feature_map_path)?;

    info!(
        component = "pipeline",
        event = "pipeline.run.finish",
        checkpoint_hit = report.checkpoint_hit,
        rows = table.height(),
        features = feature_map.len(),
        files_found = report.files_found,
        files_processed = report.processed(),
        files_degraded = report.degraded(),
        files_skipped = report.skipped(),
        files_failed = report.failed()
    );

    Ok(PipelineOutput {
        table,
        feature_map,
        report,
    })
}

/// `run_pipeline` followed by the `X`/`y` split.
pub fn run_to_handoff(
    cfg: &PipelineConfig,
) -> Result<(TrainingHandoff, RunReport), PipelineError> {
    let output = run_pipeline(cfg)?;
    let handoff = prepare_training_handoff(&output.table, &output.feature_map)?;
    Ok((handoff, output.report))
}

/// Discovery through consolidation, without touching the checkpoint.
pub fn build_dataset(
    cfg: &PipelineConfig,
) -> Result<(ConsolidatedTable, RunReport), PipelineError> {
    cfg.validate()?;

    let files = locate_daily_files(&cfg.data_root, cfg.start_date, cfg.end_date);
    if files.is_empty() {
        warn!(
            component = "pipeline",
            event = "pipeline.corpus.empty",
            data_root = %cfg.data_root.display()
        );
        return Err(PipelineError::NoFilesFound {
            data_root: cfg.data_root.clone(),
            start: cfg.start_date,
            end: cfg.end_date,
        });
    }

    let sampling = SamplingConfig {
        negative_fraction: cfg.sampling_fraction,
        seed: cfg.seed,
    };
    let (accumulator, file_reports) = accumulate_files(&files, &cfg.schema, sampling);
    let positives_retained = accumulator.positive_rows();
    let negatives_retained = accumulator.negative_rows();

    let (positives, negatives) = accumulator.into_parts();
    let (table, consolidation) = consolidate(positives, negatives, &cfg.schema.label_column)
        .map_err(|err| match err {
            ConsolidateError::Empty | ConsolidateError::MissingLabel(_) => {
                PipelineError::NothingRetained { files: files.len() }
            }
            other => PipelineError::Consolidate(other),
        })?;

    let report = RunReport {
        checkpoint_hit: false,
        files_found: files.len(),
        files: file_reports,
        positives_retained,
        negatives_retained,
        consolidation: Some(consolidation),
        checkpoint: None,
    };
    Ok((table, report))
}

/// Processes `files` strictly in order; at most one raw table is alive at a time.
pub fn accumulate_files(
    files: &[DailyFile],
    schema: &ChunkSchema,
    sampling: SamplingConfig,
) -> (StratifiedAccumulator, Vec<FileReport>) {
    let mut accumulator = StratifiedAccumulator::new(schema.label_column.clone(), sampling);
    let mut reports = Vec::with_capacity(files.len());
    let total = files.len();

    for (idx, file) in files.iter().enumerate() {
        info!(
            component = "pipeline",
            event = "pipeline.file.start",
            path = %file.path.display(),
            index = idx + 1,
            total,
            percent_complete = ((idx + 1) as f64 / total as f64) * 100.0
        );

        let outcome = match process_file(&file.path, schema, &mut accumulator) {
            Ok(outcome) => outcome,
            Err(err) => FileOutcome::Failed {
                error: err.to_string(),
            },
        };
        log_file_outcome(&file.path, &outcome);

        reports.push(FileReport {
            date: file.date,
            path: file.path.clone(),
            outcome,
        });
    }

    (accumulator, reports)
}

fn process_file(
    path: &Path,
    schema: &ChunkSchema,
    accumulator: &mut StratifiedAccumulator,
) -> Result<FileOutcome, ChunkError> {
    let raw = load_chunk(path, schema)?;

    match preprocess_chunk(raw, schema)? {
        Preprocessed::Clean(frame) => {
            let rows_clean = frame.height();
            Ok(match accumulator.absorb(&frame)? {
                AbsorbOutcome::Absorbed {
                    positives,
                    negatives_seen,
                    negatives_kept,
                } => FileOutcome::Processed {
                    rows_clean,
                    positives,
                    negatives_seen,
                    negatives_kept,
                },
                AbsorbOutcome::Skipped(reason) => FileOutcome::Skipped { reason },
            })
        }
        Preprocessed::Degraded {
            frame,
            missing_keys,
        } => {
            let frame = without_identifiers(frame, schema)?;
            Ok(match accumulator.absorb(&frame)? {
                AbsorbOutcome::Skipped(reason) => FileOutcome::Skipped { reason },
                absorbed => FileOutcome::Degraded {
                    missing_keys,
                    absorbed,
                },
            })
        }
    }
}

/// Identifier columns never reach the feature set, even from a degraded chunk.
fn without_identifiers(frame: DataFrame, schema: &ChunkSchema) -> Result<DataFrame, ChunkError> {
    let keep: Vec<String> = frame
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .filter(|name| !schema.identifier_columns().any(|id| id == *name))
        .map(str::to_string)
        .collect();
    if keep.len() == frame.width() {
        return Ok(frame);
    }
    Ok(frame.select(keep)?)
}

fn log_file_outcome(path: &Path, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Processed {
            rows_clean,
            positives,
            negatives_seen,
            negatives_kept,
        } => info!(
            component = "pipeline",
            event = "pipeline.file.processed",
            path = %path.display(),
            rows_clean,
            positives,
            negatives_seen,
            negatives_kept
        ),
        FileOutcome::Degraded {
            missing_keys,
            absorbed,
        } => warn!(
            component = "pipeline",
            event = "pipeline.file.degraded",
            path = %path.display(),
            missing_keys = ?missing_keys,
            absorbed = ?absorbed
        ),
        FileOutcome::Skipped { reason } => warn!(
            component = "pipeline",
            event = "pipeline.file.skipped",
            path = %path.display(),
            reason = reason.as_str()
        ),
        FileOutcome::Failed { error } => warn!(
            component = "pipeline",
            event = "pipeline.file.failed",
            path = %path.display(),
            error = %error
        ),
    }
}

/// Builds the positional map from the table's current feature order and writes it.
pub fn export_feature_contract(
    table: &ConsolidatedTable,
    path: &Path,
) -> Result<FeatureMap, FeatureMapError> {
    let feature_map = FeatureMap::from_features(table.feature_names())?;
    feature_map.save(path)?;
    Ok(feature_map)
}
