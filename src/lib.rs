//! smartprep core crate.
//!
//! Turns a date-partitioned directory of daily SMART CSV files into one
//! balanced, checkpointed training table:
//! - discovery of `<root>/YYYY-MM-DD.csv` files over a closed date range
//! - per-file cleaning (sparse-column pruning, per-drive gap filling)
//! - class-stratified accumulation (all failures, sampled non-failures)
//! - consolidation into a numeric table with an integer label
//! - Parquet checkpoint and positional feature map (`f0..fn-1`)

mod accumulator;
mod checkpoint;
mod config;
mod consolidate;
mod feature_map;
mod handoff;
mod locator;
mod observability;
mod pipeline;
mod preprocess;

pub use accumulator::{
    sample_rows, sample_size, AbsorbOutcome, SamplingConfig, SkipReason, StratifiedAccumulator,
};
pub use checkpoint::{CheckpointError, CheckpointReceipt, CheckpointStore};
pub use config::{
    pipeline_config_from_env, ChunkSchema, ConfigError, PipelineConfig, DEFAULT_CHECKPOINT_PATH,
    DEFAULT_DATA_ROOT, DEFAULT_FEATURE_MAP_PATH, DEFAULT_MISSING_THRESHOLD,
    DEFAULT_SAMPLING_FRACTION, DEFAULT_SEED,
};
pub use consolidate::{consolidate, ConsolidateError, ConsolidatedTable, ConsolidationReport};
pub use feature_map::{synthetic_name, FeatureMap, FeatureMapError, SYNTHETIC_PREFIX};
pub use handoff::{prepare_training_handoff, HandoffError, TrainingHandoff};
pub use locator::{
    daily_file_path, locate_daily_files, plan_daily_files, DailyFile, DAILY_FILE_EXTENSION,
};
pub use observability::{
    init_logging, log_app_exit, log_app_start, logging_config_from_env,
    logging_config_from_lookup, AppExit, LogFormat, LoggingConfig, LoggingInitError,
    LOG_FORMAT_VAR, LOG_LEVEL_VAR, LOG_TARGET_VAR,
};
pub use pipeline::{
    accumulate_files, build_dataset, export_feature_contract, run_pipeline, run_to_handoff,
    FileOutcome, FileReport, PipelineError, PipelineOutput, RunReport,
};
pub use preprocess::{
    drop_constant_columns, load_chunk, preprocess_chunk, prune_sparse_columns, ChunkError,
    Preprocessed,
};
