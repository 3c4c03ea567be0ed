//! Logging setup and process lifecycle events for the smartprep drivers.

use std::env;

use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::PipelineConfig;
use crate::pipeline::{PipelineError, RunReport};

pub const LOG_LEVEL_VAR: &str = "SMARTPREP_LOG_LEVEL";
pub const LOG_FORMAT_VAR: &str = "SMARTPREP_LOG_FORMAT";
pub const LOG_TARGET_VAR: &str = "SMARTPREP_LOG_TARGET";

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, for batch runs collected by a log shipper.
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `smartprep=debug`.
    pub filter: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Logging never changes the produced dataset, so bad values fall back to defaults.
pub fn logging_config_from_env() -> LoggingConfig {
    logging_config_from_lookup(|key| env::var(key).ok())
}

pub fn logging_config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LoggingConfig {
    let defaults = LoggingConfig::default();

    let filter = lookup(LOG_LEVEL_VAR)
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty() && EnvFilter::try_new(raw).is_ok())
        .unwrap_or(defaults.filter);
    let format = lookup(LOG_FORMAT_VAR)
        .and_then(|raw| LogFormat::parse(&raw))
        .unwrap_or(defaults.format);
    let include_target = lookup(LOG_TARGET_VAR)
        .and_then(|raw| parse_switch(&raw))
        .unwrap_or(defaults.include_target);

    LoggingConfig {
        filter,
        format,
        include_target,
    }
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(config.format == LogFormat::Pretty);

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }
    Ok(())
}

/// Records what a driver is about to build, before any file is touched.
pub fn log_app_start(app: &str, logging: &LoggingConfig, pipeline: &PipelineConfig) {
    info!(
        component = app,
        event = "app.start",
        data_root = %pipeline.data_root.display(),
        start_date = %pipeline.start_date,
        end_date = %pipeline.end_date,
        sampling_fraction = pipeline.sampling_fraction,
        seed = pipeline.seed,
        label_column = %pipeline.schema.label_column,
        checkpoint_path = %pipeline.checkpoint_path.display(),
        feature_map_path = %pipeline.feature_map_path.display(),
        log_filter = %logging.filter,
        log_format = ?logging.format
    );
}

/// How a driver run ended.
#[derive(Debug, Clone, Copy)]
pub enum AppExit<'a> {
    Completed(&'a RunReport),
    Failed(&'a PipelineError),
}

pub fn log_app_exit(app: &str, exit: AppExit<'_>) {
    match exit {
        AppExit::Completed(report) => info!(
            component = app,
            event = "app.exit",
            status = "ok",
            checkpoint_hit = report.checkpoint_hit,
            files_found = report.files_found,
            files_processed = report.processed(),
            files_degraded = report.degraded(),
            files_skipped = report.skipped(),
            files_failed = report.failed(),
            positives_retained = report.positives_retained,
            negatives_retained = report.negatives_retained,
            checkpoint_sha256 = report
                .checkpoint
                .as_ref()
                .map(|receipt| receipt.sha256.as_str())
                .unwrap_or("")
        ),
        AppExit::Failed(err) => error!(
            component = app,
            event = "app.exit",
            status = "error",
            error_kind = err.kind(),
            error = %err
        ),
    }
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
