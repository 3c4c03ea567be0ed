//! Pipeline configuration: paths, date range, sampling, and column roles.

use std::env;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SAMPLING_FRACTION: f64 = 0.05;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_MISSING_THRESHOLD: f64 = 0.5;
pub const DEFAULT_CHECKPOINT_PATH: &str = "drive_failure_sampled_data.parquet";
pub const DEFAULT_FEATURE_MAP_PATH: &str = "feature_map.json";
pub const DEFAULT_DATA_ROOT: &str = "/mnt/2TB HDD/DataSets/Drive-Failure";

/// Column roles inside one daily SMART file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSchema {
    pub label_column: String,
    pub date_column: String,
    pub entity_column: String,
    pub descriptive_columns: Vec<String>,
    pub sensor_family_marker: String,
    pub raw_sensor_marker: String,
    pub missing_threshold: f64,
    pub date_format: String,
}

impl Default for ChunkSchema {
    fn default() -> Self {
        Self {
            label_column: "failure".to_string(),
            date_column: "date".to_string(),
            entity_column: "serial_number".to_string(),
            descriptive_columns: vec!["model".to_string(), "capacity_bytes".to_string()],
            sensor_family_marker: "smart_".to_string(),
            raw_sensor_marker: "_raw".to_string(),
            missing_threshold: DEFAULT_MISSING_THRESHOLD,
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

impl ChunkSchema {
    pub fn is_raw_sensor(&self, column: &str) -> bool {
        column.contains(self.sensor_family_marker.as_str())
            && column.contains(self.raw_sensor_marker.as_str())
    }

    /// Columns that identify a row but must never become features.
    pub fn identifier_columns(&self) -> impl Iterator<Item = &str> {
        [self.date_column.as_str(), self.entity_column.as_str()]
            .into_iter()
            .chain(self.descriptive_columns.iter().map(String::as_str))
    }

    /// Columns pinned to string dtype when a raw file is read.
    pub fn string_columns(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.entity_column.as_str())
            .chain(self.descriptive_columns.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub data_root: PathBuf,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub sampling_fraction: f64,
    pub seed: u64,
    pub checkpoint_path: PathBuf,
    pub feature_map_path: PathBuf,
    pub schema: ChunkSchema,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid default start date"),
            end_date: NaiveDate::from_ymd_opt(2025, 6, 6).expect("valid default end date"),
            sampling_fraction: DEFAULT_SAMPLING_FRACTION,
            seed: DEFAULT_SEED,
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            feature_map_path: PathBuf::from(DEFAULT_FEATURE_MAP_PATH),
            schema: ChunkSchema::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
    #[error("start date {start} is after end date {end}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },
    #[error("sampling fraction must be in (0, 1], got {0}")]
    InvalidSamplingFraction(f64),
    #[error("missing-value threshold must be in [0, 1], got {0}")]
    InvalidMissingThreshold(f64),
    #[error("column role {0} must not be empty")]
    EmptyColumnName(&'static str),
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_date > self.end_date {
            return Err(ConfigError::InvertedDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if !(self.sampling_fraction > 0.0 && self.sampling_fraction <= 1.0) {
            return Err(ConfigError::InvalidSamplingFraction(
                self.sampling_fraction,
            ));
        }
        if !(0.0..=1.0).contains(&self.schema.missing_threshold) {
            return Err(ConfigError::InvalidMissingThreshold(
                self.schema.missing_threshold,
            ));
        }

        let roles = [
            ("label_column", &self.schema.label_column),
            ("date_column", &self.schema.date_column),
            ("entity_column", &self.schema.entity_column),
        ];
        for (role, name) in roles {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyColumnName(role));
            }
        }

        Ok(())
    }
}

pub fn pipeline_config_from_env() -> Result<PipelineConfig, ConfigError> {
    let mut config = PipelineConfig::default();

    if let Some(root) = non_empty_var("SMARTPREP_DATA_ROOT") {
        config.data_root = PathBuf::from(root);
    }
    if let Some(raw) = non_empty_var("SMARTPREP_START_DATE") {
        config.start_date = parse_date("SMARTPREP_START_DATE", &raw)?;
    }
    if let Some(raw) = non_empty_var("SMARTPREP_END_DATE") {
        config.end_date = parse_date("SMARTPREP_END_DATE", &raw)?;
    }
    if let Some(raw) = non_empty_var("SMARTPREP_SAMPLING_FRACTION") {
        config.sampling_fraction =
            raw.parse::<f64>()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: "SMARTPREP_SAMPLING_FRACTION",
                    value: raw.clone(),
                })?;
    }
    if let Some(raw) = non_empty_var("SMARTPREP_SEED") {
        config.seed = raw.parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
            var: "SMARTPREP_SEED",
            value: raw.clone(),
        })?;
    }
    if let Some(path) = non_empty_var("SMARTPREP_CHECKPOINT_PATH") {
        config.checkpoint_path = PathBuf::from(path);
    }
    if let Some(path) = non_empty_var("SMARTPREP_FEATURE_MAP_PATH") {
        config.feature_map_path = PathBuf::from(path);
    }
    if let Some(label) = non_empty_var("SMARTPREP_LABEL_COLUMN") {
        config.schema.label_column = label;
    }

    config.validate()?;
    Ok(config)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_date(var: &'static str, raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ConfigError::InvalidEnv {
        var,
        value: raw.to_string(),
    })
}
