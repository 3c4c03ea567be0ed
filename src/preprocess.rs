//! Per-file loading and cleaning of one daily SMART table.
//!
//! Cleaning order:
//! 1. drop columns whose missing fraction exceeds the threshold
//! 2. stop early (degraded) when the date or entity column is absent
//! 3. parse dates, sort by (entity, date)
//! 4. forward- then backward-fill raw sensor columns within each entity
//! 5. drop rows that still hold a null
//! 6. drop identifier and descriptive columns
//! 7. drop feature columns with fewer than two distinct values

use std::path::Path;
use std::sync::Arc;

use polars::prelude::{
    col, CsvReadOptions, DataFrame, DataType, Expr, Field, FillNullStrategy, IntoLazy,
    PolarsError, Schema, SerReader, SortMultipleOptions, StrptimeOptions,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ChunkSchema;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV header error: {0}")]
    Csv(#[from] csv::Error),
    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),
}

/// Result of cleaning one chunk.
#[derive(Debug, Clone)]
pub enum Preprocessed {
    /// Fully cleaned: no nulls, no identifiers, no constant feature columns.
    Clean(DataFrame),
    /// Key columns were absent; only threshold pruning was applied.
    Degraded {
        frame: DataFrame,
        missing_keys: Vec<String>,
    },
}

impl Preprocessed {
    pub fn frame(&self) -> &DataFrame {
        match self {
            Self::Clean(frame) | Self::Degraded { frame, .. } => frame,
        }
    }

    pub fn into_frame(self) -> DataFrame {
        match self {
            Self::Clean(frame) | Self::Degraded { frame, .. } => frame,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Reads one daily CSV with identifier columns pinned to strings.
pub fn load_chunk(path: &Path, schema: &ChunkSchema) -> Result<DataFrame, ChunkError> {
    let mut header_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;
    let headers = header_reader.headers()?.clone();

    let overwrite: Schema = schema
        .string_columns()
        .filter(|name| headers.iter().any(|header| header == *name))
        .map(|name| Field::new(name.into(), DataType::String))
        .collect();
    let overwrite = if overwrite.is_empty() {
        None
    } else {
        Some(Arc::new(overwrite))
    };

    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_schema_overwrite(overwrite)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    Ok(frame)
}

pub fn preprocess_chunk(raw: DataFrame, schema: &ChunkSchema) -> Result<Preprocessed, ChunkError> {
    let pruned = prune_sparse_columns(raw, schema.missing_threshold)?;

    let missing_keys: Vec<String> = [schema.date_column.as_str(), schema.entity_column.as_str()]
        .into_iter()
        .filter(|key| pruned.column(key).is_err())
        .map(str::to_string)
        .collect();
    if !missing_keys.is_empty() {
        warn!(
            component = "preprocess",
            event = "preprocess.keys.missing",
            missing_keys = ?missing_keys,
            rows = pruned.height()
        );
        return Ok(Preprocessed::Degraded {
            frame: pruned,
            missing_keys,
        });
    }

    let date = schema.date_column.as_str();
    let entity = schema.entity_column.as_str();
    let date_expr = match pruned.column(date)?.dtype() {
        DataType::Date => col(date),
        DataType::String => col(date).str().to_date(StrptimeOptions {
            format: Some(schema.date_format.as_str().into()),
            ..Default::default()
        }),
        _ => col(date).cast(DataType::Date),
    };

    let fill_exprs: Vec<Expr> = pruned
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .filter(|name| schema.is_raw_sensor(name))
        .map(|name| {
            col(name)
                .fill_null_with_strategy(FillNullStrategy::Forward(None))
                .fill_null_with_strategy(FillNullStrategy::Backward(None))
                .over([col(entity)])
                .alias(name)
        })
        .collect();

    let rows_in = pruned.height();
    let mut lazy = pruned
        .lazy()
        .with_column(date_expr.alias(date))
        .sort(
            [entity, date],
            SortMultipleOptions::default().with_maintain_order(true),
        );
    if !fill_exprs.is_empty() {
        lazy = lazy.with_columns(fill_exprs);
    }
    let filled = lazy.drop_nulls(None).collect()?;

    let keep: Vec<String> = filled
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .filter(|name| !schema.identifier_columns().any(|id| id == *name))
        .map(str::to_string)
        .collect();
    let features = filled.select(keep)?;
    let clean = drop_constant_columns(features)?;

    debug!(
        component = "preprocess",
        event = "preprocess.chunk.clean",
        rows_in,
        rows_out = clean.height(),
        columns_out = clean.width()
    );

    Ok(Preprocessed::Clean(clean))
}

/// Drops every column whose null fraction is strictly above `threshold`.
pub fn prune_sparse_columns(frame: DataFrame, threshold: f64) -> Result<DataFrame, ChunkError> {
    let height = frame.height();
    if height == 0 {
        return Ok(frame);
    }

    let mut keep = Vec::with_capacity(frame.width());
    let mut dropped = Vec::new();
    for column in frame.get_columns() {
        let missing_fraction = column.null_count() as f64 / height as f64;
        if missing_fraction > threshold {
            dropped.push(column.name().to_string());
        } else {
            keep.push(column.name().to_string());
        }
    }

    if dropped.is_empty() {
        return Ok(frame);
    }

    debug!(
        component = "preprocess",
        event = "preprocess.columns.pruned",
        threshold,
        dropped = ?dropped
    );
    Ok(frame.select(keep)?)
}

/// Drops every column with fewer than two distinct values, label included.
///
/// A day without failures therefore loses its label column and is skipped by
/// the accumulator.
pub fn drop_constant_columns(frame: DataFrame) -> Result<DataFrame, ChunkError> {
    let mut keep = Vec::with_capacity(frame.width());
    let mut dropped = Vec::new();
    for column in frame.get_columns() {
        let name = column.name().as_str();
        if column.as_materialized_series().n_unique()? >= 2 {
            keep.push(name.to_string());
        } else {
            dropped.push(name.to_string());
        }
    }

    if !dropped.is_empty() {
        debug!(
            component = "preprocess",
            event = "preprocess.columns.constant",
            dropped = ?dropped
        );
    }

    if keep.len() == frame.width() {
        return Ok(frame);
    }
    Ok(frame.select(keep)?)
}
