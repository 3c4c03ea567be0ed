//! Concatenation of retained partial tables into one numeric table.

use polars::prelude::{
    col, len, lit, Column, DataFrame, DataType, Expr, IntoColumn, IntoLazy, PolarsError, Series,
    SortMultipleOptions,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const CLASS_ROWS: &str = "__class_rows";

#[derive(Debug, Error)]
pub enum ConsolidateError {
    #[error("no rows were retained; nothing to consolidate")]
    Empty,
    #[error("label column '{0}' is absent from every retained table")]
    MissingLabel(String),
    #[error("column '{column}' has dtype {dtype}, expected {expected}")]
    UnexpectedDtype {
        column: String,
        dtype: String,
        expected: &'static str,
    },
    #[error("column '{column}' holds {nulls} null cells")]
    NullCells { column: String, nulls: usize },
    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub parts: usize,
    pub rows_combined: usize,
    pub null_label_rows_dropped: usize,
    pub rows_out: usize,
    pub feature_columns: usize,
}

/// Rectangular table with an integer label and null-free `f64` features.
#[derive(Debug, Clone)]
pub struct ConsolidatedTable {
    frame: DataFrame,
    label_column: String,
}

impl ConsolidatedTable {
    /// Wraps an already-consolidated frame, e.g. one read back from a checkpoint.
    pub fn from_frame(
        frame: DataFrame,
        label_column: impl Into<String>,
    ) -> Result<Self, ConsolidateError> {
        let label_column = label_column.into();
        if frame.column(&label_column).is_err() {
            return Err(ConsolidateError::MissingLabel(label_column));
        }
        if frame.height() == 0 {
            return Err(ConsolidateError::Empty);
        }

        for column in frame.get_columns() {
            let name = column.name().as_str();
            let expected = if name == label_column {
                DataType::Int64
            } else {
                DataType::Float64
            };
            if column.dtype() != &expected {
                return Err(ConsolidateError::UnexpectedDtype {
                    column: name.to_string(),
                    dtype: column.dtype().to_string(),
                    expected: if expected == DataType::Int64 { "i64" } else { "f64" },
                });
            }
            let nulls = column.null_count();
            if nulls > 0 {
                return Err(ConsolidateError::NullCells {
                    column: name.to_string(),
                    nulls,
                });
            }
        }

        Ok(Self {
            frame,
            label_column,
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn label_column(&self) -> &str {
        &self.label_column
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Feature names in column order, label excluded.
    pub fn feature_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|name| name.as_str())
            .filter(|name| *name != self.label_column)
            .map(str::to_string)
            .collect()
    }

    /// Row count per label value, ascending by label.
    pub fn class_counts(&self) -> Result<Vec<(i64, usize)>, ConsolidateError> {
        let label = self.label_column.as_str();
        let counts = self
            .frame
            .clone()
            .lazy()
            .select([col(label).cast(DataType::Int64).alias(label)])
            .drop_nulls(None)
            .group_by([col(label)])
            .agg([len().alias(CLASS_ROWS)])
            .sort([label], SortMultipleOptions::default())
            .collect()?;

        let labels = counts.column(label)?.as_materialized_series().i64()?.clone();
        let rows = counts
            .column(CLASS_ROWS)?
            .as_materialized_series()
            .cast(&DataType::UInt64)?;
        Ok(labels
            .into_iter()
            .zip(rows.u64()?.into_iter())
            .filter_map(|(label, rows)| Some((label?, rows? as usize)))
            .collect())
    }

    pub fn count_label(&self, value: i64) -> Result<usize, ConsolidateError> {
        Ok(self
            .class_counts()?
            .into_iter()
            .find(|(label, _)| *label == value)
            .map(|(_, count)| count)
            .unwrap_or(0))
    }
}

/// Concatenates `positives ++ negatives`, aligns their columns, and coerces
/// types: label to `i64` (rows with a null label dropped), features to `f64`
/// with unconvertible or missing cells set to zero.
pub fn consolidate(
    positives: Vec<DataFrame>,
    negatives: Vec<DataFrame>,
    label_column: &str,
) -> Result<(ConsolidatedTable, ConsolidationReport), ConsolidateError> {
    let parts: Vec<DataFrame> = positives.into_iter().chain(negatives).collect();
    let rows_combined: usize = parts.iter().map(DataFrame::height).sum();
    if rows_combined == 0 {
        return Err(ConsolidateError::Empty);
    }

    let columns = union_columns(&parts);
    if !columns.iter().any(|name| name == label_column) {
        return Err(ConsolidateError::MissingLabel(label_column.to_string()));
    }

    let mut combined: Option<DataFrame> = None;
    for part in &parts {
        let aligned = align_numeric(part, &columns)?;
        match combined.as_mut() {
            Some(acc) => {
                acc.vstack_mut(&aligned)?;
            }
            None => combined = Some(aligned),
        }
    }
    let combined = combined.ok_or(ConsolidateError::Empty)?;

    let feature_exprs: Vec<Expr> = columns
        .iter()
        .filter(|name| name.as_str() != label_column)
        .map(|name| {
            col(name.as_str())
                .fill_nan(lit(0.0))
                .fill_null(lit(0.0))
                .alias(name.as_str())
        })
        .collect();

    let mut lazy = combined
        .lazy()
        .filter(col(label_column).is_not_null())
        .with_column(col(label_column).cast(DataType::Int64).alias(label_column));
    if !feature_exprs.is_empty() {
        lazy = lazy.with_columns(feature_exprs);
    }
    let frame = lazy.collect()?;

    let null_label_rows_dropped = rows_combined - frame.height();
    if null_label_rows_dropped > 0 {
        info!(
            component = "consolidate",
            event = "consolidate.label.null_rows_dropped",
            label_column,
            rows_dropped = null_label_rows_dropped
        );
    }
    if frame.height() == 0 {
        return Err(ConsolidateError::Empty);
    }

    let report = ConsolidationReport {
        parts: parts.len(),
        rows_combined,
        null_label_rows_dropped,
        rows_out: frame.height(),
        feature_columns: frame.width() - 1,
    };
    info!(
        component = "consolidate",
        event = "consolidate.finish",
        parts = report.parts,
        rows_combined = report.rows_combined,
        rows_out = report.rows_out,
        feature_columns = report.feature_columns
    );

    Ok((
        ConsolidatedTable {
            frame,
            label_column: label_column.to_string(),
        },
        report,
    ))
}

/// Column names across `parts` in first-seen order.
fn union_columns(parts: &[DataFrame]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in parts {
        for name in part.get_column_names() {
            if !out.iter().any(|seen| seen == name.as_str()) {
                out.push(name.to_string());
            }
        }
    }
    out
}

/// Projects `part` onto `columns` as `f64`; absent columns become all-null.
fn align_numeric(part: &DataFrame, columns: &[String]) -> Result<DataFrame, PolarsError> {
    let height = part.height();
    let aligned: Vec<Column> = columns
        .iter()
        .map(|name| match part.column(name) {
            Ok(existing) => Ok(existing
                .as_materialized_series()
                .cast(&DataType::Float64)?
                .into_column()),
            Err(_) => Ok(Series::full_null(name.as_str().into(), height, &DataType::Float64)
                .into_column()),
        })
        .collect::<Result<_, PolarsError>>()?;

    DataFrame::new(aligned)
}
