//! Class-stratified accumulation of cleaned chunks.

use polars::prelude::{col, lit, DataFrame, DataType, IdxCa, IdxSize, IntoLazy, PolarsResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub negative_fraction: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    EmptyChunk,
    MissingLabel { label_column: String },
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyChunk => "empty_chunk",
            Self::MissingLabel { .. } => "missing_label",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbsorbOutcome {
    Absorbed {
        positives: usize,
        negatives_seen: usize,
        negatives_kept: usize,
    },
    Skipped(SkipReason),
}

/// Growing per-class collections; one entry per contributing chunk.
#[derive(Debug, Clone)]
pub struct StratifiedAccumulator {
    label_column: String,
    sampling: SamplingConfig,
    positives: Vec<DataFrame>,
    negatives: Vec<DataFrame>,
}

impl StratifiedAccumulator {
    pub fn new(label_column: impl Into<String>, sampling: SamplingConfig) -> Self {
        Self {
            label_column: label_column.into(),
            sampling,
            positives: Vec::new(),
            negatives: Vec::new(),
        }
    }

    pub fn label_column(&self) -> &str {
        &self.label_column
    }

    pub fn positives(&self) -> &[DataFrame] {
        &self.positives
    }

    pub fn negatives(&self) -> &[DataFrame] {
        &self.negatives
    }

    pub fn positive_rows(&self) -> usize {
        self.positives.iter().map(DataFrame::height).sum()
    }

    pub fn negative_rows(&self) -> usize {
        self.negatives.iter().map(DataFrame::height).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.positives.is_empty() && self.negatives.is_empty()
    }

    /// Positives first, then negatives, each in insertion order.
    pub fn into_parts(self) -> (Vec<DataFrame>, Vec<DataFrame>) {
        (self.positives, self.negatives)
    }

    /// Keeps every positive row of `chunk` and a seeded sample of its negatives.
    pub fn absorb(&mut self, chunk: &DataFrame) -> PolarsResult<AbsorbOutcome> {
        if chunk.height() == 0 {
            return Ok(AbsorbOutcome::Skipped(SkipReason::EmptyChunk));
        }
        if chunk.column(&self.label_column).is_err() {
            return Ok(AbsorbOutcome::Skipped(SkipReason::MissingLabel {
                label_column: self.label_column.clone(),
            }));
        }

        let positives = rows_with_label(chunk, &self.label_column, 1.0)?;
        let negatives = rows_with_label(chunk, &self.label_column, 0.0)?;
        let positive_count = positives.height();
        let negatives_seen = negatives.height();

        // Sample before pushing anything so a failed chunk contributes nothing.
        let sampled = if negatives_seen > 0 {
            Some(sample_rows(
                &negatives,
                self.sampling.negative_fraction,
                self.sampling.seed,
            )?)
        } else {
            None
        };
        let negatives_kept = sampled.as_ref().map_or(0, DataFrame::height);

        if positive_count > 0 {
            self.positives.push(positives);
        }
        if let Some(sampled) = sampled {
            self.negatives.push(sampled);
        }

        Ok(AbsorbOutcome::Absorbed {
            positives: positive_count,
            negatives_seen,
            negatives_kept,
        })
    }
}

fn rows_with_label(chunk: &DataFrame, label_column: &str, value: f64) -> PolarsResult<DataFrame> {
    chunk
        .clone()
        .lazy()
        .filter(col(label_column).cast(DataType::Float64).eq(lit(value)))
        .collect()
}

/// Number of rows kept from `rows` at `fraction`, rounded half away from zero.
pub fn sample_size(rows: usize, fraction: f64) -> usize {
    ((rows as f64) * fraction).round().clamp(0.0, rows as f64) as usize
}

/// Draws `sample_size(height, fraction)` rows without replacement.
/// Kept rows stay in their original relative order.
pub fn sample_rows(frame: &DataFrame, fraction: f64, seed: u64) -> PolarsResult<DataFrame> {
    let height = frame.height();
    let amount = sample_size(height, fraction);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<IdxSize> = rand::seq::index::sample(&mut rng, height, amount)
        .into_iter()
        .map(|idx| idx as IdxSize)
        .collect();
    indices.sort_unstable();

    frame.take(&IdxCa::from_vec("idx".into(), indices))
}
