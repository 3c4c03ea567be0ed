//! Split of the renamed table into `X`/`y` for the downstream trainer.

use polars::prelude::{DataFrame, PolarsError, Series};
use thiserror::Error;
use tracing::{info, warn};

use crate::consolidate::{ConsolidateError, ConsolidatedTable};
use crate::feature_map::{FeatureMap, FeatureMapError};

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("label column '{label_column}' holds a single class ({classes:?}); classification is undefined")]
    SingleClass {
        label_column: String,
        classes: Vec<(i64, usize)>,
    },
    #[error("table has no feature columns")]
    NoFeatures,
    #[error(transparent)]
    FeatureMap(#[from] FeatureMapError),
    #[error(transparent)]
    Table(#[from] ConsolidateError),
    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),
}

#[derive(Debug, Clone)]
pub struct TrainingHandoff {
    /// Features under positional names `f0..fn-1`.
    pub features: DataFrame,
    pub labels: Series,
    pub feature_map: FeatureMap,
    pub class_counts: Vec<(i64, usize)>,
}

impl TrainingHandoff {
    pub fn shape(&self) -> (usize, usize) {
        (self.features.height(), self.features.width())
    }
}

pub fn prepare_training_handoff(
    table: &ConsolidatedTable,
    feature_map: &FeatureMap,
) -> Result<TrainingHandoff, HandoffError> {
    if feature_map.is_empty() {
        return Err(HandoffError::NoFeatures);
    }

    let class_counts = table.class_counts()?;
    info!(
        component = "handoff",
        event = "handoff.class_balance",
        rows = table.height(),
        features = feature_map.len(),
        classes = ?class_counts
    );
    if class_counts.len() < 2 {
        warn!(
            component = "handoff",
            event = "handoff.single_class",
            label_column = table.label_column(),
            classes = ?class_counts
        );
        return Err(HandoffError::SingleClass {
            label_column: table.label_column().to_string(),
            classes: class_counts,
        });
    }

    let renamed = feature_map.apply(table.frame(), table.label_column())?;
    let features = renamed.select(feature_map.synthetic_names())?;
    let labels = renamed
        .column(table.label_column())?
        .as_materialized_series()
        .clone();

    Ok(TrainingHandoff {
        features,
        labels,
        feature_map: feature_map.clone(),
        class_counts,
    })
}
