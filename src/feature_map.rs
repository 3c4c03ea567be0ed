//! Positional feature names (`f0..fn-1`) and their JSON side artifact.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use polars::prelude::{DataFrame, PolarsError};
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;
use tracing::info;

pub const SYNTHETIC_PREFIX: &str = "f";

#[derive(Debug, Error)]
pub enum FeatureMapError {
    #[error("I/O error on feature map {path}: {message}")]
    Io { path: String, message: String },
    #[error("feature map JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate feature name '{0}'")]
    DuplicateFeature(String),
    #[error("'{0}' is not a positional feature name")]
    InvalidSyntheticName(String),
    #[error("positional names are not dense: expected f{expected}, found {found}")]
    NotDense { expected: usize, found: String },
    #[error("feature map does not match table columns: expected {expected:?}, got {actual:?}")]
    ColumnMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),
}

/// Ordered bijection from original feature names to `f<i>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureMap {
    originals: Vec<String>,
}

pub fn synthetic_name(index: usize) -> String {
    format!("{SYNTHETIC_PREFIX}{index}")
}

impl FeatureMap {
    pub fn from_features<I, S>(features: I) -> Result<Self, FeatureMapError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let originals: Vec<String> = features.into_iter().map(Into::into).collect();
        let mut seen = HashSet::with_capacity(originals.len());
        for name in &originals {
            if !seen.insert(name.as_str()) {
                return Err(FeatureMapError::DuplicateFeature(name.clone()));
            }
        }
        Ok(Self { originals })
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    pub fn originals(&self) -> &[String] {
        &self.originals
    }

    pub fn synthetic_names(&self) -> Vec<String> {
        (0..self.originals.len()).map(synthetic_name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, String)> + '_ {
        self.originals
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), synthetic_name(idx)))
    }

    pub fn synthetic_for(&self, original: &str) -> Option<String> {
        self.originals
            .iter()
            .position(|name| name == original)
            .map(synthetic_name)
    }

    pub fn original_for(&self, synthetic: &str) -> Option<&str> {
        parse_synthetic(synthetic)
            .and_then(|idx| self.originals.get(idx))
            .map(String::as_str)
    }

    /// Renames `frame`'s feature columns; `passthrough` columns (the label) keep their names.
    ///
    /// The frame's non-passthrough columns must equal the map's domain, in order.
    pub fn apply(&self, frame: &DataFrame, passthrough: &str) -> Result<DataFrame, FeatureMapError> {
        let actual: Vec<String> = frame
            .get_column_names()
            .into_iter()
            .map(|name| name.as_str())
            .filter(|name| *name != passthrough)
            .map(str::to_string)
            .collect();
        if actual != self.originals {
            return Err(FeatureMapError::ColumnMismatch {
                expected: self.originals.clone(),
                actual,
            });
        }

        let mut renamed = frame.clone();
        for (original, synthetic) in self.iter() {
            renamed.rename(original, synthetic.into())?;
        }
        Ok(renamed)
    }

    pub fn to_json_pretty(&self) -> Result<Vec<u8>, FeatureMapError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        Ok(buf)
    }

    pub fn save(&self, path: &Path) -> Result<(), FeatureMapError> {
        let bytes = self.to_json_pretty()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| io_error(path, err))?;
        }
        fs::write(path, &bytes).map_err(|err| io_error(path, err))?;

        info!(
            component = "feature_map",
            event = "feature_map.saved",
            path = %path.display(),
            features = self.len()
        );
        Ok(())
    }

    /// Reads a saved map and checks it is a dense `f0..fn-1` bijection.
    pub fn load(path: &Path) -> Result<Self, FeatureMapError> {
        let bytes = fs::read(path).map_err(|err| io_error(path, err))?;
        Self::from_json(&bytes)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, FeatureMapError> {
        let raw: BTreeMap<String, String> = serde_json::from_slice(bytes)?;

        let mut indexed: Vec<(usize, String, String)> = Vec::with_capacity(raw.len());
        for (original, synthetic) in raw {
            let idx = parse_synthetic(&synthetic)
                .ok_or_else(|| FeatureMapError::InvalidSyntheticName(synthetic.clone()))?;
            indexed.push((idx, synthetic, original));
        }
        indexed.sort_by_key(|(idx, _, _)| *idx);

        let mut originals = Vec::with_capacity(indexed.len());
        for (expected, (idx, synthetic, original)) in indexed.into_iter().enumerate() {
            if idx != expected {
                return Err(FeatureMapError::NotDense {
                    expected,
                    found: synthetic,
                });
            }
            originals.push(original);
        }

        Ok(Self { originals })
    }
}

impl Serialize for FeatureMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.originals.len()))?;
        for (original, synthetic) in self.iter() {
            map.serialize_entry(original, &synthetic)?;
        }
        map.end()
    }
}

fn parse_synthetic(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(SYNTHETIC_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // "f01" would alias "f1".
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

fn io_error(path: &Path, err: std::io::Error) -> FeatureMapError {
    FeatureMapError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
