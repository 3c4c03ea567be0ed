//! Parquet checkpoint of the consolidated table.

use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::{ParquetReader, ParquetWriter, PolarsError, SerReader};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::consolidate::{ConsolidateError, ConsolidatedTable};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error on checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parquet error on checkpoint {path}: {source}")]
    Parquet {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
    #[error("checkpoint {path} is not a usable table: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: ConsolidateError,
    },
    #[error("invalid checkpoint path: {0}")]
    InvalidPath(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointReceipt {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// `Ok(None)` when no artifact exists yet.
    pub fn load(&self, label_column: &str) -> Result<Option<ConsolidatedTable>, CheckpointError> {
        if !self.exists() {
            info!(
                component = "checkpoint",
                event = "checkpoint.miss",
                path = %self.path.display()
            );
            return Ok(None);
        }

        let file = fs::File::open(&self.path).map_err(|source| self.io_error(source))?;
        let frame = ParquetReader::new(file)
            .finish()
            .map_err(|source| CheckpointError::Parquet {
                path: self.path.clone(),
                source,
            })?;
        let table = ConsolidatedTable::from_frame(frame, label_column).map_err(|source| {
            CheckpointError::Invalid {
                path: self.path.clone(),
                source,
            }
        })?;

        info!(
            component = "checkpoint",
            event = "checkpoint.hit",
            path = %self.path.display(),
            rows = table.height(),
            columns = table.frame().width()
        );
        Ok(Some(table))
    }

    /// Overwrites the artifact atomically (temp file, fsync, rename).
    pub fn save(&self, table: &ConsolidatedTable) -> Result<CheckpointReceipt, CheckpointError> {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| CheckpointError::InvalidPath(self.path.clone()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        let tmp_path = self.path.with_file_name(format!("{file_name}.tmp"));

        {
            let file = fs::File::create(&tmp_path).map_err(|source| self.io_error(source))?;
            let mut frame = table.frame().clone();
            ParquetWriter::new(&file)
                .finish(&mut frame)
                .map_err(|source| CheckpointError::Parquet {
                    path: tmp_path.clone(),
                    source,
                })?;
            file.sync_all().map_err(|source| self.io_error(source))?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|source| self.io_error(source))?;

        let receipt = self.fingerprint()?;
        info!(
            component = "checkpoint",
            event = "checkpoint.saved",
            path = %receipt.path.display(),
            rows = table.height(),
            bytes = receipt.bytes,
            sha256 = %receipt.sha256
        );
        Ok(receipt)
    }

    pub fn fingerprint(&self) -> Result<CheckpointReceipt, CheckpointError> {
        let bytes = fs::read(&self.path).map_err(|source| self.io_error(source))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(CheckpointReceipt {
            path: self.path.clone(),
            bytes: bytes.len() as u64,
            sha256: hex::encode(hasher.finalize()),
        })
    }

    fn io_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
