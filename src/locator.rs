//! Daily file discovery over a closed date interval.

use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DAILY_FILE_EXTENSION: &str = "csv";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyFile {
    pub date: NaiveDate,
    pub path: PathBuf,
}

/// `<root>/<YYYY-MM-DD>.csv` for one calendar date.
pub fn daily_file_path(data_root: &Path, date: NaiveDate) -> PathBuf {
    data_root.join(format!(
        "{}.{DAILY_FILE_EXTENSION}",
        date.format("%Y-%m-%d")
    ))
}

/// Every candidate path in `[start, end]`, existing or not. Empty when `start > end`.
pub fn plan_daily_files(data_root: &Path, start: NaiveDate, end: NaiveDate) -> Vec<DailyFile> {
    let mut out = Vec::new();
    let mut day = start;

    while day <= end {
        out.push(DailyFile {
            date: day,
            path: daily_file_path(data_root, day),
        });
        day = match day.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => break,
        };
    }

    out
}

/// Ordered daily files in `[start, end]` that exist under `data_root`.
///
/// Dates without a file are skipped silently; an empty result is the caller's
/// terminal condition, not an error here.
pub fn locate_daily_files(data_root: &Path, start: NaiveDate, end: NaiveDate) -> Vec<DailyFile> {
    let planned = plan_daily_files(data_root, start, end);
    let dates_scanned = planned.len();

    let found: Vec<DailyFile> = planned
        .into_iter()
        .filter(|file| {
            let exists = file.path.is_file();
            if !exists {
                debug!(
                    component = "locator",
                    event = "locator.date.missing",
                    date = %file.date,
                    path = %file.path.display()
                );
            }
            exists
        })
        .collect();

    info!(
        component = "locator",
        event = "locator.scan.finish",
        data_root = %data_root.display(),
        start_date = %start,
        end_date = %end,
        dates_scanned,
        files_found = found.len()
    );

    found
}
