#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use smartprep::{daily_file_path, PipelineConfig};

pub const HEADER: [&str; 10] = [
    "date",
    "serial_number",
    "model",
    "capacity_bytes",
    "failure",
    "smart_1_normalized",
    "smart_5_raw",
    "smart_9_raw",
    "smart_10_raw",
    "smart_194_raw",
];

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid fixture date")
}

pub fn write_csv(path: &Path, header: &[&str], rows: &[Vec<String>]) {
    let mut writer = csv::Writer::from_path(path).expect("fixture csv should be creatable");
    writer.write_record(header).expect("header should be written");
    for row in rows {
        writer.write_record(row).expect("row should be written");
    }
    writer.flush().expect("fixture csv should flush");
}

/// One row per drive; `positives` are row indexes with `failure == 1`.
pub fn smart_rows(day: NaiveDate, rows: usize, positives: &[usize]) -> Vec<Vec<String>> {
    (0..rows)
        .map(|idx| {
            vec![
                day.format("%Y-%m-%d").to_string(),
                format!("SN{idx:05}"),
                "ST4000DM000".to_string(),
                "4000787030016".to_string(),
                if positives.contains(&idx) { "1" } else { "0" }.to_string(),
                (100 - (idx % 5)).to_string(),
                (idx % 7).to_string(),
                (1_000 + idx * 3).to_string(),
                "0".to_string(),
                (20 + idx % 15).to_string(),
            ]
        })
        .collect()
}

pub fn write_smart_day(root: &Path, day: NaiveDate, rows: usize, positives: &[usize]) -> PathBuf {
    let path = daily_file_path(root, day);
    write_csv(&path, &HEADER, &smart_rows(day, rows, positives));
    path
}

/// Same shape as `write_smart_day` without the label column.
pub fn write_unlabeled_day(root: &Path, day: NaiveDate, rows: usize) -> PathBuf {
    let label_idx = HEADER
        .iter()
        .position(|name| *name == "failure")
        .expect("label in header");
    let header: Vec<&str> = HEADER
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != label_idx)
        .map(|(_, name)| *name)
        .collect();
    let rows: Vec<Vec<String>> = smart_rows(day, rows, &[])
        .into_iter()
        .map(|mut row| {
            row.remove(label_idx);
            row
        })
        .collect();

    let path = daily_file_path(root, day);
    write_csv(&path, &header, &rows);
    path
}

pub fn config(data_root: &Path, artifacts: &Path, start: NaiveDate, end: NaiveDate) -> PipelineConfig {
    PipelineConfig {
        data_root: data_root.to_path_buf(),
        start_date: start,
        end_date: end,
        checkpoint_path: artifacts.join("checkpoint.parquet"),
        feature_map_path: artifacts.join("feature_map.json"),
        ..PipelineConfig::default()
    }
}
