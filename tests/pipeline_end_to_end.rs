mod common;

use std::fs;

use common::{config, date, write_csv, write_smart_day, write_unlabeled_day};
use regex::Regex;
use smartprep::{
    build_dataset, load_chunk, preprocess_chunk, run_pipeline, run_to_handoff, AbsorbOutcome,
    ChunkSchema, FeatureMap, FileOutcome, HandoffError, PipelineError, Preprocessed,
    SamplingConfig, SkipReason, StratifiedAccumulator,
};
use tempfile::tempdir;

const EXPECTED_FEATURES: [&str; 4] = [
    "smart_1_normalized",
    "smart_5_raw",
    "smart_9_raw",
    "smart_194_raw",
];

#[test]
fn three_day_window_keeps_failures_samples_negatives_and_skips_unlabeled_day() {
    let data = tempdir().expect("tempdir should be created");
    let artifacts = tempdir().expect("tempdir should be created");
    write_smart_day(data.path(), date(2024, 1, 1), 100, &[3, 57]);
    write_unlabeled_day(data.path(), date(2024, 1, 3), 50);
    let cfg = config(data.path(), artifacts.path(), date(2024, 1, 1), date(2024, 1, 3));

    let output = run_pipeline(&cfg).expect("pipeline should succeed");
    let report = &output.report;

    assert!(!report.checkpoint_hit);
    assert_eq!(report.files_found, 2);
    let dates: Vec<_> = report.files.iter().map(|file| file.date).collect();
    assert_eq!(dates, vec![date(2024, 1, 1), date(2024, 1, 3)]);

    assert_eq!(
        report.files[0].outcome,
        FileOutcome::Processed {
            rows_clean: 100,
            positives: 2,
            negatives_seen: 98,
            negatives_kept: 5,
        }
    );
    assert_eq!(
        report.files[1].outcome,
        FileOutcome::Skipped {
            reason: SkipReason::MissingLabel {
                label_column: "failure".to_string()
            }
        }
    );
    assert_eq!(report.processed(), 1);
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.positives_retained, 2);
    assert_eq!(report.negatives_retained, 5);

    let table = &output.table;
    assert_eq!(table.height(), 7);
    assert_eq!(table.count_label(1).expect("label counts"), 2);
    assert_eq!(table.count_label(0).expect("label counts"), 5);
    assert_eq!(table.feature_names(), EXPECTED_FEATURES);

    let receipt = report
        .checkpoint
        .as_ref()
        .expect("fresh run should write a checkpoint");
    assert!(receipt.path.is_file());
    assert_eq!(receipt.sha256.len(), 64);
}

#[test]
fn second_run_loads_checkpoint_without_reading_sources() {
    let data = tempdir().expect("tempdir should be created");
    let artifacts = tempdir().expect("tempdir should be created");
    write_smart_day(data.path(), date(2024, 2, 1), 60, &[0, 10]);
    write_smart_day(data.path(), date(2024, 2, 2), 60, &[5]);
    let cfg = config(data.path(), artifacts.path(), date(2024, 2, 1), date(2024, 2, 2));

    let first = run_pipeline(&cfg).expect("first run should succeed");
    let first_receipt = first.report.checkpoint.clone().expect("checkpoint receipt");

    fs::remove_dir_all(data.path()).expect("source directory should be removable");
    fs::remove_file(&cfg.feature_map_path).expect("feature map should exist");

    let second = run_pipeline(&cfg).expect("second run should load the checkpoint");
    assert!(second.report.checkpoint_hit);
    assert!(second.report.files.is_empty());
    assert_eq!(second.report.files_found, 0);
    assert_eq!(
        second.report.checkpoint.as_ref().map(|r| r.sha256.as_str()),
        Some(first_receipt.sha256.as_str())
    );
    assert!(second.table.frame().equals(first.table.frame()));
    assert_eq!(second.feature_map, first.feature_map);
    assert!(
        cfg.feature_map_path.is_file(),
        "feature map is re-exported on a checkpoint hit"
    );
}

#[test]
fn fresh_runs_with_same_seed_produce_identical_checkpoints() {
    let data = tempdir().expect("tempdir should be created");
    write_smart_day(data.path(), date(2024, 3, 1), 120, &[1, 2, 3]);
    write_smart_day(data.path(), date(2024, 3, 2), 80, &[40]);

    let run_a = tempdir().expect("tempdir should be created");
    let run_b = tempdir().expect("tempdir should be created");
    let cfg_a = config(data.path(), run_a.path(), date(2024, 3, 1), date(2024, 3, 2));
    let cfg_b = config(data.path(), run_b.path(), date(2024, 3, 1), date(2024, 3, 2));

    let a = run_pipeline(&cfg_a).expect("run a should succeed");
    let b = run_pipeline(&cfg_b).expect("run b should succeed");

    let sha_a = a.report.checkpoint.expect("receipt a").sha256;
    let sha_b = b.report.checkpoint.expect("receipt b").sha256;
    assert_eq!(sha_a, sha_b);
    assert_eq!(
        fs::read(&cfg_a.feature_map_path).expect("map a"),
        fs::read(&cfg_b.feature_map_path).expect("map b")
    );
}

#[test]
fn every_positive_survives_regardless_of_sampling_rate() {
    let data = tempdir().expect("tempdir should be created");
    let artifacts = tempdir().expect("tempdir should be created");
    write_smart_day(data.path(), date(2024, 4, 1), 30, &[7]);
    write_smart_day(data.path(), date(2024, 4, 2), 30, &[]);
    write_smart_day(data.path(), date(2024, 4, 3), 30, &[0, 1, 29]);
    let mut cfg = config(data.path(), artifacts.path(), date(2024, 4, 1), date(2024, 4, 3));
    cfg.sampling_fraction = 0.01;

    let (table, report) = build_dataset(&cfg).expect("dataset should build");

    assert_eq!(report.positives_retained, 4);
    assert_eq!(table.count_label(1).expect("label counts"), 4);
    // Day 2 has no failures, so its constant label column is pruned.
    assert_eq!(
        report.files[1].outcome,
        FileOutcome::Skipped {
            reason: SkipReason::MissingLabel {
                label_column: "failure".to_string()
            }
        }
    );
    // round(29 * 0.01) + round(27 * 0.01) == 0
    assert_eq!(table.count_label(0).expect("label counts"), 0);
    assert!(
        !cfg.checkpoint_path.exists(),
        "build_dataset must not write a checkpoint"
    );
}

#[test]
fn feature_map_is_a_dense_bijection_over_final_columns() {
    let data = tempdir().expect("tempdir should be created");
    let artifacts = tempdir().expect("tempdir should be created");
    write_smart_day(data.path(), date(2024, 5, 1), 40, &[2, 9]);
    let cfg = config(data.path(), artifacts.path(), date(2024, 5, 1), date(2024, 5, 1));

    let output = run_pipeline(&cfg).expect("pipeline should succeed");
    let raw = fs::read_to_string(&cfg.feature_map_path).expect("feature map should be written");
    let json: serde_json::Value = serde_json::from_str(&raw).expect("feature map should be json");
    let object = json.as_object().expect("feature map should be an object");

    let synthetic = Regex::new(r"^f\d+$").expect("valid regex");
    assert_eq!(object.len(), EXPECTED_FEATURES.len());
    for (idx, original) in EXPECTED_FEATURES.iter().enumerate() {
        let value = object
            .get(*original)
            .and_then(|v| v.as_str())
            .expect("every final feature should be mapped");
        assert!(synthetic.is_match(value), "{value} is not positional");
        assert_eq!(value, format!("f{idx}"));
    }
    assert!(!object.contains_key("failure"));

    let reloaded = FeatureMap::load(&cfg.feature_map_path).expect("feature map should reload");
    assert_eq!(reloaded, output.feature_map);
    assert_eq!(reloaded.originals(), output.table.feature_names().as_slice());
}

#[test]
fn handoff_renames_features_and_keeps_integer_labels() {
    let data = tempdir().expect("tempdir should be created");
    let artifacts = tempdir().expect("tempdir should be created");
    write_smart_day(data.path(), date(2024, 5, 10), 100, &[11, 12, 13]);
    let cfg = config(data.path(), artifacts.path(), date(2024, 5, 10), date(2024, 5, 10));

    let (handoff, _report) = run_to_handoff(&cfg).expect("handoff should succeed");

    assert_eq!(handoff.shape(), (8, 4));
    let names: Vec<String> = handoff
        .features
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(names, vec!["f0", "f1", "f2", "f3"]);
    assert_eq!(handoff.labels.len(), 8);
    assert_eq!(handoff.class_counts, vec![(0, 5), (1, 3)]);
}

#[test]
fn degraded_file_is_absorbed_without_identifier_columns() {
    let data = tempdir().expect("tempdir should be created");
    let artifacts = tempdir().expect("tempdir should be created");
    write_smart_day(data.path(), date(2024, 6, 1), 40, &[4]);
    let rows: Vec<Vec<String>> = (0..20)
        .map(|idx| {
            vec![
                "ST8000NM0055".to_string(),
                if idx == 0 { "1" } else { "0" }.to_string(),
                (idx % 4).to_string(),
                (500 + idx).to_string(),
            ]
        })
        .collect();
    write_csv(
        &smartprep::daily_file_path(data.path(), date(2024, 6, 2)),
        &["model", "failure", "smart_5_raw", "smart_9_raw"],
        &rows,
    );
    let cfg = config(data.path(), artifacts.path(), date(2024, 6, 1), date(2024, 6, 2));

    let output = run_pipeline(&cfg).expect("pipeline should succeed");

    match &output.report.files[1].outcome {
        FileOutcome::Degraded {
            missing_keys,
            absorbed,
        } => {
            assert_eq!(missing_keys, &vec!["date".to_string(), "serial_number".to_string()]);
            assert!(matches!(
                absorbed,
                AbsorbOutcome::Absorbed { positives: 1, .. }
            ));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(output.report.degraded(), 1);
    assert_eq!(output.table.count_label(1).expect("label counts"), 2);
    assert!(!output
        .table
        .feature_names()
        .iter()
        .any(|name| name == "model" || name == "date"));
}

#[test]
fn malformed_file_fails_alone_and_run_continues() {
    let data = tempdir().expect("tempdir should be created");
    let artifacts = tempdir().expect("tempdir should be created");
    let mut rows = common::smart_rows(date(2024, 7, 1), 10, &[0]);
    for row in &mut rows {
        row[0] = "first of july".to_string();
    }
    write_csv(
        &smartprep::daily_file_path(data.path(), date(2024, 7, 1)),
        &common::HEADER,
        &rows,
    );
    write_smart_day(data.path(), date(2024, 7, 2), 40, &[1]);
    let cfg = config(data.path(), artifacts.path(), date(2024, 7, 1), date(2024, 7, 2));

    let output = run_pipeline(&cfg).expect("one bad file must not abort the run");

    assert!(matches!(
        output.report.files[0].outcome,
        FileOutcome::Failed { .. }
    ));
    assert!(matches!(
        output.report.files[1].outcome,
        FileOutcome::Processed { positives: 1, .. }
    ));
    assert_eq!(output.report.failed(), 1);
    assert_eq!(output.table.count_label(1).expect("label counts"), 1);
}

#[test]
fn empty_window_is_reported_as_no_files_found() {
    let data = tempdir().expect("tempdir should be created");
    let artifacts = tempdir().expect("tempdir should be created");
    write_smart_day(data.path(), date(2024, 8, 10), 10, &[0]);
    let cfg = config(data.path(), artifacts.path(), date(2024, 8, 1), date(2024, 8, 5));

    match run_pipeline(&cfg) {
        Err(PipelineError::NoFilesFound { start, end, .. }) => {
            assert_eq!(start, date(2024, 8, 1));
            assert_eq!(end, date(2024, 8, 5));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("empty window must not succeed"),
    }
    assert!(!cfg.checkpoint_path.exists());
    assert!(!cfg.feature_map_path.exists());
}

#[test]
fn corpus_without_labels_retains_nothing() {
    let data = tempdir().expect("tempdir should be created");
    let artifacts = tempdir().expect("tempdir should be created");
    write_unlabeled_day(data.path(), date(2024, 9, 1), 25);
    write_unlabeled_day(data.path(), date(2024, 9, 2), 25);
    let cfg = config(data.path(), artifacts.path(), date(2024, 9, 1), date(2024, 9, 2));

    match run_pipeline(&cfg) {
        Err(PipelineError::NothingRetained { files }) => assert_eq!(files, 2),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unlabeled corpus must not succeed"),
    }
    assert!(!cfg.checkpoint_path.exists());
}

#[test]
fn negative_only_days_retain_nothing() {
    let data = tempdir().expect("tempdir should be created");
    let artifacts = tempdir().expect("tempdir should be created");
    write_smart_day(data.path(), date(2024, 10, 1), 100, &[]);
    let cfg = config(data.path(), artifacts.path(), date(2024, 10, 1), date(2024, 10, 1));

    match build_dataset(&cfg) {
        Err(PipelineError::NothingRetained { files }) => assert_eq!(files, 1),
        Err(other) => panic!("unexpected error: {other}"),
        Ok((table, _)) => panic!("negative-only day kept {} rows", table.height()),
    }
}

#[test]
fn clean_negative_only_chunk_is_skipped_by_accumulator() {
    let data = tempdir().expect("tempdir should be created");
    let path = write_smart_day(data.path(), date(2024, 10, 2), 30, &[]);
    let schema = ChunkSchema::default();

    let raw = load_chunk(&path, &schema).expect("fixture should load");
    let clean = match preprocess_chunk(raw, &schema).expect("fixture should clean") {
        Preprocessed::Clean(frame) => frame,
        Preprocessed::Degraded { .. } => panic!("keys are present"),
    };
    assert!(clean.column("failure").is_err());

    let mut accumulator = StratifiedAccumulator::new(
        "failure",
        SamplingConfig {
            negative_fraction: 0.5,
            seed: 42,
        },
    );
    let outcome = accumulator.absorb(&clean).expect("absorb should not fail");

    assert_eq!(
        outcome,
        AbsorbOutcome::Skipped(SkipReason::MissingLabel {
            label_column: "failure".to_string()
        })
    );
    assert!(accumulator.is_empty());
}

#[test]
fn single_class_table_is_checkpointed_but_refused_for_training() {
    let data = tempdir().expect("tempdir should be created");
    let artifacts = tempdir().expect("tempdir should be created");
    // 8 negatives at 5% round to zero kept rows, leaving only failures.
    write_smart_day(data.path(), date(2024, 10, 3), 10, &[0, 1]);
    let cfg = config(data.path(), artifacts.path(), date(2024, 10, 3), date(2024, 10, 3));

    match run_to_handoff(&cfg) {
        Err(PipelineError::Handoff(HandoffError::SingleClass { classes, .. })) => {
            assert_eq!(classes, vec![(1, 2)]);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("single-class table must not reach training"),
    }
    assert!(cfg.checkpoint_path.is_file());
    assert!(cfg.feature_map_path.is_file());
}

#[test]
fn invalid_configuration_is_rejected_before_any_io() {
    let data = tempdir().expect("tempdir should be created");
    let artifacts = tempdir().expect("tempdir should be created");
    let mut cfg = config(data.path(), artifacts.path(), date(2024, 1, 2), date(2024, 1, 1));

    assert!(matches!(
        run_pipeline(&cfg),
        Err(PipelineError::Config(_))
    ));

    cfg.end_date = date(2024, 1, 3);
    cfg.sampling_fraction = 0.0;
    assert!(matches!(
        run_pipeline(&cfg),
        Err(PipelineError::Config(_))
    ));
}
