use smartprep::{
    init_logging, log_app_exit, log_app_start, logging_config_from_env, pipeline_config_from_env,
    run_to_handoff, AppExit, FileOutcome, PipelineError,
};

const APP: &str = "prepare_dataset";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    let cfg = pipeline_config_from_env()?;
    log_app_start(APP, &logging_cfg, &cfg);
    println!(
        "Preparing dataset from {} for {} .. {} (sampling_fraction={} seed={})",
        cfg.data_root.display(),
        cfg.start_date,
        cfg.end_date,
        cfg.sampling_fraction,
        cfg.seed
    );

    let (handoff, report) = match run_to_handoff(&cfg) {
        Ok(out) => out,
        Err(err) => {
            log_app_exit(APP, AppExit::Failed(&err));
            if matches!(err, PipelineError::Handoff(_)) {
                eprintln!("Dataset was built but cannot be used for training: {err}");
            }
            return Err(err.into());
        }
    };

    if report.checkpoint_hit {
        println!(
            "Loaded checkpoint {} (skipped all source files).",
            cfg.checkpoint_path.display()
        );
    } else {
        println!(
            "Files found={} processed={} degraded={} skipped={} failed={}",
            report.files_found,
            report.processed(),
            report.degraded(),
            report.skipped(),
            report.failed()
        );
        for file in &report.files {
            match &file.outcome {
                FileOutcome::Failed { error } => {
                    println!("  failed  {} | {}", file.path.display(), error)
                }
                FileOutcome::Skipped { reason } => {
                    println!("  skipped {} | {}", file.path.display(), reason.as_str())
                }
                FileOutcome::Degraded { missing_keys, .. } => println!(
                    "  degraded {} | missing {}",
                    file.path.display(),
                    missing_keys.join(",")
                ),
                FileOutcome::Processed { .. } => {}
            }
        }
        if let Some(receipt) = &report.checkpoint {
            println!(
                "Checkpoint saved to {} ({} bytes, sha256={})",
                receipt.path.display(),
                receipt.bytes,
                receipt.sha256
            );
        }
    }

    let (rows, features) = handoff.shape();
    println!("Final table shape: {rows} rows x {features} features");
    for (label, count) in &handoff.class_counts {
        println!("  label {label}: {count}");
    }
    println!(
        "Feature map ({} entries) written to {}",
        handoff.feature_map.len(),
        cfg.feature_map_path.display()
    );

    log_app_exit(APP, AppExit::Completed(&report));
    Ok(())
}
