use smartprep::{
    init_logging, logging_config_from_env, pipeline_config_from_env, CheckpointStore, FeatureMap,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&logging_config_from_env())?;
    let cfg = pipeline_config_from_env()?;

    let store = CheckpointStore::new(&cfg.checkpoint_path);
    let Some(table) = store.load(&cfg.schema.label_column)? else {
        return Err(format!(
            "no checkpoint at {}; run prepare_dataset first",
            cfg.checkpoint_path.display()
        )
        .into());
    };
    let receipt = store.fingerprint()?;

    println!(
        "Checkpoint {} | {} bytes | sha256={}",
        receipt.path.display(),
        receipt.bytes,
        receipt.sha256
    );
    println!(
        "Shape: {} rows x {} columns (label '{}')",
        table.height(),
        table.frame().width(),
        table.label_column()
    );
    for (label, count) in table.class_counts()? {
        println!("  label {label}: {count}");
    }

    if cfg.feature_map_path.is_file() {
        let map = FeatureMap::load(&cfg.feature_map_path)?;
        let matches = map.originals() == table.feature_names().as_slice();
        println!(
            "Feature map {} | {} entries | matches checkpoint columns: {}",
            cfg.feature_map_path.display(),
            map.len(),
            matches
        );
        for (original, synthetic) in map.iter() {
            println!("  {synthetic:>5} <- {original}");
        }
    } else {
        println!(
            "No feature map at {}",
            cfg.feature_map_path.display()
        );
    }

    Ok(())
}
