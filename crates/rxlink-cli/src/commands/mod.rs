pub mod classes;
pub mod reconcile;

use std::path::{Path, PathBuf};

use anyhow::Context;
use rxlink_core::equiv::EquivalenceClasses;
use rxlink_core::ingest::load_orange_book_dir;
use rxlink_core::{EquivalenceBuilder, Normalizer, ObProductRecord, ReconcileConfig};

pub fn load_config(path: Option<PathBuf>) -> anyhow::Result<ReconcileConfig> {
    match path {
        None => Ok(ReconcileConfig::default()),
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ReconcileConfig::from_json(&text)
                .with_context(|| format!("parsing config {}", path.display()))
        }
    }
}

pub fn build_classes(
    config: &ReconcileConfig,
    records: &[ObProductRecord],
) -> anyhow::Result<EquivalenceClasses> {
    let normalizer = Normalizer::new(config);
    let mut builder = EquivalenceBuilder::new(config);
    for record in records {
        builder.observe(&record.product_key(), &normalizer.normalize_product(record));
    }
    Ok(builder.build()?)
}

pub fn load_orange_book(dir: &Path) -> anyhow::Result<Vec<ObProductRecord>> {
    load_orange_book_dir(dir).with_context(|| format!("loading Orange Book from {}", dir.display()))
}

pub fn emit_json(value: &impl serde::Serialize, out: Option<PathBuf>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
