use std::path::{Path, PathBuf};

use serde::Serialize;

use rxlink_core::equiv::UnionAudit;
use rxlink_core::models::{ClassId, FormulationKey, ProductKey};

use super::{build_classes, emit_json, load_config, load_orange_book};

#[derive(Serialize)]
struct ClassRow<'a> {
    id: ClassId,
    /// Representative key for quick reading; `keys` holds every rendering
    display_key: String,
    keys: &'a [FormulationKey],
    products: &'a [ProductKey],
}

#[derive(Serialize)]
struct ClassSummary<'a> {
    products: usize,
    classes: Vec<ClassRow<'a>>,
    non_exact_unions: &'a [UnionAudit],
}

pub fn run(ob_dir: &Path, config: Option<PathBuf>, out: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let records = load_orange_book(ob_dir)?;
    let classes = build_classes(&config, &records)?;

    tracing::info!(
        products = records.len(),
        classes = classes.len(),
        "equivalence summary ready"
    );

    let rows: Vec<ClassRow<'_>> = classes
        .classes()
        .iter()
        .map(|class| ClassRow {
            id: class.id,
            display_key: class.display_key().to_string(),
            keys: &class.keys,
            products: &class.products,
        })
        .collect();

    emit_json(
        &ClassSummary {
            products: records.len(),
            classes: rows,
            non_exact_unions: classes.audit(),
        },
        out,
    )
}
