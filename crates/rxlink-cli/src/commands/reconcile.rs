use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

use rxlink_core::diagnostics::DiagnosticsSummary;
use rxlink_core::ingest::PricingLoader;
use rxlink_core::models::hipaa_ndc;
use rxlink_core::{
    FormulationIndex, MatchDiagnostics, MatchOutcome, Matcher, ProductCatalog, ProductKey,
};

use super::{build_classes, emit_json, load_config, load_orange_book};

#[derive(Serialize)]
struct MatchRow {
    ndc: String,
    /// 9-digit HIPAA rendering when the NDC is well formed
    hipaa_ndc: Option<String>,
    description: String,
    outcome: MatchOutcome,
}

#[derive(Serialize)]
struct ReconcileReport {
    matches: Vec<MatchRow>,
    /// Products present in the Orange Book but excluded from the index
    index_gaps: Vec<ProductKey>,
    diagnostics: DiagnosticsSummary,
}

pub fn run(
    ob_dir: &Path,
    ndc_dir: &Path,
    config: Option<PathBuf>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config(config)?;

    let ob_records = load_orange_book(ob_dir)?;
    let classes = build_classes(&config, &ob_records)?;

    let mut loader = PricingLoader::new();
    loader
        .load_dir(ndc_dir)
        .with_context(|| format!("loading NDC directory from {}", ndc_dir.display()))?;
    let pricing = loader.finish();

    let normalizer = rxlink_core::Normalizer::new(&config);
    let built = FormulationIndex::build(&ob_records, &normalizer, &classes);
    let catalog = ProductCatalog::build(&ob_records, &normalizer, &built.index);
    let matcher = Matcher::new(&config, &classes, &catalog);

    let mut diagnostics = MatchDiagnostics::new(config.sample_limit);
    let outcomes = matcher.match_all(&pricing, &mut diagnostics);

    let matches = pricing
        .into_iter()
        .zip(outcomes)
        .map(|(rec, outcome)| MatchRow {
            hipaa_ndc: hipaa_ndc(&rec.ndc),
            description: rec.display_text(),
            ndc: rec.ndc,
            outcome,
        })
        .collect();

    let report = ReconcileReport {
        matches,
        index_gaps: built.gaps,
        diagnostics: diagnostics.summary(),
    };

    tracing::info!(
        total = report.diagnostics.total,
        confirmed = report.diagnostics.confirmed,
        "reconciliation finished"
    );

    emit_json(&report, out)
}
