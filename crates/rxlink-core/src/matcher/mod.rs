//! Cross-dataset matcher: pricing records against Orange Book products.
//!
//! Tiered search, each tier attempted only while the previous one yields
//! zero or multiple candidates:
//!
//! 1. structured application-number match (rare, highest confidence),
//! 2. normalized formulation-key equality plus dose-form disambiguation,
//! 3. fuzzy text scoring above the configured threshold.
//!
//! The matcher holds only shared references to run-scoped immutable state,
//! so independent records may be matched from any number of workers.

mod scoring;

pub use scoring::*;

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::config::ReconcileConfig;
use crate::equiv::EquivalenceClasses;
use crate::index::FormulationIndex;
use crate::models::{
    ClassId, MatchOutcome, MatchTier, NoMatchReason, NormalizedFormulation, ObProductRecord,
    PricingRecord, ProductKey, ScoredCandidate,
};
use crate::normalize::Normalizer;

/// One matchable Orange Book product with its precomputed match attributes.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub product: ProductKey,
    pub class_id: ClassId,
    pub description: String,
    desc_folded: String,
    form_words: BTreeSet<String>,
    route_words: BTreeSet<String>,
}

/// Read-only catalog of indexed products, with application-number and
/// class lookups. Entry order follows input order, which keeps candidate
/// enumeration deterministic.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    entries: Vec<CatalogEntry>,
    by_appl_no: HashMap<String, Vec<usize>>,
    by_class: HashMap<ClassId, Vec<usize>>,
}

impl ProductCatalog {
    /// Build from product records; products absent from the index (gaps)
    /// are excluded here and surfaced by the index build instead.
    pub fn build(
        records: &[ObProductRecord],
        normalizer: &Normalizer<'_>,
        index: &FormulationIndex,
    ) -> Self {
        let mut catalog = Self::default();
        let mut seen: HashMap<ProductKey, usize> = HashMap::new();

        for record in records {
            let product = record.product_key();
            if seen.contains_key(&product) {
                continue;
            }
            let Some(class_id) = index.class_for(&product) else {
                continue;
            };
            let (form_text, route_text) = match record.df_route.split_once(';') {
                Some((f, r)) => (f, r),
                None => ("", record.df_route.as_str()),
            };
            let nf = normalizer.normalize_product(record);
            let form_words = normalizer.route_words(form_text);
            // The scoring text shares the canonical key rendering with the
            // pricing side, so same-formulation candidates differ only by
            // their trade-name text.
            let desc_folded = fold_text(&format!(
                "{} {} {}",
                record.trade_name,
                nf.key,
                form_words.iter().cloned().collect::<Vec<_>>().join(" ")
            ));
            let entry = CatalogEntry {
                product: product.clone(),
                class_id,
                desc_folded,
                description: record.description(),
                form_words,
                route_words: normalizer.route_words(route_text),
            };
            let idx = catalog.entries.len();
            seen.insert(product, idx);
            catalog
                .by_appl_no
                .entry(appl_key(&record.appl_no).to_string())
                .or_default()
                .push(idx);
            catalog.by_class.entry(class_id).or_default().push(idx);
            catalog.entries.push(entry);
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    fn ids_for_appl_no(&self, appl_no: &str) -> Option<&[usize]> {
        self.by_appl_no.get(appl_key(appl_no)).map(Vec::as_slice)
    }

    fn ids_for_class(&self, class_id: ClassId) -> &[usize] {
        self.by_class
            .get(&class_id)
            .map_or(&[], Vec::as_slice)
    }
}

/// Application numbers are compared without leading zeros: the Orange Book
/// zero-pads where the NDC directory does not.
fn appl_key(appl_no: &str) -> &str {
    let trimmed = appl_no.trim_start_matches('0');
    if trimmed.is_empty() && !appl_no.is_empty() {
        // All zeros: one canonical spelling regardless of width.
        "0"
    } else {
        trimmed
    }
}

/// Deterministic matcher over run-scoped immutable state.
pub struct Matcher<'a> {
    config: &'a ReconcileConfig,
    normalizer: Normalizer<'a>,
    classes: &'a EquivalenceClasses,
    catalog: &'a ProductCatalog,
}

impl<'a> Matcher<'a> {
    pub fn new(
        config: &'a ReconcileConfig,
        classes: &'a EquivalenceClasses,
        catalog: &'a ProductCatalog,
    ) -> Self {
        Self {
            config,
            normalizer: Normalizer::new(config),
            classes,
            catalog,
        }
    }

    /// Match one pricing record. Identical inputs over identical state
    /// always produce an identical outcome, including candidate order.
    pub fn match_record(&self, record: &PricingRecord) -> MatchOutcome {
        let nf = self.normalizer.normalize_pricing(record);
        let pricing_class = self.classes.class_of(&nf.key);

        // Tier 1: the record embeds an application number.
        let mut pool: Option<Vec<usize>> = None;
        if !record.appl_no.is_empty() {
            if let Some(ids) = self.catalog.ids_for_appl_no(&record.appl_no) {
                let verified: Vec<usize> = ids
                    .iter()
                    .copied()
                    .filter(|&i| self.formulation_compatible(i, &nf, pricing_class))
                    .collect();
                if verified.len() == 1 {
                    return self.confirm(verified[0], 1.0, MatchTier::StructuredCode);
                }
                pool = Some(if verified.is_empty() {
                    ids.to_vec()
                } else {
                    verified
                });
            }
        }

        // Tier 2: exact normalized-key equality, disambiguated by dose form.
        if let Some(class_id) = pricing_class {
            let class_ids = self.catalog.ids_for_class(class_id);
            let scoped: Vec<usize> = match &pool {
                Some(p) => class_ids.iter().copied().filter(|i| p.contains(i)).collect(),
                None => class_ids.to_vec(),
            };
            let base = if scoped.is_empty() {
                class_ids.to_vec()
            } else {
                scoped
            };
            let form_filtered: Vec<usize> = base
                .iter()
                .copied()
                .filter(|&i| self.dose_form_compatible(i, &nf))
                .collect();
            if form_filtered.is_empty() {
                // Same formulation but no compatible dose form: never a
                // full-confidence confirmation. The class pool still
                // narrows the fuzzy tier.
                pool = Some(base);
            } else {
                if form_filtered.len() == 1 {
                    return self.confirm(form_filtered[0], 1.0, MatchTier::NormalizedText);
                }
                pool = Some(form_filtered);
            }
        }

        // Tier 3: fuzzy text scoring over the narrowest pool available.
        let pool = pool.unwrap_or_else(|| (0..self.catalog.len()).collect());
        let form_text = nf
            .dose_form
            .clone()
            .unwrap_or_default();
        let query = fold_text(&format!("{} {} {}", record.description, nf.key, form_text));
        let mut scored: Vec<ScoredCandidate> = pool
            .into_iter()
            .map(|i| {
                let entry = &self.catalog.entries[i];
                ScoredCandidate {
                    product: entry.product.clone(),
                    class_id: entry.class_id,
                    description: entry.description.clone(),
                    score: fuzzy_match(&query, &entry.desc_folded),
                }
            })
            .filter(|c| c.score >= self.config.fuzzy_threshold)
            .collect();

        // Descending score; ties broken by product key for stability.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.product.cmp(&b.product))
        });

        match scored.len() {
            0 => {
                let reason = if pricing_class.is_none() {
                    NoMatchReason::IndexGap
                } else {
                    NoMatchReason::NoManufacturerMatch
                };
                MatchOutcome::NoMatch { reason }
            }
            1 => {
                let candidate = scored.remove(0);
                debug!(
                    ndc = %record.ndc,
                    product = %candidate.product,
                    score = candidate.score,
                    "confirmed at reduced confidence via fuzzy tier"
                );
                MatchOutcome::Confirmed {
                    candidate,
                    tier: MatchTier::FuzzyText,
                }
            }
            _ => {
                scored.truncate(self.config.max_candidates);
                MatchOutcome::Ambiguous { candidates: scored }
            }
        }
    }

    /// Match records in input order, feeding diagnostics.
    pub fn match_all(
        &self,
        records: &[PricingRecord],
        diagnostics: &mut crate::diagnostics::MatchDiagnostics,
    ) -> Vec<MatchOutcome> {
        records
            .iter()
            .map(|rec| {
                let outcome = self.match_record(rec);
                diagnostics.record(rec, &outcome);
                outcome
            })
            .collect()
    }

    fn confirm(&self, idx: usize, score: f64, tier: MatchTier) -> MatchOutcome {
        let entry = &self.catalog.entries[idx];
        MatchOutcome::Confirmed {
            candidate: ScoredCandidate {
                product: entry.product.clone(),
                class_id: entry.class_id,
                description: entry.description.clone(),
                score,
            },
            tier,
        }
    }

    /// Whether a catalog product's formulation is equivalent to the pricing
    /// record's: same class by exact key, or any class member key passing
    /// the composition/form heuristics.
    fn formulation_compatible(
        &self,
        idx: usize,
        nf: &NormalizedFormulation,
        pricing_class: Option<ClassId>,
    ) -> bool {
        let entry = &self.catalog.entries[idx];
        if pricing_class == Some(entry.class_id) {
            return true;
        }
        if !self.dose_form_compatible(idx, nf) {
            return false;
        }
        self.classes
            .class(entry.class_id)
            .keys
            .iter()
            .any(|key| composition_equivalent(key, &nf.key, &nf.strengths, self.config))
    }

    fn dose_form_compatible(&self, idx: usize, nf: &NormalizedFormulation) -> bool {
        let entry = &self.catalog.entries[idx];
        let pricing_form: BTreeSet<String> = nf
            .dose_form
            .as_deref()
            .map(|f| f.split(' ').map(String::from).collect())
            .unwrap_or_default();
        let pricing_route: BTreeSet<String> =
            nf.key.route.split(' ').map(String::from).collect();
        form_route_compatible(
            &entry.form_words,
            &entry.route_words,
            &pricing_form,
            &pricing_route,
        )
    }
}
