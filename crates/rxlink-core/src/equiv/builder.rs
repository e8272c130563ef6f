//! Equivalence-class construction over normalized formulation keys.
//!
//! The FDA is not consistent in identifying drug formulations across Orange
//! Book editions: the same formulation appears with reordered ingredients,
//! respelled units, or slightly rewritten strength text. Three facts drive
//! the grouping:
//!
//! - keys that normalize to the same text denote the same formulation;
//! - an (application, product) pair is stable across editions, so two
//!   different keys observed for the same product are the same formulation;
//! - keys with equal ingredients (under the synonym table), equal routes,
//!   and strengths within the configured tolerance are the same formulation.
//!
//! All three are unions in a single disjoint-set forest, so equivalence
//! propagates transitively through chains of partial matches. Unions are
//! monotonic within a run; every non-exact union is recorded for audit.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ReconcileConfig;
use crate::models::{ClassId, FormulationKey, NormalizedFormulation, ParsedStrength, ProductKey};

use super::UnionFind;

/// Builder errors.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("no formulation keys observed; nothing to index")]
    EmptyCorpus,
}

/// Why two keys were unioned without being textually equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnionReason {
    /// Both keys were observed for the same (application, product) pair
    SharedProduct { product: ProductKey },
    /// Ingredients and route matched and strengths fell within tolerance
    StrengthTolerance,
}

/// Audit record of one non-exact union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionAudit {
    pub left: FormulationKey,
    pub right: FormulationKey,
    pub reason: UnionReason,
}

/// One final equivalence class: every key and product judged to denote a
/// single true formulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceClass {
    pub id: ClassId,
    /// Member keys in first-seen order
    pub keys: Vec<FormulationKey>,
    /// Products observed with any member key, in first-seen order
    pub products: Vec<ProductKey>,
}

impl EquivalenceClass {
    /// A representative key for user-facing display.
    pub fn display_key(&self) -> &FormulationKey {
        &self.keys[0]
    }
}

/// Completed partition of the observed key space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquivalenceClasses {
    classes: Vec<EquivalenceClass>,
    #[serde(skip)]
    key_to_class: HashMap<FormulationKey, ClassId>,
    audit: Vec<UnionAudit>,
}

impl EquivalenceClasses {
    pub fn class_of(&self, key: &FormulationKey) -> Option<ClassId> {
        self.key_to_class.get(key).copied()
    }

    pub fn class(&self, id: ClassId) -> &EquivalenceClass {
        &self.classes[id.0 as usize]
    }

    pub fn classes(&self) -> &[EquivalenceClass] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Non-exact unions applied during the build, for manual audit.
    pub fn audit(&self) -> &[UnionAudit] {
        &self.audit
    }

    /// Rebuild the key lookup after deserializing a persisted summary.
    pub fn reindex(&mut self) {
        self.key_to_class = self
            .classes
            .iter()
            .flat_map(|c| c.keys.iter().map(move |k| (k.clone(), c.id)))
            .collect();
    }
}

struct KeyEntry {
    key: FormulationKey,
    strengths: Vec<Option<ParsedStrength>>,
    low_confidence: bool,
}

/// Accumulates observations across editions, then partitions.
pub struct EquivalenceBuilder<'a> {
    config: &'a ReconcileConfig,
    entries: Vec<KeyEntry>,
    interner: HashMap<FormulationKey, usize>,
    dsu: UnionFind,
    /// product -> key index it was last observed with
    product_keys: HashMap<ProductKey, usize>,
    /// products in first-seen order, each with its first key index
    products: Vec<(ProductKey, usize)>,
    audit: Vec<UnionAudit>,
}

impl<'a> EquivalenceBuilder<'a> {
    pub fn new(config: &'a ReconcileConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            interner: HashMap::new(),
            dsu: UnionFind::new(),
            product_keys: HashMap::new(),
            products: Vec::new(),
            audit: Vec::new(),
        }
    }

    /// Observe a product's normalized formulation from one edition. When a
    /// product was previously seen with a different key, the two keys are
    /// unioned: application/product pairs are stable across editions.
    pub fn observe(&mut self, product: &ProductKey, nf: &NormalizedFormulation) {
        let id = self.intern(nf);
        match self.product_keys.get(product).copied() {
            None => {
                self.product_keys.insert(product.clone(), id);
                self.products.push((product.clone(), id));
            }
            Some(prev) if prev == id => {}
            Some(prev) => {
                if self.dsu.union(prev, id) {
                    debug!(
                        product = %product,
                        left = %self.entries[prev].key,
                        right = %self.entries[id].key,
                        "union via shared product"
                    );
                    self.audit.push(UnionAudit {
                        left: self.entries[prev].key.clone(),
                        right: self.entries[id].key.clone(),
                        reason: UnionReason::SharedProduct {
                            product: product.clone(),
                        },
                    });
                }
                self.product_keys.insert(product.clone(), id);
            }
        }
    }

    /// Finish: apply the secondary strength-tolerance heuristic, then assign
    /// class identifiers in first-seen key order.
    pub fn build(mut self) -> Result<EquivalenceClasses, BuildError> {
        if self.entries.is_empty() {
            return Err(BuildError::EmptyCorpus);
        }

        self.apply_strength_tolerance();

        // Deterministic id assignment: walk keys in insertion order and give
        // each new root the next id.
        let mut root_to_class: HashMap<usize, ClassId> = HashMap::new();
        let mut classes: Vec<EquivalenceClass> = Vec::new();
        let mut key_to_class: HashMap<FormulationKey, ClassId> = HashMap::new();

        for idx in 0..self.entries.len() {
            let root = self.dsu.find(idx);
            let class_id = *root_to_class.entry(root).or_insert_with(|| {
                let id = ClassId(classes.len() as u32);
                classes.push(EquivalenceClass {
                    id,
                    keys: Vec::new(),
                    products: Vec::new(),
                });
                id
            });
            classes[class_id.0 as usize]
                .keys
                .push(self.entries[idx].key.clone());
            key_to_class.insert(self.entries[idx].key.clone(), class_id);
        }

        for (product, key_idx) in &self.products {
            let root = self.dsu.find(*key_idx);
            let class_id = root_to_class[&root];
            classes[class_id.0 as usize].products.push(product.clone());
        }

        info!(
            keys = self.entries.len(),
            classes = classes.len(),
            non_exact_unions = self.audit.len(),
            "equivalence classes built"
        );

        Ok(EquivalenceClasses {
            classes,
            key_to_class,
            audit: self.audit,
        })
    }

    fn intern(&mut self, nf: &NormalizedFormulation) -> usize {
        if let Some(&id) = self.interner.get(&nf.key) {
            return id;
        }
        let id = self.dsu.push();
        self.interner.insert(nf.key.clone(), id);
        self.entries.push(KeyEntry {
            key: nf.key.clone(),
            strengths: nf.strengths.clone(),
            low_confidence: nf.low_confidence,
        });
        id
    }

    /// Union keys with equal routes, equal ingredient multisets under the
    /// synonym table, and strengths within the configured tolerance. Keys
    /// are blocked by (route, folded ingredient names) so comparison is
    /// per-bucket rather than all-pairs; transitivity still propagates
    /// through the forest.
    fn apply_strength_tolerance(&mut self) {
        let mut buckets: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            // Low-confidence keys are excluded: the heuristic must stay
            // conservative on malformed text.
            if entry.low_confidence {
                continue;
            }
            let mut names: Vec<&str> = entry
                .key
                .ingredient_names()
                .map(|n| self.config.fold_ingredient(n))
                .collect();
            names.sort_unstable();
            buckets
                .entry((entry.key.route.clone(), names.join(";")))
                .or_default()
                .push(idx);
        }

        let mut unions: Vec<(usize, usize)> = Vec::new();
        for ids in buckets.values() {
            for (pos, &a) in ids.iter().enumerate() {
                for &b in &ids[pos + 1..] {
                    if self.tolerance_equivalent(a, b) {
                        unions.push((a, b));
                    }
                }
            }
        }

        for (a, b) in unions {
            if self.dsu.union(a, b) {
                debug!(
                    left = %self.entries[a].key,
                    right = %self.entries[b].key,
                    "union via strength tolerance"
                );
                self.audit.push(UnionAudit {
                    left: self.entries[a].key.clone(),
                    right: self.entries[b].key.clone(),
                    reason: UnionReason::StrengthTolerance,
                });
            }
        }
    }

    /// Component-wise equivalence of two interned keys with equal routes
    /// and folded ingredient names: every strength pair must be textually
    /// equal or numerically within tolerance in the same unit.
    fn tolerance_equivalent(&self, a: usize, b: usize) -> bool {
        let (ea, eb) = (&self.entries[a], &self.entries[b]);
        if ea.key.components.len() != eb.key.components.len() {
            return false;
        }
        let order = |entry: &KeyEntry| {
            let mut idxs: Vec<usize> = (0..entry.key.components.len()).collect();
            idxs.sort_by_key(|&i| {
                (
                    self.config
                        .fold_ingredient(&entry.key.components[i].ingredient)
                        .to_string(),
                    entry.key.components[i].strength.clone(),
                )
            });
            idxs
        };
        let (ia, ib) = (order(ea), order(eb));
        ia.iter().zip(ib.iter()).all(|(&i, &j)| {
            let (ca, cb) = (&ea.key.components[i], &eb.key.components[j]);
            if self.config.fold_ingredient(&ca.ingredient)
                != self.config.fold_ingredient(&cb.ingredient)
            {
                return false;
            }
            if ca.strength == cb.strength {
                return true;
            }
            match (&ea.strengths[i], &eb.strengths[j]) {
                (Some(sa), Some(sb)) if sa.unit == sb.unit => {
                    relatively_close(sa.quantity, sb.quantity, self.config.strength_rel_tol)
                }
                _ => false,
            }
        })
    }
}

fn relatively_close(a: f64, b: f64, rel_tol: f64) -> bool {
    (a - b).abs() <= rel_tol * a.abs().max(b.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Normalizer;

    fn build_from(
        config: &ReconcileConfig,
        rows: &[(&str, &str, &str, &str, &str)],
    ) -> EquivalenceClasses {
        let normalizer = Normalizer::new(config);
        let mut builder = EquivalenceBuilder::new(config);
        for (appl, prod, ing, strength, route) in rows {
            let nf = normalizer.normalize(ing, strength, route);
            builder.observe(&ProductKey::new(*appl, *prod), &nf);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_empty_corpus_fails() {
        let config = ReconcileConfig::default();
        let builder = EquivalenceBuilder::new(&config);
        assert!(matches!(builder.build(), Err(BuildError::EmptyCorpus)));
    }

    #[test]
    fn test_exact_equality_unions_across_editions() {
        let config = ReconcileConfig::default();
        let classes = build_from(
            &config,
            &[
                ("050542", "001", "Amoxicillin", "500MG", "CAPSULE;ORAL"),
                ("050542", "001", "AMOXICILLIN", "500 mg", "CAPSULE;ORAL"),
                ("060000", "001", "AMOXICILLIN", "250MG", "CAPSULE;ORAL"),
            ],
        );
        // 500MG variants collapse by exact normalized equality; 250MG stays
        // its own class.
        assert_eq!(classes.len(), 2);
    }

    #[test]
    fn test_shared_product_bridges_respellings() {
        let config = ReconcileConfig::default();
        let classes = build_from(
            &config,
            &[
                // Edition 1 spells the strength per 2mL; edition 2 per mL.
                (
                    "210000",
                    "001",
                    "DEXMEDETOMIDINE HYDROCHLORIDE",
                    "EQ 200MCG BASE/2ML",
                    "INJECTABLE;INJECTION",
                ),
                (
                    "210000",
                    "001",
                    "DEXMEDETOMIDINE HYDROCHLORIDE",
                    "EQ 100MCG BASE/ML",
                    "INJECTABLE;INJECTION",
                ),
            ],
        );
        assert_eq!(classes.len(), 1);
        assert_eq!(classes.classes()[0].keys.len(), 2);
        assert_eq!(classes.audit().len(), 1);
        assert!(matches!(
            classes.audit()[0].reason,
            UnionReason::SharedProduct { .. }
        ));
    }

    #[test]
    fn test_transitivity_through_shared_products() {
        let config = ReconcileConfig::default();
        // Key A ~ key B via product 1; key B ~ key C via product 2. A and C
        // never co-occur but must land in one class.
        let classes = build_from(
            &config,
            &[
                ("100001", "001", "DRUGX", "SPELLING A", "TABLET;ORAL"),
                ("100001", "001", "DRUGX", "SPELLING B", "TABLET;ORAL"),
                ("100002", "001", "DRUGX", "SPELLING B", "TABLET;ORAL"),
                ("100002", "001", "DRUGX", "SPELLING C", "TABLET;ORAL"),
            ],
        );
        assert_eq!(classes.len(), 1);
        assert_eq!(classes.classes()[0].keys.len(), 3);
        assert_eq!(classes.classes()[0].products.len(), 2);
    }

    #[test]
    fn test_strength_tolerance_heuristic() {
        let mut config = ReconcileConfig::default();
        config.strength_rel_tol = 1e-3;
        let classes = build_from(
            &config,
            &[
                // One edition rounds the per-base strength, the next does not.
                ("100001", "001", "LEVOTHYROXINE SODIUM", "112.5MCG", "TABLET;ORAL"),
                ("100002", "001", "LEVOTHYROXINE SODIUM", "112.6MCG", "TABLET;ORAL"),
            ],
        );
        // 0.1125MG vs 0.1126MG: same unit, within the 1e-3 tolerance.
        assert_eq!(classes.len(), 1);
        assert!(classes
            .audit()
            .iter()
            .any(|a| a.reason == UnionReason::StrengthTolerance));
    }

    #[test]
    fn test_distinct_strengths_stay_separate() {
        let config = ReconcileConfig::default();
        let classes = build_from(
            &config,
            &[
                ("100001", "001", "AMOXICILLIN", "250MG", "CAPSULE;ORAL"),
                ("100002", "001", "AMOXICILLIN", "500MG", "CAPSULE;ORAL"),
            ],
        );
        assert_eq!(classes.len(), 2);
        assert!(classes.audit().is_empty());
    }

    #[test]
    fn test_partition_invariant() {
        let config = ReconcileConfig::default();
        let classes = build_from(
            &config,
            &[
                ("100001", "001", "A", "1MG", "TABLET;ORAL"),
                ("100001", "001", "A", "1 mg", "TABLET;ORAL"),
                ("100002", "001", "B", "2MG", "TABLET;ORAL"),
                ("100003", "001", "C", "3MG", "SOLUTION;TOPICAL"),
            ],
        );
        let mut seen = std::collections::HashSet::new();
        for class in classes.classes() {
            for key in &class.keys {
                assert!(seen.insert(key.clone()), "key in two classes: {key}");
                assert_eq!(classes.class_of(key), Some(class.id));
            }
        }
    }

    #[test]
    fn test_idempotent_ids() {
        let config = ReconcileConfig::default();
        let rows = [
            ("100001", "001", "ZETA", "1MG", "TABLET;ORAL"),
            ("100002", "001", "ALPHA", "2MG", "TABLET;ORAL"),
            ("100003", "001", "ZETA", "1MG", "TABLET;ORAL"),
        ];
        let first = build_from(&config, &rows);
        let second = build_from(&config, &rows);
        assert_eq!(first.classes(), second.classes());
        // First-seen order: ZETA's key was observed first, so it holds EQ0.
        assert_eq!(
            first.classes()[0].keys[0].components[0].ingredient,
            "ZETA"
        );
    }

    #[test]
    fn test_display_key_is_first_observed_rendering() {
        let config = ReconcileConfig::default();
        let classes = build_from(
            &config,
            &[
                (
                    "210000",
                    "001",
                    "DEXMEDETOMIDINE HYDROCHLORIDE",
                    "EQ 200MCG BASE/2ML",
                    "INJECTABLE;INJECTION",
                ),
                (
                    "210000",
                    "001",
                    "DEXMEDETOMIDINE HYDROCHLORIDE",
                    "EQ 100MCG BASE/ML",
                    "INJECTABLE;INJECTION",
                ),
            ],
        );
        let class = &classes.classes()[0];
        assert_eq!(class.display_key(), &class.keys[0]);
        let rendered = class.display_key().to_string();
        assert!(rendered.contains("DEXMEDETOMIDINE"));
        assert!(rendered.contains("[INJECTION]"));
    }

    #[test]
    fn test_low_confidence_keys_skip_heuristic() {
        let mut config = ReconcileConfig::default();
        config.strength_rel_tol = 0.5; // would be permissive
        let classes = build_from(
            &config,
            &[
                ("100001", "001", "A; B; C", "1MG; 2MG", "TABLET;ORAL"),
                ("100002", "001", "A; B; C", "1MG; 3MG", "TABLET;ORAL"),
            ],
        );
        // Both rows are malformed (count mismatch); heuristic must not touch
        // them even with a loose tolerance.
        assert_eq!(classes.len(), 2);
    }

    #[test]
    fn test_serialized_roundtrip_reindex() {
        let config = ReconcileConfig::default();
        let classes = build_from(
            &config,
            &[("100001", "001", "AMOXICILLIN", "500MG", "CAPSULE;ORAL")],
        );
        let json = serde_json::to_string(&classes).unwrap();
        let mut reloaded: EquivalenceClasses = serde_json::from_str(&json).unwrap();
        reloaded.reindex();
        let key = &classes.classes()[0].keys[0];
        assert_eq!(reloaded.class_of(key), Some(ClassId(0)));
    }
}
