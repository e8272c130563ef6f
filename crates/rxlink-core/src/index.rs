//! Formulation index: (application number, product number) -> class id.
//!
//! Built once per analysis run and treated as read-only afterwards, so
//! matching can fan out across workers without coordination.

use std::collections::HashMap;

use tracing::warn;

use crate::equiv::EquivalenceClasses;
use crate::models::{ClassId, ObProductRecord, ProductKey};
use crate::normalize::Normalizer;

/// Immutable lookup from product identity to equivalence class.
#[derive(Debug, Clone, Default)]
pub struct FormulationIndex {
    map: HashMap<ProductKey, ClassId>,
}

/// Index build output. Gaps are products whose formulation text never
/// appeared among the indexed editions; they signal a data-loading problem
/// and must be surfaced, never silently assigned a fresh class.
#[derive(Debug)]
pub struct IndexBuild {
    pub index: FormulationIndex,
    pub gaps: Vec<ProductKey>,
}

impl FormulationIndex {
    /// Map every product's formulation text through the normalizer and the
    /// class partition. Products are processed in input order; the first
    /// classable key wins for a product that appears in several editions.
    pub fn build(
        records: &[ObProductRecord],
        normalizer: &Normalizer<'_>,
        classes: &EquivalenceClasses,
    ) -> IndexBuild {
        let mut map: HashMap<ProductKey, ClassId> = HashMap::new();
        let mut gaps: Vec<ProductKey> = Vec::new();

        for record in records {
            let product = record.product_key();
            if map.contains_key(&product) {
                continue;
            }
            let nf = normalizer.normalize_product(record);
            match classes.class_of(&nf.key) {
                Some(class_id) => {
                    map.insert(product, class_id);
                }
                None => {
                    if !gaps.contains(&product) {
                        warn!(product = %product, key = %nf.key, "formulation not in index");
                        gaps.push(product);
                    }
                }
            }
        }

        IndexBuild {
            index: Self { map },
            gaps,
        }
    }

    /// Class for an application/product pair; `None` means the product was
    /// absent from every indexed edition.
    pub fn lookup(&self, appl_no: &str, product_no: &str) -> Option<ClassId> {
        self.map
            .get(&ProductKey::new(appl_no, product_no))
            .copied()
    }

    pub fn class_for(&self, product: &ProductKey) -> Option<ClassId> {
        self.map.get(product).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
