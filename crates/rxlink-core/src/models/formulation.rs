//! Formulation identity models.
//!
//! A [`FormulationKey`] is the canonical identity of an approved formulation:
//! the multiset of (ingredient, strength) pairs plus the administration route.
//! Ingredient ordering in the raw Orange Book text is not significant, so the
//! components are kept sorted by ingredient name.

use serde::{Deserialize, Serialize};

/// Identifier of a product within the Orange Book: an application number and
/// a product number within that application. Stable across editions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductKey {
    /// FDA application number (NDA/ANDA), alphabetic prefix stripped
    pub appl_no: String,
    /// Product number within the application
    pub product_no: String,
}

impl ProductKey {
    pub fn new(appl_no: impl Into<String>, product_no: impl Into<String>) -> Self {
        Self {
            appl_no: appl_no.into(),
            product_no: product_no.into(),
        }
    }
}

impl std::fmt::Display for ProductKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.appl_no, self.product_no)
    }
}

/// One active-ingredient component of a formulation, paired with its strength.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Component {
    /// Normalized ingredient base name (uppercase, whitespace collapsed)
    pub ingredient: String,
    /// Salt/form qualifier split off the ingredient name, if recognized
    pub qualifier: Option<String>,
    /// Canonical strength rendering (e.g. "500MG", "1.5MG/ML"), or the
    /// opaque normalized raw text when the strength was unparsable
    pub strength: String,
}

/// Canonical formulation identity. Equality and hashing are over the sorted
/// component list and the route only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FormulationKey {
    /// Components sorted by (ingredient, qualifier, strength)
    pub components: Vec<Component>,
    /// Canonical administration route (e.g. "ORAL", "INJECTION")
    pub route: String,
}

impl FormulationKey {
    /// Ingredient base names, in canonical (sorted) order.
    pub fn ingredient_names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|c| c.ingredient.as_str())
    }
}

impl std::fmt::Display for FormulationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{} {}", c.ingredient, c.strength)?;
        }
        write!(f, " [{}]", self.route)
    }
}

/// Strength value parsed out of a component's raw text, kept alongside the
/// canonical rendering so tolerance-based heuristics can compare quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedStrength {
    /// Quantity after unit-synonym conversion
    pub quantity: f64,
    /// Canonical unit (e.g. "MG", "MG/ML", "%")
    pub unit: String,
}

/// Normalizer output: the identity key plus the parse detail that does not
/// participate in identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFormulation {
    pub key: FormulationKey,
    /// Parsed strengths aligned with `key.components`; `None` where the raw
    /// strength text did not parse
    pub strengths: Vec<Option<ParsedStrength>>,
    /// Dose form split off the raw route text (e.g. "TABLET"), if present
    pub dose_form: Option<String>,
    /// Set when any part of the raw text was malformed and the key is a
    /// best-effort reconstruction
    pub low_confidence: bool,
}

/// Identifier of an equivalence class, allocated in first-seen key order
/// within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub u32);

impl std::fmt::Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EQ{}", self.0)
    }
}
