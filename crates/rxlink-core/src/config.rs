//! Run-scoped reconciliation configuration.
//!
//! Unit synonyms, salt qualifiers, route words, and match thresholds are
//! data, not code: the defaults below are a starting table, and a JSON file
//! with the same shape can replace any of them without touching matching
//! logic.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A unit synonym entry: canonical unit plus the multiplier that converts a
/// quantity in the synonym unit into the canonical one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitMapping {
    pub canonical: String,
    pub multiplier: f64,
}

/// Static configuration for normalization, equivalence, and matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Unit synonyms: lowercase spelling -> canonical unit + multiplier
    pub unit_synonyms: BTreeMap<String, UnitMapping>,
    /// Route/dose-form word synonyms: uppercase word -> canonical word
    pub route_synonyms: BTreeMap<String, String>,
    /// Salt/form qualifiers that may be split off an ingredient name
    pub salt_qualifiers: BTreeSet<String>,
    /// Ingredient name synonyms: uppercase name -> canonical name
    pub ingredient_synonyms: BTreeMap<String, String>,
    /// Relative tolerance for judging two parsed strengths equal
    pub strength_rel_tol: f64,
    /// Minimum fuzzy similarity for a tier-3 candidate to qualify
    pub fuzzy_threshold: f64,
    /// Cap on candidates reported in an ambiguous outcome
    pub max_candidates: usize,
    /// Cap on per-reason record samples kept by diagnostics
    pub sample_limit: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            unit_synonyms: default_unit_synonyms(),
            route_synonyms: default_route_synonyms(),
            salt_qualifiers: default_salt_qualifiers(),
            ingredient_synonyms: BTreeMap::new(),
            strength_rel_tol: 1e-4,
            fuzzy_threshold: 0.8,
            max_candidates: 8,
            sample_limit: 25,
        }
    }
}

impl ReconcileConfig {
    /// Parse a configuration from JSON text. Missing fields fall back to
    /// the defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Canonical form of a route/dose-form word.
    pub fn fold_route_word<'a>(&'a self, word: &'a str) -> &'a str {
        self.route_synonyms.get(word).map_or(word, String::as_str)
    }

    /// Canonical form of an ingredient name.
    pub fn fold_ingredient<'a>(&'a self, name: &'a str) -> &'a str {
        self.ingredient_synonyms
            .get(name)
            .map_or(name, String::as_str)
    }
}

/// Default unit synonym table. Mass converges on MG, volume on ML;
/// per-volume and per-dose ratio units keep their shape.
fn default_unit_synonyms() -> BTreeMap<String, UnitMapping> {
    let mut map = BTreeMap::new();
    let mut add = |from: &str, to: &str, multiplier: f64| {
        map.insert(
            from.to_string(),
            UnitMapping {
                canonical: to.to_string(),
                multiplier,
            },
        );
    };

    // Mass
    add("mg", "MG", 1.0);
    add("milligram", "MG", 1.0);
    add("milligrams", "MG", 1.0);
    add("g", "MG", 1000.0);
    add("gm", "MG", 1000.0);
    add("gram", "MG", 1000.0);
    add("grams", "MG", 1000.0);
    add("mcg", "MG", 0.001);
    add("ug", "MG", 0.001);
    add("µg", "MG", 0.001);
    add("microgram", "MG", 0.001);
    add("micrograms", "MG", 0.001);
    add("kg", "MG", 1_000_000.0);

    // Volume
    add("ml", "ML", 1.0);
    add("cc", "ML", 1.0);
    add("l", "ML", 1000.0);
    add("liter", "ML", 1000.0);
    add("liters", "ML", 1000.0);

    // Mass per volume
    add("mg/ml", "MG/ML", 1.0);
    add("mcg/ml", "MG/ML", 0.001);
    add("ug/ml", "MG/ML", 0.001);
    add("g/ml", "MG/ML", 1000.0);
    add("gm/ml", "MG/ML", 1000.0);
    add("g/l", "MG/ML", 1.0);

    // Mass per discrete dose; "/1" is the NDC spelling of "per unit"
    add("mg/1", "MG", 1.0);
    add("g/1", "MG", 1000.0);
    add("ug/1", "MG", 0.001);
    add("mcg/1", "MG", 0.001);

    // Activity units
    add("unit", "UNITS", 1.0);
    add("units", "UNITS", 1.0);
    add("iu", "IU", 1.0);
    add("u/ml", "UNITS/ML", 1.0);
    add("units/ml", "UNITS/ML", 1.0);

    // Percentage concentrations
    add("%", "%", 1.0);
    add("percent", "%", 1.0);

    map
}

/// Default route/dose-form word synonyms, applied word-by-word when
/// comparing df;route texts across datasets.
fn default_route_synonyms() -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let mut add = |from: &str, to: &str| {
        map.insert(from.to_string(), to.to_string());
    };

    add("IV", "INJECTION");
    add("INTRAVENOUS", "INJECTION");
    add("INJECTABLE", "INJECTION");
    add("SC", "SUBCUTANEOUS");
    add("PELLETS", "PELLET");
    add("INHALANT", "INHALATION");
    add("CAPSULE", "TABLET");
    add("FILM", "PATCH");
    add("LIQUID", "SOLUTION");

    map
}

/// Salt/form qualifiers recognized at the end of an ingredient name. The
/// list is an allow-list: anything else stays part of the name, so that
/// splitting never destroys a distinguishing identity.
fn default_salt_qualifiers() -> BTreeSet<String> {
    [
        "HYDROCHLORIDE",
        "DIHYDROCHLORIDE",
        "SODIUM",
        "POTASSIUM",
        "CALCIUM",
        "MAGNESIUM",
        "SULFATE",
        "ACETATE",
        "TARTRATE",
        "BITARTRATE",
        "CITRATE",
        "MALEATE",
        "MESYLATE",
        "BESYLATE",
        "FUMARATE",
        "SUCCINATE",
        "PHOSPHATE",
        "NITRATE",
        "BROMIDE",
        "CHLORIDE",
        "MONOHYDRATE",
        "DIHYDRATE",
        "ANHYDROUS",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables_present() {
        let cfg = ReconcileConfig::default();
        assert_eq!(cfg.unit_synonyms["mg"].canonical, "MG");
        assert_eq!(cfg.unit_synonyms["mcg"].multiplier, 0.001);
        assert_eq!(cfg.fold_route_word("INJECTABLE"), "INJECTION");
        assert!(cfg.salt_qualifiers.contains("HYDROCHLORIDE"));
    }

    #[test]
    fn test_from_json_partial_override() {
        let cfg = ReconcileConfig::from_json(r#"{ "fuzzy_threshold": 0.9 }"#).unwrap();
        assert_eq!(cfg.fuzzy_threshold, 0.9);
        // Untouched fields keep their defaults
        assert_eq!(cfg.strength_rel_tol, 1e-4);
        assert_eq!(cfg.unit_synonyms["g"].multiplier, 1000.0);
    }

    #[test]
    fn test_fold_ingredient_passthrough() {
        let mut cfg = ReconcileConfig::default();
        assert_eq!(cfg.fold_ingredient("AMOXICILLIN"), "AMOXICILLIN");
        cfg.ingredient_synonyms
            .insert("PARACETAMOL".into(), "ACETAMINOPHEN".into());
        assert_eq!(cfg.fold_ingredient("PARACETAMOL"), "ACETAMINOPHEN");
    }
}
