//! Raw-text formulation normalizer.
//!
//! Turns the free-text ingredient/strength/route fields of a government
//! record into a canonical [`FormulationKey`]:
//!
//! - ingredient lists split on ";", case-folded, salt qualifiers separated
//! - strength lists parsed into (quantity, unit) with unit-synonym folding
//! - route words canonicalized via the configured synonym table
//! - (ingredient, strength) pairs sorted by ingredient name
//!
//! Raw government text is frequently malformed; normalization never fails.
//! Anything unparsable is carried as an opaque normalized string and the
//! result is flagged low-confidence.

use crate::config::ReconcileConfig;
use crate::models::{Component, FormulationKey, NormalizedFormulation, ParsedStrength};

/// Pure normalizer over a run-scoped configuration.
pub struct Normalizer<'a> {
    config: &'a ReconcileConfig,
}

impl<'a> Normalizer<'a> {
    pub fn new(config: &'a ReconcileConfig) -> Self {
        Self { config }
    }

    /// Normalize raw ingredient/strength/route text into a formulation key.
    ///
    /// The route text may be a combined "DOSEFORM;ROUTE" field (the Orange
    /// Book convention); the dose form is split off and does not participate
    /// in key identity.
    pub fn normalize(
        &self,
        ingredient_text: &str,
        strength_text: &str,
        route_text: &str,
    ) -> NormalizedFormulation {
        let mut low_confidence = false;

        let (dose_form, route) = self.split_df_route(route_text);

        let mut ingredients: Vec<String> = ingredient_text
            .split(';')
            .map(|s| collapse_ws(s).to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if ingredients.is_empty() {
            ingredients.push(String::new());
            low_confidence = true;
        }

        let (raw_strengths, strengths_low) = self.split_strengths(strength_text, ingredients.len());
        low_confidence |= strengths_low;

        // A single-ingredient record may still list one strength per
        // concentration; the ingredient repeats across all of them.
        if ingredients.len() == 1 && raw_strengths.len() > 1 {
            let only = ingredients[0].clone();
            ingredients.resize(raw_strengths.len(), only);
        }

        let mut entries: Vec<(Component, Option<ParsedStrength>)> = ingredients
            .iter()
            .zip(raw_strengths.iter())
            .map(|(ing, raw)| {
                let (base, qualifier) = self.split_salt_qualifier(ing);
                let (strength, parsed, strength_low) = self.canonical_strength(raw);
                low_confidence |= strength_low;
                (
                    Component {
                        ingredient: base,
                        qualifier,
                        strength,
                    },
                    parsed,
                )
            })
            .collect();

        // Canonical ordering: the ingredient list order in raw text is not
        // identity-bearing, so sort pairs (keeping parse detail aligned).
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));

        let (components, strengths): (Vec<_>, Vec<_>) = entries.into_iter().unzip();

        NormalizedFormulation {
            key: FormulationKey {
                components,
                route,
            },
            strengths,
            dose_form,
            low_confidence,
        }
    }

    /// Convenience wrapper for an Orange Book product record.
    pub fn normalize_product(
        &self,
        record: &crate::models::ObProductRecord,
    ) -> NormalizedFormulation {
        self.normalize(&record.ingredient, &record.strength, &record.df_route)
    }

    /// Convenience wrapper for a pricing record.
    pub fn normalize_pricing(
        &self,
        record: &crate::models::PricingRecord,
    ) -> NormalizedFormulation {
        self.normalize(
            &record.ingredient,
            &record.strength_text(),
            &record.df_route(),
        )
    }

    /// Canonical word set of a dose-form or route text, for compatibility
    /// checks between datasets that spell these differently.
    pub fn route_words(&self, text: &str) -> std::collections::BTreeSet<String> {
        words_of(text)
            .map(|w| self.config.fold_route_word(&w).to_string())
            .collect()
    }

    fn split_df_route(&self, route_text: &str) -> (Option<String>, String) {
        match route_text.split_once(';') {
            Some((form, route)) => {
                let form = self.canonical_route(form);
                let form = (!form.is_empty()).then_some(form);
                (form, self.canonical_route(route))
            }
            None => (None, self.canonical_route(route_text)),
        }
    }

    /// Canonicalize a route (or dose-form) text: uppercase words, fold each
    /// through the synonym table, drop duplicates, keep first-seen order.
    fn canonical_route(&self, text: &str) -> String {
        let mut seen = Vec::new();
        for word in words_of(text) {
            let folded = self.config.fold_route_word(&word).to_string();
            if !seen.contains(&folded) {
                seen.push(folded);
            }
        }
        seen.join(" ")
    }

    /// Split a recognized salt/form qualifier off the end of an ingredient
    /// name. Only trailing words on the allow-list are taken, and at least
    /// one word always remains as the base name.
    fn split_salt_qualifier(&self, name: &str) -> (String, Option<String>) {
        let mut words: Vec<&str> = name.split_whitespace().collect();
        let mut qualifier: Vec<&str> = Vec::new();
        while words.len() > 1 {
            let last = words[words.len() - 1];
            if self.config.salt_qualifiers.contains(last) {
                qualifier.insert(0, last);
                words.pop();
            } else {
                break;
            }
        }
        let base = words.join(" ");
        if qualifier.is_empty() {
            (base, None)
        } else {
            (base, Some(qualifier.join(" ")))
        }
    }

    /// Split a raw strength field into one entry per ingredient.
    ///
    /// Orange Book strength text is ";"-separated per ingredient, but with
    /// two complications seen in real editions: a parenthesized per-mL
    /// concentration list that zips with the base list, and comma-joined
    /// sublists when one ingredient has several strength presentations.
    fn split_strengths(&self, text: &str, expected: usize) -> (Vec<String>, bool) {
        // Some editions append a Federal Register annotation to the field.
        let text = match text.find("**Federal Register") {
            Some(pos) => text[..pos].trim_end(),
            None => text.trim(),
        };

        if let Some(zipped) = zip_parenthesized(text) {
            if zipped.len() == expected || expected == 1 {
                return (zipped, false);
            }
        }

        let elts: Vec<String> = text
            .split(';')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if elts.is_empty() {
            return (vec![String::new(); expected], true);
        }
        if elts.len() == expected || expected == 1 {
            return (elts, false);
        }

        // Transpose comma-joined sublists: "a1,a2; b1,b2" with two expected
        // entries becomes ["a1, b1", "a2, b2"] only when every element has
        // the same comma arity.
        let comma_split: Vec<Vec<&str>> = elts
            .iter()
            .map(|e| e.split(',').map(str::trim).collect())
            .collect();
        let arity = comma_split[0].len();
        if arity > 1 && comma_split.iter().all(|parts| parts.len() == arity) {
            let transposed: Vec<String> = (0..arity)
                .map(|i| {
                    comma_split
                        .iter()
                        .map(|parts| parts[i])
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .collect();
            if transposed.len() == expected {
                return (transposed, false);
            }
        }

        // Even grouping: 2N entries for N ingredients chunk pairwise.
        if elts.len() % expected == 0 {
            let chunk = elts.len() / expected;
            let grouped: Vec<String> = elts
                .chunks(chunk)
                .map(|group| group.join(", "))
                .collect();
            return (grouped, false);
        }

        // Give up on alignment: best-effort padding, flagged for review.
        let mut padded = elts;
        let last = padded.last().cloned().unwrap_or_default();
        padded.resize(expected, last);
        padded.truncate(expected);
        (padded, true)
    }

    /// Canonicalize one strength entry. Returns the canonical identity
    /// string, the parsed quantity/unit when parsing succeeded, and whether
    /// the entry is low-confidence.
    fn canonical_strength(&self, raw: &str) -> (String, Option<ParsedStrength>, bool) {
        let cleaned = collapse_ws(raw).to_uppercase();
        if cleaned.is_empty() {
            return (cleaned, None, true);
        }

        // "EQ 500MG BASE" means equivalent-to-base strength; the wrapper
        // does not change the quantity.
        let mut stripped = cleaned.as_str();
        if let Some(rest) = stripped.strip_prefix("EQ ") {
            stripped = rest;
        }
        if let Some(rest) = stripped.strip_suffix(" BASE") {
            stripped = rest;
        }

        let Some((quantity, rest)) = parse_leading_number(stripped) else {
            // Unparsable: keep the opaque normalized text as identity.
            return (cleaned, None, true);
        };

        let unit_raw = rest.trim().to_string();
        let (quantity, unit) = match self.config.unit_synonyms.get(&unit_raw.to_lowercase()) {
            Some(mapping) => (quantity * mapping.multiplier, mapping.canonical.clone()),
            None => (quantity, unit_raw),
        };

        let canonical = format!("{}{}", format_quantity(quantity), unit);
        (canonical, Some(ParsedStrength { quantity, unit }), false)
    }
}

/// Zip a parenthesized concentration list with the base list:
/// "EQ 200MG/2ML; 10MG/2ML (EQ 100MG/ML; 5MG/ML)" becomes
/// ["EQ 200MG/2ML (EQ 100MG/ML)", "10MG/2ML (5MG/ML)"].
fn zip_parenthesized(text: &str) -> Option<Vec<String>> {
    let open = text.find('(')?;
    let close = text.rfind(')')?;
    if close <= open {
        return None;
    }
    let base = &text[..open];
    let inner = &text[open + 1..close];
    if !base.contains(';') || !inner.contains(';') {
        return None;
    }
    let bases: Vec<&str> = base.split(';').map(str::trim).collect();
    let inners: Vec<&str> = inner.split(';').map(str::trim).collect();
    if bases.len() != inners.len() {
        return None;
    }
    Some(
        bases
            .iter()
            .zip(inners.iter())
            .map(|(b, i)| format!("{b} ({i})"))
            .collect(),
    )
}

/// Parse a leading decimal number ("500", "0.137", ".7"), returning the
/// value and the remaining text.
fn parse_leading_number(s: &str) -> Option<(f64, &str)> {
    let bytes = s.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => {
                seen_digit = true;
                end += 1;
            }
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    if !seen_digit {
        return None;
    }
    let text = if s[..end].starts_with('.') {
        format!("0{}", &s[..end])
    } else {
        s[..end].to_string()
    };
    text.parse::<f64>().ok().map(|n| (n, &s[end..]))
}

/// Render a quantity without a trailing ".0" so "500" and "500.0" agree.
fn format_quantity(q: f64) -> String {
    if q == q.trunc() && q.abs() < 1e12 {
        format!("{}", q as i64)
    } else {
        format!("{q}")
    }
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn words_of(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer(config: &ReconcileConfig) -> Normalizer<'_> {
        Normalizer::new(config)
    }

    #[test]
    fn test_unit_synonyms_converge() {
        let config = ReconcileConfig::default();
        let n = normalizer(&config);

        let a = n.normalize("AMOXICILLIN", "200MG", "TABLET;ORAL");
        let b = n.normalize("AMOXICILLIN", "200 mg", "TABLET;ORAL");
        let c = n.normalize("amoxicillin", "200 milligrams", "TABLET;ORAL");
        assert_eq!(a.key, b.key);
        assert_eq!(a.key, c.key);
        assert_eq!(a.key.components[0].strength, "200MG");
        assert!(!a.low_confidence);
    }

    #[test]
    fn test_gram_to_mg_conversion() {
        let config = ReconcileConfig::default();
        let n = normalizer(&config);

        let a = n.normalize("MESALAMINE", "1GM", "CAPSULE;ORAL");
        let b = n.normalize("MESALAMINE", "1000MG", "CAPSULE;ORAL");
        assert_eq!(a.key, b.key);
        assert_eq!(a.strengths[0].as_ref().unwrap().quantity, 1000.0);
        assert_eq!(a.strengths[0].as_ref().unwrap().unit, "MG");
    }

    #[test]
    fn test_ingredient_order_invariance() {
        let config = ReconcileConfig::default();
        let n = normalizer(&config);

        let a = n.normalize(
            "IBUPROFEN; ACETAMINOPHEN",
            "200MG; 325MG",
            "TABLET;ORAL",
        );
        let b = n.normalize(
            "ACETAMINOPHEN; IBUPROFEN",
            "325MG; 200MG",
            "TABLET;ORAL",
        );
        assert_eq!(a.key, b.key);
        assert_eq!(a.key.components[0].ingredient, "ACETAMINOPHEN");
        assert_eq!(a.key.components[0].strength, "325MG");
        assert_eq!(a.key.components[1].ingredient, "IBUPROFEN");
    }

    #[test]
    fn test_salt_qualifier_split() {
        let config = ReconcileConfig::default();
        let n = normalizer(&config);

        let nf = n.normalize("BUPRENORPHINE HYDROCHLORIDE", "EQ 6.3MG BASE", "FILM;BUCCAL");
        let c = &nf.key.components[0];
        assert_eq!(c.ingredient, "BUPRENORPHINE");
        assert_eq!(c.qualifier.as_deref(), Some("HYDROCHLORIDE"));
        assert_eq!(c.strength, "6.3MG");

        // Multi-word qualifiers come off together
        let nf = n.normalize(
            "NALOXONE HYDROCHLORIDE DIHYDRATE",
            "1MG",
            "FILM;BUCCAL",
        );
        let c = &nf.key.components[0];
        assert_eq!(c.ingredient, "NALOXONE");
        assert_eq!(c.qualifier.as_deref(), Some("HYDROCHLORIDE DIHYDRATE"));
    }

    #[test]
    fn test_qualifier_never_empties_name() {
        let config = ReconcileConfig::default();
        let n = normalizer(&config);

        // "SODIUM CHLORIDE" is all allow-listed words; the base must survive.
        let nf = n.normalize("SODIUM CHLORIDE", "0.9%", "SOLUTION;INJECTION");
        assert_eq!(nf.key.components[0].ingredient, "SODIUM");
        assert_eq!(nf.key.components[0].qualifier.as_deref(), Some("CHLORIDE"));
    }

    #[test]
    fn test_route_synonym_folding() {
        let config = ReconcileConfig::default();
        let n = normalizer(&config);

        let a = n.normalize("DEXMEDETOMIDINE", "100MCG", "INJECTABLE;INJECTION");
        let b = n.normalize("DEXMEDETOMIDINE", "0.1MG", "INJECTION;IV");
        assert_eq!(a.key.route, "INJECTION");
        assert_eq!(b.key.route, "INJECTION");
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn test_dose_form_not_identity_bearing() {
        let config = ReconcileConfig::default();
        let n = normalizer(&config);

        let tab = n.normalize("AMOXICILLIN", "500MG", "TABLET;ORAL");
        let cap = n.normalize("AMOXICILLIN", "500MG", "CAPSULE;ORAL");
        assert_eq!(tab.key, cap.key);
        // Both fold to the same canonical form word as well
        assert_eq!(tab.dose_form.as_deref(), Some("TABLET"));
        assert_eq!(cap.dose_form.as_deref(), Some("TABLET"));
    }

    #[test]
    fn test_eq_base_wrapper() {
        let config = ReconcileConfig::default();
        let n = normalizer(&config);

        let a = n.normalize("ENALAPRIL MALEATE", "EQ 5MG BASE", "TABLET;ORAL");
        let b = n.normalize("ENALAPRIL MALEATE", "5 mg", "TABLET;ORAL");
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn test_parenthesized_concentrations() {
        let config = ReconcileConfig::default();
        let n = normalizer(&config);

        let nf = n.normalize(
            "BUPIVACAINE HYDROCHLORIDE; EPINEPHRINE",
            "0.5%; 0.0005% (0.5%; 1:200,000)",
            "INJECTABLE;INJECTION",
        );
        assert_eq!(nf.key.components.len(), 2);
        assert!(!nf.low_confidence);
    }

    #[test]
    fn test_single_ingredient_multiple_strengths() {
        let config = ReconcileConfig::default();
        let n = normalizer(&config);

        let nf = n.normalize("NORETHINDRONE", "0.5MG; 0.75MG; 1MG", "TABLET;ORAL");
        assert_eq!(nf.key.components.len(), 3);
        assert!(nf
            .key
            .components
            .iter()
            .all(|c| c.ingredient == "NORETHINDRONE"));
    }

    #[test]
    fn test_unparsable_strength_is_low_confidence() {
        let config = ReconcileConfig::default();
        let n = normalizer(&config);

        let nf = n.normalize("PANCRELIPASE", "SEE LABEL", "CAPSULE;ORAL");
        assert!(nf.low_confidence);
        assert_eq!(nf.key.components[0].strength, "SEE LABEL");
        assert!(nf.strengths[0].is_none());

        // Same garbage text still produces an identical (comparable) key
        let nf2 = n.normalize("PANCRELIPASE", "see  label", "CAPSULE;ORAL");
        assert_eq!(nf.key, nf2.key);
    }

    #[test]
    fn test_count_mismatch_is_low_confidence_not_panic() {
        let config = ReconcileConfig::default();
        let n = normalizer(&config);

        let nf = n.normalize("A; B; C", "1MG; 2MG", "TABLET;ORAL");
        assert!(nf.low_confidence);
        assert_eq!(nf.key.components.len(), 3);
    }

    #[test]
    fn test_leading_dot_number() {
        let config = ReconcileConfig::default();
        let n = normalizer(&config);

        let a = n.normalize("X", ".7MG", "TABLET;ORAL");
        let b = n.normalize("X", "0.7 mg", "TABLET;ORAL");
        assert_eq!(a.key, b.key);
        assert_eq!(a.key.components[0].strength, "0.7MG");
    }

    #[test]
    fn test_pricing_unit_shapes() {
        let config = ReconcileConfig::default();
        let n = normalizer(&config);

        // NDC "mg/1" means mg per discrete dose; equal to plain MG
        let ob = n.normalize("MESALAMINE", "375MG", "CAPSULE;ORAL");
        let ndc = n.normalize("MESALAMINE", "375 mg/1", "CAPSULE;ORAL");
        assert_eq!(ob.key, ndc.key);
    }
}
