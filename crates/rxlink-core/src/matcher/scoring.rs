//! Cross-dataset equivalence heuristics and fuzzy text scoring.
//!
//! The Orange Book and the NDC directory describe the same product with
//! different unit spellings, ratio forms, and dose-form vocabularies. The
//! comparisons here absorb those differences without a parse of every
//! variant: strength texts are compared by scanning their numbers with
//! scale hops, and dose form/route by canonical word-set overlap.

use std::collections::BTreeSet;

use strsim::{jaro_winkler, normalized_levenshtein};

use crate::config::ReconcileConfig;
use crate::models::{FormulationKey, ParsedStrength};

/// Combined fuzzy string similarity. Jaro-Winkler is weighted more heavily
/// as it rewards the shared prefixes typical of drug names.
pub fn fuzzy_match(a: &str, b: &str) -> f64 {
    let jw = jaro_winkler(a, b);
    let lev = normalized_levenshtein(a, b);
    jw * 0.6 + lev * 0.4
}

/// Uppercase, whitespace-collapsed rendering for text scoring.
pub fn fold_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Dose-form/route compatibility by canonical word overlap.
///
/// Injection routes are a special case: the datasets disagree on whether
/// "INJECTION" is a form or a route, so its presence on the route side of
/// one record and either side of the other is accepted. Inhalation behaves
/// the same way.
pub fn form_route_compatible(
    ob_form: &BTreeSet<String>,
    ob_route: &BTreeSet<String>,
    other_form: &BTreeSet<String>,
    other_route: &BTreeSet<String>,
) -> bool {
    let injection = "INJECTION".to_string();
    let inhalation = "INHALATION".to_string();
    if ob_route.contains(&injection)
        && (other_route.contains(&injection) || other_form.contains(&injection))
    {
        return true;
    }
    if ob_route.contains(&inhalation) && other_form.contains(&inhalation) {
        return true;
    }
    if !ob_route.is_empty() && !other_route.is_empty() && ob_route.is_disjoint(other_route) {
        return false;
    }
    if !ob_form.is_empty() && !other_form.is_empty() && ob_form.is_disjoint(other_form) {
        return false;
    }
    true
}

/// Whether an Orange Book strength rendering matches a pricing-side
/// strength. Exact text equality is accepted first; otherwise every number
/// in the Orange Book text (ratio denominators excluded) is compared
/// against the parsed pricing quantity with unit-scale hops:
///
/// - x1000 / /1000 for mg<->mcg and g<->mg spellings the unit table could
///   not fold (compound units like "MCG BASE/2ML"),
/// - x10 for percentage concentrations read as mg/mL,
/// - a leading "a .. /b" ratio compared as a/b.
pub fn strength_equivalent(
    ob_strength: &str,
    pricing_text: &str,
    pricing: Option<&ParsedStrength>,
    rel_tol: f64,
) -> bool {
    if ob_strength == pricing_text {
        return true;
    }
    let Some(parsed) = pricing else {
        return false;
    };
    let target = parsed.quantity;

    for number in numbers_in(ob_strength) {
        if close(number, target, rel_tol)
            || close(number * 1000.0, target, rel_tol)
            || close(number / 1000.0, target, rel_tol)
        {
            return true;
        }
        if ob_strength.contains('%') && close(number * 10.0, target, rel_tol) {
            return true;
        }
    }
    if let Some((num, den)) = leading_ratio(ob_strength) {
        if den != 0.0 && close(num / den, target, rel_tol) {
            return true;
        }
    }
    false
}

/// Whether an Orange Book key and a pricing-side key denote the same
/// composition: equal ingredient multisets under the synonym table, with
/// each pairing passing [`strength_equivalent`].
pub fn composition_equivalent(
    ob_key: &FormulationKey,
    pricing_key: &FormulationKey,
    pricing_strengths: &[Option<ParsedStrength>],
    config: &ReconcileConfig,
) -> bool {
    if ob_key.components.len() != pricing_key.components.len() {
        return false;
    }
    let mut remaining: Vec<&crate::models::Component> = ob_key.components.iter().collect();
    for (i, comp) in pricing_key.components.iter().enumerate() {
        let base = config.fold_ingredient(&comp.ingredient);
        let parsed = pricing_strengths.get(i).and_then(Option::as_ref);
        let found = remaining.iter().position(|oc| {
            config.fold_ingredient(&oc.ingredient) == base
                && strength_equivalent(&oc.strength, &comp.strength, parsed, config.strength_rel_tol)
        });
        match found {
            Some(pos) => {
                remaining.remove(pos);
            }
            None => return false,
        }
    }
    remaining.is_empty()
}

/// Numbers in a strength text, excluding those directly preceded by '/'
/// (ratio denominators).
fn numbers_in(text: &str) -> Vec<f64> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() || (bytes[i] == b'.' && peek_digit(bytes, i + 1)) {
            let start = i;
            let mut seen_dot = bytes[i] == b'.';
            i += 1;
            while i < bytes.len()
                && (bytes[i].is_ascii_digit() || (bytes[i] == b'.' && !seen_dot))
            {
                seen_dot |= bytes[i] == b'.';
                i += 1;
            }
            let after_slash = start > 0 && bytes[start - 1] == b'/';
            if !after_slash {
                let mut text = text[start..i].to_string();
                if text.starts_with('.') {
                    text.insert(0, '0');
                }
                if let Ok(n) = text.parse::<f64>() {
                    out.push(n);
                }
            }
        } else {
            i += 1;
        }
    }
    out
}

fn peek_digit(bytes: &[u8], i: usize) -> bool {
    i < bytes.len() && bytes[i].is_ascii_digit()
}

/// Leading ratio form "a ... /b": the first number and the first number
/// following a '/'.
fn leading_ratio(text: &str) -> Option<(f64, f64)> {
    let first = numbers_in(text).first().copied()?;
    let slash = text.find('/')?;
    let after = &text[slash + 1..];
    let den_text: String = after
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if den_text.is_empty() {
        return None;
    }
    let den: f64 = if den_text.starts_with('.') {
        format!("0{den_text}").parse().ok()?
    } else {
        den_text.parse().ok()?
    };
    Some((first, den))
}

fn close(a: f64, b: f64, rel_tol: f64) -> bool {
    (a - b).abs() <= rel_tol * a.abs().max(b.abs())
}
