//! Pricing-database (NDC directory) records.

use serde::{Deserialize, Serialize};

/// A consolidated pricing-database record, identified by a product-level
/// NDC. The link to an Orange Book product is *not* given here; producing
/// it is the matcher's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRecord {
    /// Product NDC in FDA form (e.g. "50242-051")
    pub ndc: String,
    /// Free-text drug description (proprietary name and labeler text);
    /// may be empty
    pub description: String,
    /// Application number the labeler reported, alphabetic prefix stripped;
    /// empty when the record carries none
    pub appl_no: String,
    /// Raw substance-name text (";"-separated for combinations)
    pub ingredient: String,
    /// Raw dosage-form text (e.g. "CAPSULE")
    pub form: String,
    /// Raw route text (e.g. "ORAL")
    pub route: String,
    /// Numeric strength text, one entry per ingredient (e.g. "500; 125")
    pub strength_num: String,
    /// Strength unit text, one entry per ingredient (e.g. "mg/1; mg/1")
    pub strength_unit: String,
    /// Marketing start date, raw (YYYYMMDD)
    pub start_date: String,
    /// Marketing end date, raw; empty while still marketed
    pub end_date: String,
}

impl PricingRecord {
    /// Raw df;route text in the Orange Book convention, for normalization.
    pub fn df_route(&self) -> String {
        format!("{};{}", self.form, self.route)
    }

    /// Strength text in the Orange Book convention: quantity and unit glued
    /// per component ("500 mg/1; 125 mg/1").
    pub fn strength_text(&self) -> String {
        let nums: Vec<&str> = self.strength_num.split(';').map(str::trim).collect();
        let units: Vec<&str> = self.strength_unit.split(';').map(str::trim).collect();
        nums.iter()
            .enumerate()
            .map(|(i, n)| match units.get(i) {
                Some(u) => format!("{n} {u}"),
                None => (*n).to_string(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Free-text description for display and diagnostics samples: the
    /// description field when present, otherwise composed from parts.
    pub fn display_text(&self) -> String {
        if !self.description.is_empty() {
            self.description.clone()
        } else {
            format!(
                "{} {} {} {}",
                self.ingredient, self.strength_num, self.strength_unit, self.form
            )
        }
    }
}

/// Converts an FDA-formatted product NDC ("4-5 digits, dash, 3-4 digits")
/// into the 9-digit HIPAA form used to join against price files. The
/// two package-code digits are not part of either form.
pub fn hipaa_ndc(ndc: &str) -> Option<String> {
    let (labeler, product) = ndc.split_once('-')?;
    if !(4..=5).contains(&labeler.len()) || !labeler.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // A leading 'N' appears in some legacy product codes.
    let valid_product = (3..=4).contains(&product.len())
        && product
            .bytes()
            .enumerate()
            .all(|(i, b)| b.is_ascii_digit() || (i == 0 && b == b'N'));
    if !valid_product {
        return None;
    }
    Some(format!("{:0>5}{:0>4}", labeler, product))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hipaa_ndc() {
        assert_eq!(hipaa_ndc("50242-051").as_deref(), Some("502420051"));
        assert_eq!(hipaa_ndc("1234-5678").as_deref(), Some("012345678"));
        assert_eq!(hipaa_ndc("50242-N51").as_deref(), Some("50242N051"));
        assert_eq!(hipaa_ndc("notanndc"), None);
        assert_eq!(hipaa_ndc("123-456"), None);
    }

    #[test]
    fn test_strength_text_pairs_units() {
        let rec = PricingRecord {
            ndc: "50242-051".into(),
            description: String::new(),
            appl_no: "050542".into(),
            ingredient: "AMOXICILLIN; CLAVULANATE POTASSIUM".into(),
            form: "TABLET".into(),
            route: "ORAL".into(),
            strength_num: "500; 125".into(),
            strength_unit: "mg/1; mg/1".into(),
            start_date: "20100101".into(),
            end_date: String::new(),
        };
        assert_eq!(rec.strength_text(), "500 mg/1; 125 mg/1");
        assert_eq!(rec.df_route(), "TABLET;ORAL");
    }
}
