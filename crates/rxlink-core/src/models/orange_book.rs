//! Orange Book product records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ProductKey;

/// One row of an Orange Book products file, as emitted by the ingestion
/// layer. Raw text fields are kept verbatim; normalization happens later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObProductRecord {
    pub appl_no: String,
    pub product_no: String,
    /// Raw active-ingredient text (";"-separated for combinations)
    pub ingredient: String,
    /// Raw dose-form/route text (e.g. "TABLET;ORAL")
    pub df_route: String,
    /// Raw strength text, one entry per ingredient
    pub strength: String,
    /// Therapeutic-equivalence code (e.g. "AB", "AP")
    pub te_code: String,
    /// Approval date; "Approved Prior to Jan 1, 1982" maps to 1982-01-01
    pub approval_date: Option<NaiveDate>,
    pub applicant: String,
    pub trade_name: String,
    /// Edition identifier the record was read from (e.g. "EOBZIP_2019_06")
    pub edition: String,
}

impl ObProductRecord {
    pub fn product_key(&self) -> ProductKey {
        ProductKey::new(self.appl_no.clone(), self.product_no.clone())
    }

    /// Free-text description used for fuzzy matching against pricing
    /// records: trade name, ingredients, strength, and dose form/route.
    pub fn description(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(4);
        if !self.trade_name.is_empty() {
            parts.push(&self.trade_name);
        }
        parts.push(&self.ingredient);
        parts.push(&self.strength);
        parts.push(&self.df_route);
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ObProductRecord {
        ObProductRecord {
            appl_no: "050542".into(),
            product_no: "001".into(),
            ingredient: "AMOXICILLIN".into(),
            df_route: "CAPSULE;ORAL".into(),
            strength: "500MG".into(),
            te_code: "AB".into(),
            approval_date: None,
            applicant: "USPHARM".into(),
            trade_name: "AMOXIL".into(),
            edition: "EOBZIP_2019_06".into(),
        }
    }

    #[test]
    fn test_description_includes_trade_name() {
        let rec = record();
        let desc = rec.description();
        assert!(desc.contains("AMOXIL"));
        assert!(desc.contains("AMOXICILLIN"));
        assert!(desc.contains("500MG"));
    }
}
