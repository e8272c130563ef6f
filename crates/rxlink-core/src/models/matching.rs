//! Match outcome models.

use serde::{Deserialize, Serialize};

use super::{ClassId, ProductKey};

/// Which tier of the matcher produced a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchTier {
    /// The pricing record embedded a directly comparable application number
    StructuredCode,
    /// Normalized formulation keys were equal
    NormalizedText,
    /// Fuzzy text similarity cleared the configured threshold
    FuzzyText,
}

/// A candidate Orange Book product with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub product: ProductKey,
    pub class_id: ClassId,
    /// Product description the score was computed against
    pub description: String,
    /// Similarity score in [0, 1]; 1.0 for structured/normalized matches
    pub score: f64,
}

/// Why no product qualified at any tier. Downstream reporting treats the
/// two cases differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NoMatchReason {
    /// The record's formulation never appeared in any indexed edition;
    /// usually a data-loading gap
    IndexGap,
    /// The formulation is indexed but no manufacturer text matched
    NoManufacturerMatch,
}

impl std::fmt::Display for NoMatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoMatchReason::IndexGap => write!(f, "index-gap"),
            NoMatchReason::NoManufacturerMatch => write!(f, "no-manufacturer-match"),
        }
    }
}

/// Result of matching one pricing record against the product catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchOutcome {
    /// Exactly one product qualified
    Confirmed {
        candidate: ScoredCandidate,
        tier: MatchTier,
    },
    /// Multiple products qualified; ordered by descending score, ties
    /// broken by product key, for manual review
    Ambiguous { candidates: Vec<ScoredCandidate> },
    /// No product qualified at any tier
    NoMatch { reason: NoMatchReason },
}

impl MatchOutcome {
    pub fn confirmed_product(&self) -> Option<&ProductKey> {
        match self {
            MatchOutcome::Confirmed { candidate, .. } => Some(&candidate.product),
            _ => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, MatchOutcome::Confirmed { .. })
    }
}
