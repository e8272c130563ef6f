//! Match diagnostics: counts and bounded samples of the outcomes that need
//! manual attention.
//!
//! Diagnostics never alter match outcomes. Counts are exact; samples are
//! bounded per reason. Partial accumulators from parallel workers merge
//! with [`MatchDiagnostics::merge`], which keeps the counts independent of
//! worker scheduling.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{MatchOutcome, MatchTier, NoMatchReason, PricingRecord};

/// Reason key for diagnostic accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticReason {
    /// Multiple candidates qualified; needs manual review
    Ambiguous,
    /// Formulation absent from every indexed edition
    IndexGap,
    /// Formulation indexed but no manufacturer text matched
    NoManufacturerMatch,
    /// Confirmed, but only at the fuzzy tier's reduced confidence
    ReducedConfidence,
}

impl From<NoMatchReason> for DiagnosticReason {
    fn from(reason: NoMatchReason) -> Self {
        match reason {
            NoMatchReason::IndexGap => DiagnosticReason::IndexGap,
            NoMatchReason::NoManufacturerMatch => DiagnosticReason::NoManufacturerMatch,
        }
    }
}

/// A sampled record for manual audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSample {
    pub ndc: String,
    pub description: String,
}

/// Read-only end-of-run summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsSummary {
    pub total: u64,
    pub confirmed: u64,
    pub counts: BTreeMap<DiagnosticReason, u64>,
    pub samples: BTreeMap<DiagnosticReason, Vec<RecordSample>>,
}

/// Accumulator over match outcomes.
#[derive(Debug, Clone)]
pub struct MatchDiagnostics {
    total: u64,
    confirmed: u64,
    counts: BTreeMap<DiagnosticReason, u64>,
    samples: BTreeMap<DiagnosticReason, Vec<RecordSample>>,
    sample_limit: usize,
}

impl MatchDiagnostics {
    pub fn new(sample_limit: usize) -> Self {
        Self {
            total: 0,
            confirmed: 0,
            counts: BTreeMap::new(),
            samples: BTreeMap::new(),
            sample_limit,
        }
    }

    /// Record one outcome. Ambiguous and NoMatch outcomes are counted by
    /// reason; fuzzy-tier confirmations are counted as reduced-confidence
    /// so that every non-exact resolution stays observable.
    pub fn record(&mut self, record: &PricingRecord, outcome: &MatchOutcome) {
        self.total += 1;
        match outcome {
            MatchOutcome::Confirmed { tier, .. } => {
                self.confirmed += 1;
                if *tier == MatchTier::FuzzyText {
                    self.bump(DiagnosticReason::ReducedConfidence, record);
                }
            }
            MatchOutcome::Ambiguous { .. } => {
                self.bump(DiagnosticReason::Ambiguous, record);
            }
            MatchOutcome::NoMatch { reason } => {
                self.bump((*reason).into(), record);
            }
        }
    }

    /// Merge a partial accumulator (e.g. from another worker).
    pub fn merge(&mut self, other: MatchDiagnostics) {
        self.total += other.total;
        self.confirmed += other.confirmed;
        for (reason, count) in other.counts {
            *self.counts.entry(reason).or_insert(0) += count;
        }
        for (reason, samples) in other.samples {
            let bucket = self.samples.entry(reason).or_default();
            for sample in samples {
                if bucket.len() >= self.sample_limit {
                    break;
                }
                bucket.push(sample);
            }
        }
    }

    pub fn summary(&self) -> DiagnosticsSummary {
        DiagnosticsSummary {
            total: self.total,
            confirmed: self.confirmed,
            counts: self.counts.clone(),
            samples: self.samples.clone(),
        }
    }

    fn bump(&mut self, reason: DiagnosticReason, record: &PricingRecord) {
        *self.counts.entry(reason).or_insert(0) += 1;
        let bucket = self.samples.entry(reason).or_default();
        if bucket.len() < self.sample_limit {
            bucket.push(RecordSample {
                ndc: record.ndc.clone(),
                description: record.display_text(),
            });
        }
    }
}
