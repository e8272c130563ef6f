//! RxLink Core Library
//!
//! Reconciles drug identity across FDA datasets: Orange Book editions are
//! folded into formulation equivalence classes, and pricing/NDC records are
//! matched against those classes through a tiered resolver.
//!
//! # Pipeline
//!
//! ```text
//! Orange Book editions          NDC directory editions
//!        │                               │
//!        ▼                               ▼
//!   ingest::orange_book           ingest::PricingLoader
//!        │                               │
//!        ▼                               │
//!   Normalizer  ──► EquivalenceBuilder   │
//!        │                │              │
//!        │                ▼              │
//!        │        EquivalenceClasses     │
//!        │                │              │
//!        ▼                ▼              ▼
//!   FormulationIndex ──► Matcher ◄── PricingRecord
//!                           │
//!                           ▼
//!                MatchOutcome + MatchDiagnostics
//! ```
//!
//! # Core Principle
//!
//! **Ambiguity is surfaced, never guessed away.** When more than one product
//! qualifies, the matcher reports all candidates for manual review instead of
//! picking one.
//!
//! # Modules
//!
//! - [`config`]: tunable vocabulary and thresholds
//! - [`models`]: domain types (FormulationKey, ObProductRecord, PricingRecord, ...)
//! - [`normalize`]: text to canonical formulation keys
//! - [`equiv`]: union-find construction of equivalence classes
//! - [`index`]: product-key to class lookup
//! - [`matcher`]: tiered cross-dataset matching
//! - [`diagnostics`]: outcome counts and audit samples
//! - [`ingest`]: Orange Book and NDC directory file loaders

pub mod config;
pub mod diagnostics;
pub mod equiv;
pub mod index;
pub mod ingest;
pub mod matcher;
pub mod models;
pub mod normalize;

pub use config::ReconcileConfig;
pub use diagnostics::MatchDiagnostics;
pub use equiv::{EquivalenceBuilder, EquivalenceClasses};
pub use index::FormulationIndex;
pub use matcher::{Matcher, ProductCatalog};
pub use models::{
    ClassId, FormulationKey, MatchOutcome, MatchTier, NoMatchReason, NormalizedFormulation,
    ObProductRecord, PricingRecord, ProductKey,
};
pub use normalize::Normalizer;
