//! Formulation equivalence classes.
//!
//! Pipeline: Normalization → Key interning → Union-find → Class assignment

mod builder;
mod union_find;

pub use builder::*;
pub use union_find::*;
