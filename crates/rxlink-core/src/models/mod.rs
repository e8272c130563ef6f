//! Domain models for the rxlink reconciliation system.

mod formulation;
mod matching;
mod orange_book;
mod pricing;

pub use formulation::*;
pub use matching::*;
pub use orange_book::*;
pub use pricing::*;
