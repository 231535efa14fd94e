//! Knowledge: preloaded fact tables and term normalization.
//!
//! Everything here is synchronous and side-effect free once loaded. Lookups
//! accept English, Urdu script or romanized Urdu; all three resolve through
//! the same normalized key.

pub mod knowledge;
pub mod normalize;
pub mod types;

pub use knowledge::{KnowledgeBase, SymptomMatch};
pub use normalize::Normalizer;
pub use types::*;
