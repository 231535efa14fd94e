//! Rules: local, deterministic substitutes for the remote reasoner.
//!
//! [`RuleFallback`] answers every stage without I/O and never fails.
//! [`SafetyPolicy`] is the blocklist/allowlist gate the safety stage always
//! runs locally, whichever path drafted the recommendations.

pub mod fallback;
pub mod policy;

pub use fallback::RuleFallback;
pub use policy::{SafetyPolicy, Violation};
