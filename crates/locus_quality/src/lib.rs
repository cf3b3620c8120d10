//! Deterministic quality gate for generated articles.
//!
//! [`QualityEvaluator::evaluate`] is pure: facts that need I/O (reachable
//! source links, how often a heading structure was already published) are
//! measured by the caller and passed in through [`EvaluationContext`].

pub mod evaluator;
pub mod policy;
pub mod signature;
pub mod text;

pub use evaluator::{EvaluationContext, QualityEvaluator};
pub use policy::QualityPolicy;
pub use signature::{build_signature, is_scored};
