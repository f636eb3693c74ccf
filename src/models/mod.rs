//! Data types persisted to disk and returned by the recognizer

/// Template records and the per-dish embedding index.
pub mod template;
/// Match candidates and prediction outcomes.
pub mod prediction;
