//! Core functionality: embedding extraction, storage and matching

/// Turns images into normalized embeddings.
pub mod embeddings;
/// Nearest-template search and the accept/reject decision.
pub mod matcher;
/// High level operations used by the HTTP handlers.
pub mod recognizer;
/// File-backed template images and embedding indexes.
pub mod store;
/// Persisted acceptance threshold.
pub mod threshold;

/// ONNX Runtime inference backend.
#[cfg(feature = "onnx")]
pub mod onnx;
/// TorchScript inference backend.
#[cfg(feature = "torch")]
pub mod torch;
