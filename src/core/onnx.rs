use std::path::Path;
use std::sync::Mutex;

use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::core::embeddings::FeatureExtractor;
use crate::error::{AppError, Result};

/// Feature extractor backed by an ONNX Runtime session.
///
/// The session is process-wide; runs are serialized through a mutex because
/// `Session::run` needs exclusive access.
pub struct OnnxExtractor {
    session: Mutex<Session>,
    input_name: String,
    label: String,
}

impl std::fmt::Debug for OnnxExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxExtractor")
            .field("input_name", &self.input_name)
            .field("label", &self.label)
            .finish()
    }
}

impl OnnxExtractor {
    /// Load a model from disk and prepare a session
    pub fn load(path: &Path) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(path)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| AppError::Config(format!("{} declares no inputs", path.display())))?;

        log::info!(
            "Loaded ONNX model {} (input '{}')",
            path.display(),
            input_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            label: format!("onnx:{}", path.display()),
        })
    }
}

impl FeatureExtractor for OnnxExtractor {
    fn extract(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        let (n, c, h, w) = input.dim();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_array(([n, c, h, w], data))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AppError::Internal("ONNX session lock poisoned".to_string()))?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => tensor])?;

        if outputs.len() == 0 {
            return Err(AppError::Inference("model returned no outputs".to_string()));
        }
        let (_, features) = outputs[0].try_extract_tensor::<f32>()?;
        if features.is_empty() {
            return Err(AppError::Inference("model returned an empty output".to_string()));
        }

        // Batch of one: the whole output is the feature vector
        Ok(features.to_vec())
    }

    fn name(&self) -> &str {
        &self.label
    }
}
