use std::path::Path;
use std::sync::Mutex;

use ndarray::Array4;
use tch::{CModule, Device, Kind, Tensor};

use crate::core::embeddings::FeatureExtractor;
use crate::error::{AppError, Result};

/// Feature extractor backed by a TorchScript module
pub struct TorchExtractor {
    module: Mutex<CModule>,
    device: Device,
    label: String,
}

impl std::fmt::Debug for TorchExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorchExtractor")
            .field("device", &self.device)
            .field("label", &self.label)
            .finish()
    }
}

impl TorchExtractor {
    /// Load a TorchScript model onto the GPU if available, else the CPU
    pub fn load(path: &Path) -> Result<Self> {
        let device = Device::cuda_if_available();
        let mut module = CModule::load_on_device(path, device)?;
        module.set_eval();

        log::info!("Loaded TorchScript model {} on {:?}", path.display(), device);

        Ok(Self {
            module: Mutex::new(module),
            device,
            label: format!("torch:{}", path.display()),
        })
    }
}

impl FeatureExtractor for TorchExtractor {
    fn extract(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let data: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::of_slice(&data)
            .reshape(&dims)
            .to_kind(Kind::Float)
            .to(self.device);

        let module = self
            .module
            .lock()
            .map_err(|_| AppError::Internal("TorchScript module lock poisoned".to_string()))?;
        let output = tch::no_grad(|| module.forward_ts(&[input_tensor]))?;

        let features = Vec::<f32>::try_from(output.to_device(Device::Cpu).flatten(0, -1))?;
        Ok(features)
    }

    fn name(&self) -> &str {
        &self.label
    }
}
