use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use ndarray::{Array4, ArrayView1};

use crate::error::{AppError, Result};

/// Side length of the square model input
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// A feature-extraction model that maps a preprocessed batch of one image
/// to a raw (unnormalized) feature vector.
///
/// Implementations are shared across requests; a backend whose session needs
/// exclusive access guards it internally.
pub trait FeatureExtractor: Send + Sync {
    /// Run a single forward pass over a `[1, 3, H, W]` tensor.
    fn extract(&self, input: &Array4<f32>) -> Result<Vec<f32>>;

    /// Backend name used in logs.
    fn name(&self) -> &str;
}

/// Settings for loading the feature-extraction model
#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    /// Path to the serialized model
    pub model_path: PathBuf,
    /// Square input resolution expected by the model
    pub input_size: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/mobilenet_feature_extractor.onnx"),
            input_size: DEFAULT_INPUT_SIZE,
        }
    }
}

/// Load the backend matching the model file's extension.
pub fn load_extractor(config: &EmbeddingConfig) -> Result<Arc<dyn FeatureExtractor>> {
    let path = config.model_path.as_path();
    if !path.is_file() {
        return Err(AppError::Config(format!(
            "model file {} does not exist",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "onnx" => load_onnx(path),
        "pt" | "ts" | "torchscript" => load_torch(path),
        other => Err(AppError::Config(format!(
            "unsupported model format {:?} for {}",
            other,
            path.display()
        ))),
    }
}

#[cfg(feature = "onnx")]
fn load_onnx(path: &Path) -> Result<Arc<dyn FeatureExtractor>> {
    Ok(Arc::new(super::onnx::OnnxExtractor::load(path)?))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(path: &Path) -> Result<Arc<dyn FeatureExtractor>> {
    Err(AppError::Config(format!(
        "{} is an ONNX model but the `onnx` feature is disabled",
        path.display()
    )))
}

#[cfg(feature = "torch")]
fn load_torch(path: &Path) -> Result<Arc<dyn FeatureExtractor>> {
    Ok(Arc::new(super::torch::TorchExtractor::load(path)?))
}

#[cfg(not(feature = "torch"))]
fn load_torch(path: &Path) -> Result<Arc<dyn FeatureExtractor>> {
    Err(AppError::Config(format!(
        "{} is a TorchScript model but the `torch` feature is disabled",
        path.display()
    )))
}

/// Turns images into unit-length embeddings using a shared extractor
#[derive(Clone)]
pub struct Embedder {
    extractor: Arc<dyn FeatureExtractor>,
    input_size: u32,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("extractor", &self.extractor.name())
            .field("input_size", &self.input_size)
            .finish()
    }
}

impl Embedder {
    /// Wrap an extractor that expects `input_size`×`input_size` inputs
    pub fn new(extractor: Arc<dyn FeatureExtractor>, input_size: u32) -> Self {
        Self {
            extractor,
            input_size,
        }
    }

    /// Compute the L2-normalized embedding of an image
    pub fn embed(&self, img: &DynamicImage) -> Result<Vec<f32>> {
        let input = preprocess(img, self.input_size);
        let mut features = self.extractor.extract(&input)?;
        l2_normalize(&mut features)?;
        Ok(features)
    }

    /// Decode an encoded image and embed it
    pub fn embed_bytes(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        let img = decode_image(bytes)?;
        self.embed(&img)
    }
}

/// Decode uploaded bytes into an image
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(AppError::InvalidInput("image upload is empty".to_string()));
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Resize to `size`×`size`, scale to `[0, 1]` and lay out as `[1, 3, H, W]`
pub fn preprocess(img: &DynamicImage, size: u32) -> Array4<f32> {
    let resized = img.resize_exact(size, size, image::imageops::FilterType::CatmullRom);
    let rgb_img = resized.to_rgb8();

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in rgb_img.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

/// Divide a vector by its Euclidean norm in place
pub fn l2_normalize(values: &mut [f32]) -> Result<()> {
    let norm = ArrayView1::from(&*values).dot(&ArrayView1::from(&*values)).sqrt();
    if !norm.is_finite() || norm <= 0.0 {
        return Err(AppError::Inference(format!(
            "model produced a degenerate feature vector (norm {})",
            norm
        )));
    }
    values.iter_mut().for_each(|v| *v /= norm);
    Ok(())
}

/// Compute cosine similarity between two embeddings.
///
/// Returns `0.0` when either vector has zero norm or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let dot_product = a.dot(&b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
