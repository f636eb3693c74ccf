use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::embeddings::{load_extractor, Embedder, EmbeddingConfig, FeatureExtractor};
use crate::core::recognizer::Recognizer;
use crate::core::threshold::DEFAULT_THRESHOLD;
use crate::error::{AppError, Result};

const ENV_PREFIX: &str = "DISHMATCH_";

/// Configuration for the application
#[derive(Clone, Debug)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,
    /// Root directory with one sub-directory per dish
    pub template_dir: PathBuf,
    /// Location of the persisted threshold document
    pub threshold_file: PathBuf,
    /// Directory served under `/static`
    pub static_dir: PathBuf,
    /// Threshold used until one is persisted
    pub default_threshold: f32,
    /// Maximum request body size in bytes
    pub max_upload_size: usize,
    /// Allowed file extensions for template uploads
    pub allowed_extensions: Vec<String>,
    /// Embedding model configuration
    pub embedding: EmbeddingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            template_dir: PathBuf::from("templates_store"),
            threshold_file: PathBuf::from("threshold.json"),
            static_dir: PathBuf::from("static"),
            default_threshold: DEFAULT_THRESHOLD,
            max_upload_size: 20 * 1024 * 1024, // 20MB
            allowed_extensions: vec!["jpg", "jpeg", "png", "webp", "bmp", "gif"]
                .into_iter()
                .map(String::from)
                .collect(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Config {
    /// Build a configuration from `DISHMATCH_*` environment variables,
    /// loading a `.env` file first if one exists.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }

        let defaults = Self::default();
        let allowed_extensions = match env_var("ALLOWED_EXTENSIONS") {
            Some(list) => list
                .split(',')
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            None => defaults.allowed_extensions,
        };

        let config = Self {
            bind_addr: parse_var("BIND")?.unwrap_or(defaults.bind_addr),
            template_dir: env_var("TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_dir),
            threshold_file: env_var("THRESHOLD_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.threshold_file),
            static_dir: env_var("STATIC_DIR").map(PathBuf::from).unwrap_or(defaults.static_dir),
            default_threshold: parse_var("DEFAULT_THRESHOLD")?
                .unwrap_or(defaults.default_threshold),
            max_upload_size: parse_var("MAX_UPLOAD_BYTES")?.unwrap_or(defaults.max_upload_size),
            allowed_extensions,
            embedding: EmbeddingConfig {
                model_path: env_var("MODEL_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.embedding.model_path),
                input_size: parse_var("INPUT_SIZE")?.unwrap_or(defaults.embedding.input_size),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that parsing alone does not catch
    pub fn validate(&self) -> Result<()> {
        if !self.default_threshold.is_finite() {
            return Err(AppError::Config("default threshold must be finite".to_string()));
        }
        if self.embedding.input_size == 0 {
            return Err(AppError::Config("input size must be positive".to_string()));
        }
        if self.allowed_extensions.is_empty() {
            return Err(AppError::Config("at least one file extension must be allowed".to_string()));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                AppError::Config(format!("{}{}={:?}: {}", ENV_PREFIX, name, raw, e))
            })
        })
        .transpose()
}

/// Application state that can be shared across handlers
#[derive(Debug)]
pub struct AppState {
    /// Application configuration
    pub config: Config,
    /// Template store, threshold and model behind one facade
    pub recognizer: Arc<Recognizer>,
}

impl AppState {
    /// Load the model named in `config` and open the stores
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let extractor = load_extractor(&config.embedding)?;
        Self::with_extractor(config, extractor)
    }

    /// Open the stores with an already constructed extractor
    pub fn with_extractor(
        config: Config,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Result<Arc<Self>> {
        let embedder = Embedder::new(extractor, config.embedding.input_size);
        let recognizer = Recognizer::open(
            embedder,
            &config.template_dir,
            &config.threshold_file,
            config.default_threshold,
        )?;

        Ok(Arc::new(Self {
            config,
            recognizer: Arc::new(recognizer),
        }))
    }
}
