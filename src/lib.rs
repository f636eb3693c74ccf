#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

//! # dishmatch
//!
//! A small service that recognizes dishes in food photos by comparing image
//! embeddings against user-managed reference images ("templates").
//!
//! ## Features
//!
//! - **Embeddings**: resize to 224×224, run a pretrained feature extractor
//!   (ONNX Runtime or TorchScript) and L2-normalize the output
//! - **Template store**: one directory per dish holding the images and an
//!   `embeddings.json` index, written atomically and serialized per dish
//! - **Threshold**: a persisted minimum similarity for a positive match
//! - **Matching**: cosine similarity over every stored template with a
//!   deterministic tie-break
//! - **Web API**: axum handlers for template CRUD, threshold and prediction
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dishmatch::{Config, Recognizer, Embedder, load_extractor, Result};
//!
//! fn main() -> Result<()> {
//!     let config = Config::from_env()?;
//!     let extractor = load_extractor(&config.embedding)?;
//!     let embedder = Embedder::new(extractor, config.embedding.input_size);
//!     let recognizer =
//!         Recognizer::open(embedder, &config.template_dir, &config.threshold_file, 0.7)?;
//!     let prediction = recognizer.predict(&std::fs::read("lunch.jpg")?, None)?;
//!     println!("{:?}", prediction.decision);
//!     Ok(())
//! }
//! ```

// Internal modules
pub mod api;
pub mod core;
/// Defines the application's error types and result aliases.
pub mod error;
pub mod models;
mod state;
mod utils;

/// Build metadata generated by `build.rs`.
#[allow(missing_docs, dead_code, unreachable_pub)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

// Public API exports
pub use crate::{
    core::{
        embeddings::{
            cosine_similarity, load_extractor, Embedder, EmbeddingConfig, FeatureExtractor,
        },
        matcher::{best_match, decide, match_query, top_k},
        recognizer::Recognizer,
        store::{Inconsistency, TemplateStore},
        threshold::{ThresholdStore, DEFAULT_THRESHOLD},
    },
    error::{AppError, Result, ResultExt},
    models::{
        prediction::{Candidate, Decision, Prediction},
        template::{TemplateListing, TemplateRecord},
    },
    state::{AppState, Config},
};

#[cfg(feature = "web")]
pub use crate::api::{create_router, health_check};

/// Initialize logging with default settings.
///
/// It should be called early in the application startup process. Calling it
/// more than once is harmless.
///
/// # Example
///
/// ```no_run
/// use dishmatch::init;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     init()?;
///     // Application code here
///     Ok(())
/// }
/// ```
pub fn init() -> Result<()> {
    let env = env_logger::Env::default()
        .default_filter_or("info")
        .default_write_style_or("auto");

    if env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_module_path(false)
        .try_init()
        .is_err()
    {
        log::debug!("Logger already initialized");
    }

    log::info!(
        "Initializing {} {}",
        built_info::PKG_NAME,
        built_info::PKG_VERSION
    );
    Ok(())
}
