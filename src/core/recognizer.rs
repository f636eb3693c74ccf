use std::path::Path;

use crate::core::embeddings::{decode_image, Embedder};
use crate::core::matcher;
use crate::core::store::{Inconsistency, TemplateStore};
use crate::core::threshold::ThresholdStore;
use crate::error::Result;
use crate::models::prediction::Prediction;
use crate::models::template::{TemplateListing, TemplateRecord};

/// Ties the embedder, the template store and the threshold together.
///
/// Every method is synchronous and may block on inference or disk I/O;
/// async callers run them on the blocking pool.
#[derive(Debug)]
pub struct Recognizer {
    embedder: Embedder,
    templates: TemplateStore,
    threshold: ThresholdStore,
}

impl Recognizer {
    /// Assemble a recognizer from its parts
    pub fn new(embedder: Embedder, templates: TemplateStore, threshold: ThresholdStore) -> Self {
        Self {
            embedder,
            templates,
            threshold,
        }
    }

    /// Open the stores at the given locations
    pub fn open(
        embedder: Embedder,
        template_dir: &Path,
        threshold_file: &Path,
        default_threshold: f32,
    ) -> Result<Self> {
        Ok(Self::new(
            embedder,
            TemplateStore::open(template_dir)?,
            ThresholdStore::load(threshold_file, default_threshold)?,
        ))
    }

    /// Decode, embed and store a template image
    pub fn add_template(
        &self,
        dish: &str,
        filename: &str,
        image_bytes: &[u8],
    ) -> Result<TemplateRecord> {
        let img = decode_image(image_bytes)?;
        let embedding = self.embedder.embed(&img)?;
        self.templates.add(dish, filename, image_bytes, embedding)
    }

    /// Delete one template; absent templates are ignored
    pub fn remove_template(&self, dish: &str, filename: &str) -> Result<()> {
        self.templates.remove_template(dish, filename)
    }

    /// Delete a dish and all of its templates
    pub fn remove_dish(&self, dish: &str) -> Result<()> {
        self.templates.remove_dish(dish)
    }

    /// All stored templates by dish
    pub fn list_templates(&self) -> Result<TemplateListing> {
        self.templates.list_all()
    }

    /// Current acceptance threshold
    pub fn threshold(&self) -> f32 {
        self.threshold.get()
    }

    /// Persist a new acceptance threshold
    pub fn set_threshold(&self, value: f32) -> Result<f32> {
        self.threshold.set(value)
    }

    /// Check the store for index/file mismatches
    pub fn audit(&self) -> Result<Vec<Inconsistency>> {
        self.templates.audit()
    }

    /// Classify an uploaded image against every stored template.
    ///
    /// With `top_k`, the prediction also carries up to that many ranked
    /// candidates that meet the threshold.
    pub fn predict(&self, image_bytes: &[u8], top_k: Option<usize>) -> Result<Prediction> {
        let query = self.embedder.embed_bytes(image_bytes)?;
        let listing = self.templates.list_all()?;
        let threshold = self.threshold.get();

        let decision = matcher::match_query(&query, &listing, threshold);
        let candidates = top_k.map(|k| matcher::top_k(&query, &listing, threshold, k));

        match decision.best() {
            Some(best) => log::debug!(
                "Best match {}/{} score {:.4} (threshold {}, accepted: {})",
                best.dish,
                best.file,
                best.score,
                threshold,
                decision.is_accepted()
            ),
            None => log::debug!("No comparable templates stored"),
        }

        Ok(Prediction {
            decision,
            threshold,
            candidates,
        })
    }
}
