use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One stored reference image of a dish and its embedding.
///
/// This is the element type of a dish's `embeddings.json` document.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TemplateRecord {
    /// Image filename inside the dish directory.
    pub file: String,
    /// L2-normalized feature vector of the image.
    pub embedding: Vec<f32>,
}

impl TemplateRecord {
    /// Creates a new record.
    pub fn new(file: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            file: file.into(),
            embedding,
        }
    }
}

/// Every dish's index document, keyed and ordered by dish name.
pub type TemplateListing = BTreeMap<String, Vec<TemplateRecord>>;

/// Insert `record` into an index, replacing an entry with the same filename
/// in place. Returns `true` when an existing entry was replaced.
pub(crate) fn upsert(index: &mut Vec<TemplateRecord>, record: TemplateRecord) -> bool {
    match index.iter_mut().find(|r| r.file == record.file) {
        Some(existing) => {
            *existing = record;
            true
        }
        None => {
            index.push(record);
            false
        }
    }
}
