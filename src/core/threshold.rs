use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::write_json_atomic;

/// Threshold used when nothing has been persisted yet
pub const DEFAULT_THRESHOLD: f32 = 0.7;

#[derive(Debug, Serialize, Deserialize)]
struct ThresholdDocument {
    #[serde(default)]
    value: Option<f32>,
}

/// The persisted minimum similarity for a positive match.
///
/// Reads are served from memory. `set` persists first and only then
/// publishes the new value, one writer at a time.
#[derive(Debug)]
pub struct ThresholdStore {
    path: PathBuf,
    value: RwLock<f32>,
    write_lock: Mutex<()>,
}

impl ThresholdStore {
    /// Load the threshold document at `path`, falling back to `default`
    /// when it is absent, has no `value`, or cannot be parsed.
    pub fn load(path: impl Into<PathBuf>, default: f32) -> Result<Self> {
        let path = path.into();
        let value = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<ThresholdDocument>(&bytes) {
                Ok(doc) => doc.value.unwrap_or(default),
                Err(e) => {
                    log::warn!(
                        "Ignoring malformed threshold document {}: {}",
                        path.display(),
                        e
                    );
                    default
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => default,
            Err(e) => return Err(e.into()),
        };

        if !value.is_finite() {
            return Err(AppError::Config(format!(
                "threshold {} from {} is not a finite number",
                value,
                path.display()
            )));
        }

        log::info!("Using similarity threshold {}", value);
        Ok(Self {
            path,
            value: RwLock::new(value),
            write_lock: Mutex::new(()),
        })
    }

    /// Current threshold
    pub fn get(&self) -> f32 {
        *self.value.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist and publish a new threshold
    pub fn set(&self, value: f32) -> Result<f32> {
        if !value.is_finite() {
            return Err(AppError::InvalidInput(format!(
                "threshold must be a finite number, got {}",
                value
            )));
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            crate::utils::ensure_dir_exists(parent)?;
        }
        write_json_atomic(&self.path, &ThresholdDocument { value: Some(value) })?;
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;

        log::info!("Similarity threshold set to {}", value);
        Ok(value)
    }

    /// Location of the persisted document
    pub fn path(&self) -> &Path {
        &self.path
    }
}
