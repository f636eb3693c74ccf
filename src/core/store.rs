use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::template::{upsert, TemplateListing, TemplateRecord};
use crate::utils::{
    ensure_dir_exists, sanitize_filename, sanitize_segment, stage_file, write_json_atomic,
    INDEX_FILE,
};

/// File-backed store of template images and their embeddings.
///
/// Layout: `<root>/<dish>/<file>` for images and `<root>/<dish>/embeddings.json`
/// for the dish's index. Mutations of one dish are serialized by a per-dish
/// lock; index documents are always replaced atomically, so unlocked readers
/// never observe a partially written document.
#[derive(Debug)]
pub struct TemplateStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// A mismatch between a dish's index and the files next to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inconsistency {
    /// The index lists a file that does not exist
    MissingImage {
        /// Dish name
        dish: String,
        /// Missing filename
        file: String,
    },
    /// An image file has no index entry
    UnindexedImage {
        /// Dish name
        dish: String,
        /// Orphaned filename
        file: String,
    },
}

impl TemplateStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        ensure_dir_exists(&root)?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Root directory holding one directory per dish
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dish_dir(&self, dish: &str) -> Result<PathBuf> {
        Ok(self.root.join(sanitize_segment("dish", dish)?))
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` while holding the lock of `dish`.
    ///
    /// The map entry is dropped again by the last holder, so the map only
    /// contains dishes that are being mutated right now.
    fn with_dish_lock<T>(&self, dish: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = Arc::clone(self.lock_map().entry(dish.to_string()).or_default());

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        // Clones are only taken under the map lock: a count of 2 (map + ours)
        // means nobody else is holding or waiting for this dish.
        let mut locks = self.lock_map();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(dish);
        }
        result
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.lock_map().len()
    }

    /// Save an image and its embedding under `dish`.
    ///
    /// The dish is created on first use. A template with the same filename is
    /// replaced: the image is overwritten and its index entry updated in place.
    /// On failure neither the image nor the index is changed.
    pub fn add(
        &self,
        dish: &str,
        filename: &str,
        image_bytes: &[u8],
        embedding: Vec<f32>,
    ) -> Result<TemplateRecord> {
        let dish_dir = self.dish_dir(dish)?;
        let filename = sanitize_filename(filename)?;
        let image_path = dish_dir.join(filename);
        let index_path = dish_dir.join(INDEX_FILE);

        self.with_dish_lock(dish, || {
            // An unreadable index fails the add before anything is written
            let previous = read_index(&index_path)?;
            let mut index = previous.clone().unwrap_or_default();
            let record = TemplateRecord::new(filename, embedding);
            let replaced = upsert(&mut index, record.clone());

            ensure_dir_exists(&dish_dir)?;
            let staged = stage_file(&dish_dir, image_bytes)?;
            write_json_atomic(&index_path, &index)?;

            if let Err(e) = staged.persist(&image_path) {
                let rollback = match &previous {
                    Some(previous) => write_json_atomic(&index_path, previous),
                    None => std::fs::remove_file(&index_path).map_err(AppError::from),
                };
                if let Err(rollback) = rollback {
                    log::error!("Failed to restore index of dish {}: {}", dish, rollback);
                }
                return Err(e.into());
            }

            if replaced {
                log::info!("Replaced template {}/{}", dish, filename);
            } else {
                log::info!("Added template {}/{} ({} in dish)", dish, filename, index.len());
            }
            Ok(record)
        })
    }

    /// Delete one template. Unknown dishes and files are not an error.
    ///
    /// The index entry goes first, so a failure never leaves an entry that
    /// points at a deleted image.
    pub fn remove_template(&self, dish: &str, filename: &str) -> Result<()> {
        let dish_dir = self.dish_dir(dish)?;
        let filename = sanitize_filename(filename)?;
        if !dish_dir.is_dir() {
            log::debug!("Dish {} does not exist, nothing to remove", dish);
            return Ok(());
        }

        self.with_dish_lock(dish, || {
            let index_path = dish_dir.join(INDEX_FILE);
            if let Some(mut index) = read_index(&index_path)? {
                let before = index.len();
                index.retain(|r| r.file != filename);
                if index.len() != before {
                    write_json_atomic(&index_path, &index)?;
                }
            }

            match std::fs::remove_file(dish_dir.join(filename)) {
                Ok(()) => log::info!("Removed template {}/{}", dish, filename),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::debug!("Template image {}/{} already absent", dish, filename)
                }
                Err(e) => return Err(e.into()),
            }
            Ok(())
        })
    }

    /// Recursively delete a dish and all of its templates
    pub fn remove_dish(&self, dish: &str) -> Result<()> {
        let dish_dir = self.dish_dir(dish)?;

        self.with_dish_lock(dish, || {
            if !dish_dir.is_dir() {
                return Err(AppError::NotFound(format!("dish {:?}", dish)));
            }
            std::fs::remove_dir_all(&dish_dir)?;
            log::info!("Removed dish {}", dish);
            Ok(())
        })
    }

    /// Read every dish's index, ordered by dish name.
    ///
    /// Dishes without a readable index are skipped.
    pub fn list_all(&self) -> Result<TemplateListing> {
        let mut listing = TemplateListing::new();
        for dish in self.dish_names()? {
            let index_path = self.root.join(&dish).join(INDEX_FILE);
            match read_index(&index_path) {
                Ok(Some(index)) => {
                    listing.insert(dish, index);
                }
                Ok(None) => {}
                Err(e) => log::warn!("Skipping dish {}: {}", dish, e),
            }
        }
        Ok(listing)
    }

    /// Report index entries without images and images without index entries
    pub fn audit(&self) -> Result<Vec<Inconsistency>> {
        let mut findings = Vec::new();
        for dish in self.dish_names()? {
            let dish_dir = self.root.join(&dish);
            let index = match read_index(&dish_dir.join(INDEX_FILE)) {
                Ok(index) => index.unwrap_or_default(),
                Err(e) => {
                    log::warn!("Cannot audit dish {}: {}", dish, e);
                    continue;
                }
            };

            let mut on_disk = BTreeSet::new();
            for entry in std::fs::read_dir(&dish_dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    if name != INDEX_FILE && !name.starts_with('.') {
                        on_disk.insert(name.to_string());
                    }
                }
            }

            let indexed: BTreeSet<&str> = index.iter().map(|r| r.file.as_str()).collect();
            for file in &indexed {
                if !on_disk.contains(*file) {
                    findings.push(Inconsistency::MissingImage {
                        dish: dish.clone(),
                        file: file.to_string(),
                    });
                }
            }
            for file in &on_disk {
                if !indexed.contains(file.as_str()) {
                    findings.push(Inconsistency::UnindexedImage {
                        dish: dish.clone(),
                        file: file.clone(),
                    });
                }
            }
        }
        Ok(findings)
    }

    fn dish_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if !name.starts_with('.') => names.push(name),
                Ok(_) => {}
                Err(name) => log::warn!("Skipping non UTF-8 dish directory {:?}", name),
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Read an index document; `None` if it does not exist
fn read_index(path: &Path) -> Result<Option<Vec<TemplateRecord>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, TemplateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::open(dir.path().join("templates_store")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_add_then_list_round_trip() {
        let (_dir, store) = open_store();
        let record = store.add("pizza", "a.jpg", b"jpeg-bytes", vec![0.6, 0.8]).unwrap();

        let listing = store.list_all().unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing["pizza"], vec![record]);
        assert_eq!(
            std::fs::read(store.root().join("pizza").join("a.jpg")).unwrap(),
            b"jpeg-bytes"
        );
    }

    #[test]
    fn test_duplicate_filename_replaces_entry() {
        let (_dir, store) = open_store();
        store.add("pizza", "a.jpg", b"first", vec![1.0, 0.0]).unwrap();
        store.add("pizza", "b.jpg", b"other", vec![0.0, 1.0]).unwrap();
        store.add("pizza", "a.jpg", b"second", vec![0.0, -1.0]).unwrap();

        let index = &store.list_all().unwrap()["pizza"];
        assert_eq!(index.len(), 2);
        assert_eq!(index[0], TemplateRecord::new("a.jpg", vec![0.0, -1.0]));
        assert_eq!(
            std::fs::read(store.root().join("pizza").join("a.jpg")).unwrap(),
            b"second"
        );
    }

    #[test]
    fn test_remove_template_is_idempotent() {
        let (_dir, store) = open_store();
        store.add("pizza", "a.jpg", b"a", vec![1.0]).unwrap();
        store.add("pizza", "b.jpg", b"b", vec![1.0]).unwrap();

        store.remove_template("pizza", "a.jpg").unwrap();
        let after_first = store.list_all().unwrap();
        assert_eq!(after_first["pizza"].len(), 1);
        assert!(!store.root().join("pizza").join("a.jpg").exists());

        store.remove_template("pizza", "a.jpg").unwrap();
        assert_eq!(store.list_all().unwrap(), after_first);

        // Unknown dish is a no-op and does not create a directory
        store.remove_template("soup", "x.jpg").unwrap();
        assert!(!store.root().join("soup").exists());
    }

    #[test]
    fn test_remove_dish() {
        let (_dir, store) = open_store();
        store.add("pizza", "a.jpg", b"a", vec![1.0]).unwrap();

        store.remove_dish("pizza").unwrap();
        assert!(store.list_all().unwrap().is_empty());
        assert!(matches!(store.remove_dish("pizza"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_rejects_path_traversal() {
        let (_dir, store) = open_store();
        assert!(matches!(
            store.add("../outside", "a.jpg", b"a", vec![1.0]),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            store.add("pizza", "../../a.jpg", b"a", vec![1.0]),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            store.add("pizza", "embeddings.json", b"[]", vec![1.0]),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(store.remove_dish(".."), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_list_skips_unreadable_dishes() {
        let (_dir, store) = open_store();
        store.add("pizza", "a.jpg", b"a", vec![1.0]).unwrap();

        std::fs::create_dir_all(store.root().join("empty")).unwrap();
        std::fs::create_dir_all(store.root().join("broken")).unwrap();
        std::fs::write(store.root().join("broken").join(INDEX_FILE), "{ nope").unwrap();
        std::fs::write(store.root().join("stray.txt"), "x").unwrap();

        let listing = store.list_all().unwrap();
        assert_eq!(listing.keys().collect::<Vec<_>>(), vec!["pizza"]);
    }

    #[test]
    fn test_listing_is_sorted_by_dish() {
        let (_dir, store) = open_store();
        for dish in ["sushi", "burger", "pizza"] {
            store.add(dish, "a.jpg", b"a", vec![1.0]).unwrap();
        }
        let listing = store.list_all().unwrap();
        assert_eq!(listing.keys().collect::<Vec<_>>(), vec!["burger", "pizza", "sushi"]);
    }

    #[test]
    fn test_audit_reports_mismatches() {
        let (_dir, store) = open_store();
        store.add("pizza", "a.jpg", b"a", vec![1.0]).unwrap();
        store.add("pizza", "b.jpg", b"b", vec![1.0]).unwrap();
        assert!(store.audit().unwrap().is_empty());

        std::fs::remove_file(store.root().join("pizza").join("a.jpg")).unwrap();
        std::fs::write(store.root().join("pizza").join("c.jpg"), "c").unwrap();

        let findings = store.audit().unwrap();
        assert_eq!(
            findings,
            vec![
                Inconsistency::MissingImage {
                    dish: "pizza".into(),
                    file: "a.jpg".into()
                },
                Inconsistency::UnindexedImage {
                    dish: "pizza".into(),
                    file: "c.jpg".into()
                },
            ]
        );
    }

    #[test]
    fn test_concurrent_adds_keep_every_entry() {
        let (_dir, store) = open_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .add("pizza", &format!("{}.jpg", i), b"img", vec![i as f32 + 1.0])
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.list_all().unwrap()["pizza"].len(), 8);
        assert_eq!(store.tracked_locks(), 0);
    }

    #[test]
    fn test_failed_add_changes_nothing() {
        let (_dir, store) = open_store();
        store.add("pizza", "a.jpg", b"original", vec![1.0]).unwrap();
        let dish_dir = store.root().join("pizza");
        std::fs::write(dish_dir.join(INDEX_FILE), "{ nope").unwrap();

        let err = store.add("pizza", "b.jpg", b"new", vec![1.0]).unwrap_err();
        assert!(matches!(err, AppError::Json(_)));
        assert!(!dish_dir.join("b.jpg").exists());

        let err = store.add("pizza", "a.jpg", b"replacement", vec![0.5]).unwrap_err();
        assert!(matches!(err, AppError::Json(_)));
        assert_eq!(std::fs::read(dish_dir.join("a.jpg")).unwrap(), b"original");

        // Only a.jpg and the index, no staged leftovers
        assert_eq!(std::fs::read_dir(&dish_dir).unwrap().count(), 2);
        assert_eq!(std::fs::read(dish_dir.join(INDEX_FILE)).unwrap(), b"{ nope");
    }

    #[test]
    fn test_failed_remove_keeps_image() {
        let (_dir, store) = open_store();
        store.add("pizza", "a.jpg", b"a", vec![1.0]).unwrap();
        let dish_dir = store.root().join("pizza");
        std::fs::write(dish_dir.join(INDEX_FILE), "{ nope").unwrap();

        assert!(store.remove_template("pizza", "a.jpg").is_err());
        assert!(dish_dir.join("a.jpg").exists());
    }

    #[test]
    fn test_lock_map_does_not_grow() {
        let (_dir, store) = open_store();
        for i in 0..100 {
            store.remove_template(&format!("ghost-{}", i), "x.jpg").unwrap();
            assert!(store.remove_dish(&format!("ghost-{}", i)).is_err());
        }
        assert_eq!(store.tracked_locks(), 0);

        store.add("pizza", "a.jpg", b"a", vec![1.0]).unwrap();
        store.remove_template("pizza", "a.jpg").unwrap();
        store.remove_dish("pizza").unwrap();
        assert_eq!(store.tracked_locks(), 0);
    }
}
