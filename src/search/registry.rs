//! Handle-addressed store of loaded templates
//!
//! Handles come from a counter starting at [`FIRST_HANDLE`]; they increase
//! strictly and are never reused until [`TemplateStore::release_all`] resets
//! the counter. Decoding happens before the lock is taken, and lookups hand
//! out an `Arc` so matching never runs under the lock.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use super::template::Template;
use crate::error::{ScoutError, ScoutResult};
use crate::model::TemplateHandle;

/// First handle issued by a fresh or reset store
pub const FIRST_HANDLE: i32 = 1;

#[derive(Debug)]
struct Inner {
    next:      i32,
    templates: HashMap<TemplateHandle, Arc<Template>>,
}

/// Thread-safe template registry
#[derive(Debug)]
pub struct TemplateStore {
    inner: Mutex<Inner>,
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next:      FIRST_HANDLE,
                templates: HashMap::new(),
            }),
        }
    }

    /// Decodes the image at `path` and registers it
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn load(&self, path: &Path) -> ScoutResult<TemplateHandle> {
        let template = Template::from_path(path).inspect_err(|e| {
            tracing::warn!(error = %e, code = e.code(), "Failed to load template");
        })?;
        let (width, height) = template.dimensions();
        let handle = self.insert(template)?;
        tracing::info!(%handle, width, height, "Loaded template");
        Ok(handle)
    }

    /// Registers an already decoded template under the next handle
    pub fn insert(&self, template: Template) -> ScoutResult<TemplateHandle> {
        let mut inner = self.inner.lock();
        let handle = TemplateHandle::new(inner.next);
        inner.next = inner.next.checked_add(1).ok_or_else(|| {
            ScoutError::invalid_parameter("handle", "template handle space exhausted")
        })?;
        inner.templates.insert(handle, Arc::new(template));
        Ok(handle)
    }

    /// Looks up a template; a released or never-issued handle is a miss
    pub fn get(&self, handle: TemplateHandle) -> Option<Arc<Template>> {
        self.inner.lock().templates.get(&handle).cloned()
    }

    /// Removes one template, returning whether it was present
    pub fn release(&self, handle: TemplateHandle) -> bool {
        let removed = self.inner.lock().templates.remove(&handle).is_some();
        if removed {
            tracing::debug!(%handle, "Released template");
        }
        removed
    }

    /// Removes every template and restarts handle numbering
    pub fn release_all(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.templates.len();
        inner.templates.clear();
        inner.next = FIRST_HANDLE;
        drop(inner);

        tracing::info!(count, "Released all templates");
        count
    }

    pub fn contains(&self, handle: TemplateHandle) -> bool {
        self.inner.lock().templates.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn template() -> Template {
        Template::new(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]))).unwrap()
    }

    #[test]
    fn test_handles_increase_from_one() {
        let store = TemplateStore::new();
        let a = store.insert(template()).unwrap();
        let b = store.insert(template()).unwrap();
        let c = store.insert(template()).unwrap();

        assert_eq!(a.get(), FIRST_HANDLE);
        assert!(a < b && b < c);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_handles_not_reused_after_release() {
        let store = TemplateStore::new();
        let a = store.insert(template()).unwrap();
        assert!(store.release(a));

        let b = store.insert(template()).unwrap();
        assert_ne!(a, b);
        assert!(store.get(a).is_none());
    }

    #[test]
    fn test_release_is_idempotent() {
        let store = TemplateStore::new();
        let a = store.insert(template()).unwrap();

        assert!(store.release(a));
        assert!(!store.release(a));
        assert!(!store.release(TemplateHandle::new(999)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_release_all_resets_counter() {
        let store = TemplateStore::new();
        store.insert(template()).unwrap();
        store.insert(template()).unwrap();

        assert_eq!(store.release_all(), 2);
        assert!(store.is_empty());
        assert_eq!(store.insert(template()).unwrap().get(), FIRST_HANDLE);
    }

    #[test]
    fn test_fetched_template_outlives_release() {
        let store = TemplateStore::new();
        let a = store.insert(template()).unwrap();
        let held = store.get(a).unwrap();

        store.release(a);
        assert_eq!(held.dimensions(), (2, 2));
        assert!(!store.contains(a));
    }

    #[test]
    fn test_concurrent_inserts_are_unique() {
        let store = Arc::new(TemplateStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| store.insert(template()).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<TemplateHandle> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 200);
    }
}
