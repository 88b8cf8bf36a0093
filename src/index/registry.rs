use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::line_index::{IndexUpdate, LineIndex, Progress, SourceSignature};
use crate::error::{Error, Result};

type Slot = Arc<Mutex<Option<Arc<LineIndex>>>>;

/// Line indexes keyed by file path.
///
/// Each path has its own slot mutex: the first caller scans while concurrent
/// callers for the same path wait on the slot and then reuse the result.
/// Different paths never block each other beyond the brief map lookup.
///
/// Open sources register as holders of a path; the index is evicted when
/// the last holder releases it.
#[derive(Debug, Default)]
pub struct IndexRegistry {
    slots: Mutex<HashMap<PathBuf, Slot>>,
    holders: Mutex<HashMap<PathBuf, usize>>,
    progress: Option<Progress>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report scan progress for every build and update through `progress`.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    fn slot(&self, path: &Path) -> Result<Slot> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| Error::Poisoned(path.to_path_buf()))?;
        Ok(Arc::clone(slots.entry(path.to_path_buf()).or_default()))
    }

    fn existing_slot(&self, path: &Path) -> Option<Slot> {
        self.slots.lock().ok()?.get(path).cloned()
    }

    /// Return the registered index if its signature still matches the file,
    /// otherwise scan the file and register the result.
    pub fn build_index(&self, path: &Path) -> Result<Arc<LineIndex>> {
        let slot = self.slot(path)?;
        let mut guard = slot
            .lock()
            .map_err(|_| Error::Poisoned(path.to_path_buf()))?;

        if let Some(existing) = guard.as_ref() {
            match SourceSignature::read(path) {
                Ok(signature) if signature == existing.signature() => {
                    return Ok(Arc::clone(existing));
                }
                Ok(_) => debug!(path = %path.display(), "signature mismatch, rebuilding index"),
                Err(e) => {
                    *guard = None;
                    return Err(e);
                }
            }
        }

        let index = Arc::new(LineIndex::build(path, self.progress.as_ref())?);
        *guard = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Extend the registered index for tail growth, rebuilding when the
    /// change was not a pure append. Builds if nothing is registered.
    pub fn update_index(&self, path: &Path) -> Result<(Arc<LineIndex>, IndexUpdate)> {
        let slot = self.slot(path)?;
        let mut guard = slot
            .lock()
            .map_err(|_| Error::Poisoned(path.to_path_buf()))?;

        match guard.as_mut() {
            Some(index) => {
                // Copy-on-write only if a reader still holds the old version.
                let outcome = Arc::make_mut(index).update(path, self.progress.as_ref())?;
                Ok((Arc::clone(index), outcome))
            }
            None => {
                let index = Arc::new(LineIndex::build(path, self.progress.as_ref())?);
                *guard = Some(Arc::clone(&index));
                Ok((index, IndexUpdate::Rebuilt))
            }
        }
    }

    /// Rebuild unconditionally, ignoring the stored signature.
    pub fn rebuild(&self, path: &Path) -> Result<Arc<LineIndex>> {
        let slot = self.slot(path)?;
        let mut guard = slot
            .lock()
            .map_err(|_| Error::Poisoned(path.to_path_buf()))?;

        let index = Arc::new(LineIndex::build(path, self.progress.as_ref())?);
        *guard = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Registered index without any freshness check.
    pub fn get(&self, path: &Path) -> Option<Arc<LineIndex>> {
        let slot = self.existing_slot(path)?;
        let guard = slot.lock().ok()?;
        guard.as_ref().map(Arc::clone)
    }

    pub fn total_lines(&self, path: &Path) -> Result<usize> {
        Ok(self.build_index(path)?.total_lines())
    }

    /// True if nothing is indexed for `path`, the file is gone, or its
    /// signature changed since the index was built.
    pub fn is_modified(&self, path: &Path) -> bool {
        let Some(index) = self.get(path) else {
            return true;
        };
        match SourceSignature::read(path) {
            Ok(signature) => signature != index.signature(),
            Err(_) => true,
        }
    }

    /// Register one more source reading the index for `path`.
    pub fn acquire(&self, path: &Path) {
        if let Ok(mut holders) = self.holders.lock() {
            *holders.entry(path.to_path_buf()).or_insert(0) += 1;
        }
    }

    /// Drop one holder of `path`, evicting the index when it was the last.
    /// Returns whether the index was evicted.
    pub fn release(&self, path: &Path) -> bool {
        let Ok(mut holders) = self.holders.lock() else {
            return false;
        };
        match holders.get_mut(path) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            _ => {
                holders.remove(path);
                self.evict(path)
            }
        }
    }

    /// Number of open sources holding `path`.
    pub fn holders(&self, path: &Path) -> usize {
        self.holders
            .lock()
            .ok()
            .and_then(|holders| holders.get(path).copied())
            .unwrap_or(0)
    }

    /// Evict `path` only if no source holds it.
    pub fn evict_unused(&self, path: &Path) -> bool {
        match self.holders.lock() {
            Ok(holders) if !holders.contains_key(path) => self.evict(path),
            _ => false,
        }
    }

    /// Drop the index for one path regardless of holders. Returns whether
    /// one was registered.
    pub fn evict(&self, path: &Path) -> bool {
        match self.slots.lock() {
            Ok(mut slots) => slots.remove(path).is_some(),
            Err(_) => false,
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.clear();
        }
    }

    /// Number of registered paths.
    pub fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
