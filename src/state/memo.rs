use crate::state::Snapshot;
use crate::{Ao3Error, Result};
use scraper::Html;
use std::sync::{Mutex, PoisonError};

/// Version tag used for values seeded without a snapshot
const SEEDED: u64 = 0;

/// A derived value memoized against a snapshot version
///
/// `resolve` returns the stored value while the version it was computed from
/// matches the current snapshot, and recomputes it otherwise. Values seeded
/// from listing pages are served only while the entity has no snapshot.
#[derive(Debug)]
pub struct Memo<T> {
    slot: Mutex<Option<(u64, T)>>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T: Clone> Clone for Memo<T> {
    fn clone(&self) -> Self {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        Self {
            slot: Mutex::new(slot.clone()),
        }
    }
}

impl<T: Clone> Memo<T> {
    /// Returns the memoized value, computing it from the snapshot if needed
    ///
    /// # Arguments
    ///
    /// * `snapshot` - The entity's current snapshot, if it has been loaded
    /// * `name` - Attribute name used in the `Unloaded` error
    /// * `compute` - Derives the value from the parsed page
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - The cached or freshly computed value
    /// * `Err(Ao3Error::Unloaded)` - No snapshot and no seeded value
    pub fn resolve<F>(&self, snapshot: Option<&Snapshot>, name: &str, compute: F) -> Result<T>
    where
        F: FnOnce(&Html) -> Result<T>,
    {
        let Some(snapshot) = snapshot else {
            let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            return match slot.as_ref() {
                Some((SEEDED, value)) => Ok(value.clone()),
                _ => Err(Ao3Error::unloaded(name)),
            };
        };

        let version = snapshot.version();
        {
            let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((cached, value)) = slot.as_ref() {
                if *cached == version {
                    return Ok(value.clone());
                }
            }
        }

        tracing::trace!(attribute = name, version, "Computing derived value");
        let value = compute(&*snapshot.document())?;
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some((version, value.clone()));
        Ok(value)
    }

    /// Stores a value that is served until a snapshot is loaded
    pub fn seed(&self, value: T) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some((SEEDED, value));
    }

    /// Drops any stored value
    pub fn clear(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
    }

    /// The snapshot version of the stored value, if any
    pub fn version(&self) -> Option<u64> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().map(|(version, _)| *version)
    }
}
