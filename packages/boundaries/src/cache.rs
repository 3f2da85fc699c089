//! Load-once boundary cache with last-requester-wins cancellation.
//!
//! The parsed file is kept for the lifetime of the cache and shared by
//! reference. While no load has succeeded, each call to
//! [`BoundaryCache::load`] aborts whichever load is still in flight and
//! starts its own, so only the newest request can write the cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::future::{AbortHandle, Abortable};

use crate::{BoundaryError, BoundaryFile, BoundaryProvider};

/// Session cache for one boundary file.
pub struct BoundaryCache {
    provider: Arc<dyn BoundaryProvider>,
    loaded: RwLock<Option<Arc<BoundaryFile>>>,
    in_flight: Mutex<Option<(u64, AbortHandle)>>,
    next_request: AtomicU64,
}

impl BoundaryCache {
    /// Creates an empty cache backed by `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn BoundaryProvider>) -> Self {
        Self {
            provider,
            loaded: RwLock::new(None),
            in_flight: Mutex::new(None),
            next_request: AtomicU64::new(0),
        }
    }

    /// The cached file, if a load has completed.
    #[must_use]
    pub fn get(&self) -> Option<Arc<BoundaryFile>> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns `true` while a load is running.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Returns the cached file, loading it first if necessary.
    ///
    /// A failed load is not cached; the next call retries.
    ///
    /// # Errors
    ///
    /// * [`BoundaryError::Cancelled`] if a newer call superseded this one
    /// * Any error the provider returns
    pub async fn load(&self) -> Result<Arc<BoundaryFile>, BoundaryError> {
        if let Some(file) = self.get() {
            return Ok(file);
        }

        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (handle, registration) = AbortHandle::new_pair();
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((previous, previous_handle)) = in_flight.replace((id, handle)) {
                log::debug!("Boundary load {id} supersedes load {previous}");
                previous_handle.abort();
            }
        }

        let guard = InFlightGuard {
            in_flight: &self.in_flight,
            id,
        };
        let result = Abortable::new(self.provider.load(), registration).await;
        drop(guard);

        let Ok(result) = result else {
            return Err(BoundaryError::Cancelled);
        };

        let file = Arc::new(result?);
        let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        Ok(loaded.get_or_insert(file).clone())
    }
}

/// Clears the in-flight slot when its load finishes or its future is
/// dropped, unless a newer load has taken the slot.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<Option<(u64, AbortHandle)>>,
    id: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.as_ref().is_some_and(|(current, _)| *current == self.id) {
            *in_flight = None;
        }
    }
}
