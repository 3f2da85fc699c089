//! Keeps a visible set current as the cache and the view change.
//!
//! Inputs are `watch` channels, which only ever hold the latest value, so
//! a burst of viewport changes collapses into one recomputation against
//! the newest state. Stale requests are never queued.

use std::sync::Arc;

use patrol_map_record_models::GeoRecord;
use patrol_map_stream::RecordCache;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{ViewMode, VisibleSet, visible_set};

/// Recomputes the visible set for one layer.
pub struct ViewportTracker<R> {
    cache: watch::Receiver<RecordCache<R>>,
    view: watch::Receiver<ViewMode>,
    output: watch::Sender<Arc<VisibleSet<R>>>,
}

impl<R: GeoRecord> ViewportTracker<R> {
    /// Creates a tracker and the receiver its results are published on.
    #[must_use]
    pub fn new(
        cache: watch::Receiver<RecordCache<R>>,
        view: watch::Receiver<ViewMode>,
    ) -> (Self, watch::Receiver<Arc<VisibleSet<R>>>) {
        let (output, rx) = watch::channel(Arc::new(VisibleSet::default()));
        (
            Self {
                cache,
                view,
                output,
            },
            rx,
        )
    }

    /// Computes the visible set from the current inputs and publishes it.
    pub fn refresh(&mut self) -> Arc<VisibleSet<R>> {
        let mode = self.view.borrow_and_update().clone();
        let visible = {
            let cache = self.cache.borrow_and_update();
            Arc::new(visible_set(cache.records(), &mode))
        };
        log::trace!(
            "{} visible set: {} records (k={})",
            R::KIND,
            visible.len(),
            visible.skip_factor
        );
        self.output.send_replace(visible.clone());
        visible
    }

    /// Refreshes on every input change until the view is closed or nobody
    /// is listening.
    ///
    /// A closed cache channel means the layer finished loading; its last
    /// value stays in use and view changes keep being applied to it.
    pub async fn run(mut self) {
        self.refresh();
        let mut cache_open = true;
        loop {
            tokio::select! {
                changed = self.cache.changed(), if cache_open => {
                    if changed.is_err() {
                        log::debug!("{} cache closed; tracking view changes only", R::KIND);
                        cache_open = false;
                        continue;
                    }
                }
                changed = self.view.changed() => if changed.is_err() { break },
                () = self.output.closed() => break,
            }
            self.refresh();
        }
        log::debug!("{} viewport tracker stopped", R::KIND);
    }
}

/// Spawns a [`ViewportTracker`] and returns its output.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn spawn_tracker<R: GeoRecord>(
    cache: watch::Receiver<RecordCache<R>>,
    view: watch::Receiver<ViewMode>,
) -> (watch::Receiver<Arc<VisibleSet<R>>>, JoinHandle<()>) {
    let (tracker, rx) = ViewportTracker::new(cache, view);
    (rx, tokio::spawn(tracker.run()))
}
