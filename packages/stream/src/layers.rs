//! Per-kind layer sessions.
//!
//! Each record kind has at most one [`LayerSession`]. Activating a kind
//! that already has a session does nothing; deactivating cancels the
//! stream and discards its cache, so the next activation starts over.

use std::sync::Arc;

use futures::future::{AbortHandle, Abortable};
use futures::stream::BoxStream;
use futures::{StreamExt as _, TryStreamExt as _};
use patrol_map_record_models::{AccidentRecord, EmergencyCallRecord, GeoRecord, RecordKind};
use patrol_map_records::registry::{LayerDefinition, layer_for};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::StreamError;
use crate::cache::RecordCache;
use crate::consumer::{batches, fill_cache};

/// Raw response body of a stream endpoint.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, StreamError>>;

/// Opens stream endpoints.
#[async_trait::async_trait]
pub trait RowSource: Send + Sync {
    /// Opens the stream served at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] if the endpoint cannot be opened.
    async fn open(&self, endpoint: &str) -> Result<ByteStream, StreamError>;
}

/// Opens stream endpoints on a running server over HTTP.
pub struct HttpRowSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRowSource {
    /// Creates a source for the server at `base_url`.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl RowSource for HttpRowSource {
    async fn open(&self, endpoint: &str) -> Result<ByteStream, StreamError> {
        let url = format!("{}{endpoint}", self.base_url);
        log::debug!("Opening stream {url}");

        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(StreamError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        Ok(resp
            .bytes_stream()
            .map_ok(|b| b.to_vec())
            .map_err(StreamError::from)
            .boxed())
    }
}

/// One streaming session for records of type `R`.
pub struct LayerSession<R> {
    cache: watch::Receiver<RecordCache<R>>,
    abort: AbortHandle,
    task: JoinHandle<()>,
}

impl<R: GeoRecord> LayerSession<R> {
    /// Starts streaming `endpoint` into a fresh cache.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn start(source: Arc<dyn RowSource>, endpoint: String, batch_size: usize) -> Self {
        let (tx, rx) = watch::channel(RecordCache::new());
        let (abort, registration) = AbortHandle::new_pair();

        let run = async move {
            let body = source.open(&endpoint).await?;
            fill_cache(batches::<R, _, _, _>(body, batch_size), &tx).await
        };

        let task = tokio::spawn(async move {
            match Abortable::new(run, registration).await {
                Ok(Ok(())) => log::info!("{} layer loaded", R::KIND),
                Ok(Err(e)) => log::warn!("{} stream closed: {e}", R::KIND),
                Err(_) => log::debug!("{} stream cancelled", R::KIND),
            }
        });

        Self {
            cache: rx,
            abort,
            task,
        }
    }

    /// Returns `true` while the stream is still in flight.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// A live view of the session cache.
    #[must_use]
    pub fn cache(&self) -> watch::Receiver<RecordCache<R>> {
        self.cache.clone()
    }

    /// Cancels the stream. The cache receives no further updates.
    pub fn cancel(&self) {
        self.abort.abort();
    }
}

impl<R> Drop for LayerSession<R> {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

/// Holds the session for each record kind.
pub struct LayerManager {
    source: Arc<dyn RowSource>,
    layers: Vec<LayerDefinition>,
    calls: Option<LayerSession<EmergencyCallRecord>>,
    accidents: Option<LayerSession<AccidentRecord>>,
}

impl LayerManager {
    /// Creates a manager with no active layers.
    #[must_use]
    pub fn new(source: Arc<dyn RowSource>, layers: Vec<LayerDefinition>) -> Self {
        Self {
            source,
            layers,
            calls: None,
            accidents: None,
        }
    }

    /// Turns a layer on. Returns `false` if it was already on.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UnknownLayer`] if no layer is registered for
    /// `kind`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn activate(&mut self, kind: RecordKind) -> Result<bool, StreamError> {
        if self.is_enabled(kind) {
            log::debug!("{kind} layer already active");
            return Ok(false);
        }

        let layer = layer_for(&self.layers, kind).ok_or(StreamError::UnknownLayer { kind })?;
        let endpoint = layer.endpoint.clone();
        let batch_size = layer.batch_size();
        let source = self.source.clone();

        log::info!("Activating {kind} layer from {endpoint}");
        match kind {
            RecordKind::EmergencyCall => {
                self.calls = Some(LayerSession::start(source, endpoint, batch_size));
            }
            RecordKind::Accident => {
                self.accidents = Some(LayerSession::start(source, endpoint, batch_size));
            }
        }

        Ok(true)
    }

    /// Turns a layer off, cancelling its stream and discarding its cache.
    /// Returns `false` if it was already off.
    pub fn deactivate(&mut self, kind: RecordKind) -> bool {
        let removed = match kind {
            RecordKind::EmergencyCall => self.calls.take().is_some(),
            RecordKind::Accident => self.accidents.take().is_some(),
        };
        if removed {
            log::info!("Deactivated {kind} layer");
        }
        removed
    }

    /// Returns `true` if the layer is switched on.
    #[must_use]
    pub const fn is_enabled(&self, kind: RecordKind) -> bool {
        match kind {
            RecordKind::EmergencyCall => self.calls.is_some(),
            RecordKind::Accident => self.accidents.is_some(),
        }
    }

    /// Returns `true` while the layer's stream is in flight.
    #[must_use]
    pub fn is_active(&self, kind: RecordKind) -> bool {
        match kind {
            RecordKind::EmergencyCall => self.calls.as_ref().is_some_and(LayerSession::is_active),
            RecordKind::Accident => self.accidents.as_ref().is_some_and(LayerSession::is_active),
        }
    }

    /// The emergency call cache, if that layer is on.
    #[must_use]
    pub fn calls(&self) -> Option<watch::Receiver<RecordCache<EmergencyCallRecord>>> {
        self.calls.as_ref().map(LayerSession::cache)
    }

    /// The accident cache, if that layer is on.
    #[must_use]
    pub fn accidents(&self) -> Option<watch::Receiver<RecordCache<AccidentRecord>>> {
        self.accidents.as_ref().map(LayerSession::cache)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::stream;
    use patrol_map_records::registry::all_layers;
    use patrol_map_stream_models::Frame;

    use super::*;

    /// Serves `rows` calls per open, waiting for `release` before `done`.
    struct FakeSource {
        opens: AtomicUsize,
        rows: usize,
        release: watch::Receiver<bool>,
    }

    #[async_trait::async_trait]
    impl RowSource for FakeSource {
        async fn open(&self, endpoint: &str) -> Result<ByteStream, StreamError> {
            assert_eq!(endpoint, "/stream/emergency-calls");
            self.opens.fetch_add(1, Ordering::SeqCst);

            let mut frames = vec![Frame::start().encode()];
            for i in 0..self.rows {
                frames.push(
                    Frame::row(&EmergencyCallRecord {
                        id: i.to_string(),
                        event_id: format!("E{i}"),
                        police_station: "Sinnar".to_string(),
                        call_type: "Theft".to_string(),
                        latitude: 20.0,
                        longitude: 73.0,
                        received_at: "t".to_string(),
                    })
                    .unwrap()
                    .encode(),
                );
            }

            let mut release = self.release.clone();
            let rows = stream::iter(frames.into_iter().map(|f| Ok(f.into_bytes())));
            let done = stream::once(async move {
                release.wait_for(|r| *r).await.ok();
                Ok(Frame::done().encode().into_bytes())
            });
            Ok(rows.chain(done).boxed())
        }
    }

    fn manager(rows: usize) -> (LayerManager, Arc<FakeSource>, watch::Sender<bool>) {
        let (release_tx, release) = watch::channel(false);
        let source = Arc::new(FakeSource {
            opens: AtomicUsize::new(0),
            rows,
            release,
        });
        (LayerManager::new(source.clone(), all_layers()), source, release_tx)
    }

    async fn wait_until_loaded(cache: &mut watch::Receiver<RecordCache<EmergencyCallRecord>>) {
        tokio::time::timeout(Duration::from_secs(5), cache.wait_for(RecordCache::is_complete))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn activation_is_idempotent_while_in_flight() {
        let (mut layers, source, release) = manager(10);

        assert!(layers.activate(RecordKind::EmergencyCall).unwrap());
        assert!(!layers.activate(RecordKind::EmergencyCall).unwrap());
        assert!(layers.is_enabled(RecordKind::EmergencyCall));
        assert!(!layers.is_enabled(RecordKind::Accident));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(layers.is_active(RecordKind::EmergencyCall));

        release.send(true).unwrap();
        let mut cache = layers.calls().unwrap();
        wait_until_loaded(&mut cache).await;

        assert_eq!(cache.borrow().len(), 10);
        assert_eq!(source.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reactivation_starts_a_fresh_cache() {
        let (mut layers, source, release) = manager(3);
        release.send(true).unwrap();

        layers.activate(RecordKind::EmergencyCall).unwrap();
        let mut first = layers.calls().unwrap();
        wait_until_loaded(&mut first).await;

        assert!(layers.deactivate(RecordKind::EmergencyCall));
        assert!(!layers.deactivate(RecordKind::EmergencyCall));
        assert!(layers.calls().is_none());

        layers.activate(RecordKind::EmergencyCall).unwrap();
        let mut second = layers.calls().unwrap();
        wait_until_loaded(&mut second).await;

        assert_eq!(second.borrow().len(), 3);
        assert_eq!(first.borrow().len(), 3);
        assert_eq!(source.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn deactivation_stops_cache_updates() {
        let (mut layers, _source, release) = manager(5);

        layers.activate(RecordKind::EmergencyCall).unwrap();
        let cache = layers.calls().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        layers.deactivate(RecordKind::EmergencyCall);

        release.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!cache.borrow().is_complete());
    }

    #[tokio::test]
    async fn unknown_layer_is_an_error() {
        let (release_tx, release) = watch::channel(false);
        drop(release_tx);
        let source = Arc::new(FakeSource {
            opens: AtomicUsize::new(0),
            rows: 0,
            release,
        });
        let mut layers = LayerManager::new(source, vec![]);
        assert!(matches!(
            layers.activate(RecordKind::Accident),
            Err(StreamError::UnknownLayer {
                kind: RecordKind::Accident
            })
        ));
    }
}
