//! Client side of a row stream.
//!
//! [`batches`] turns a raw byte stream into an async sequence of record
//! batches. Records are buffered until the buffer reaches the batch size,
//! at which point the buffer is sealed into a pending batch. Pending
//! batches are released on the next paint tick, so a burst of rows costs
//! at most one cache update per [`PAINT_INTERVAL`]. On `done`, everything
//! pending plus the partial buffer is released before
//! [`ConsumerEvent::Done`].

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::{AbortHandle, Abortable};
use futures::{FutureExt as _, Stream, StreamExt as _};
use patrol_map_record_models::GeoRecord;
use patrol_map_stream_models::{EventType, Frame};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::StreamError;
use crate::cache::RecordCache;
use crate::sse::SseDecoder;

/// Refresh cadence that sealed batches are released on.
pub const PAINT_INTERVAL: Duration = Duration::from_millis(16);

/// One item of the consumer's async sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerEvent<R> {
    /// Records to append to the cache, in arrival order.
    Batch(Vec<R>),
    /// The producer sent `done`; no more batches follow.
    Done,
}

/// Buffers decoded rows into fixed-size batches.
struct Batcher<R> {
    size: usize,
    buffer: Vec<R>,
    pending: VecDeque<Vec<R>>,
    malformed: u64,
}

impl<R: GeoRecord> Batcher<R> {
    fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            buffer: Vec::with_capacity(size),
            pending: VecDeque::new(),
            malformed: 0,
        }
    }

    /// Handles one frame. Returns `true` for `done`.
    fn accept(&mut self, frame: &Frame) -> bool {
        let Frame::Event { data, .. } = frame else {
            return false;
        };

        match frame.event_type() {
            Some(EventType::Row) => {
                match serde_json::from_str::<R>(data) {
                    Ok(record) => self.buffer.push(record),
                    Err(e) => {
                        self.malformed += 1;
                        log::debug!("Discarding malformed {} row: {e}", R::KIND);
                        return false;
                    }
                }
                if self.buffer.len() >= self.size {
                    let sealed = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.size));
                    self.pending.push_back(sealed);
                }
                false
            }
            Some(EventType::Done) => true,
            None => false,
        }
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn take_pending(&mut self) -> Vec<Vec<R>> {
        self.pending.drain(..).collect()
    }

    /// Releases every pending batch followed by the partial buffer.
    fn finish(&mut self) -> Vec<Vec<R>> {
        let mut out = self.take_pending();
        if !self.buffer.is_empty() {
            out.push(std::mem::take(&mut self.buffer));
        }
        out
    }
}

enum Wake<T> {
    Paint,
    Chunk(Option<T>),
}

/// Decodes `body` into batches of at most `batch_size` records.
///
/// Malformed `row` payloads are dropped. A transport error or an end of
/// input without `done` releases what was already decoded and then yields
/// one error; nothing is retried.
pub fn batches<R, S, B, E>(
    body: S,
    batch_size: usize,
) -> impl Stream<Item = Result<ConsumerEvent<R>, StreamError>>
where
    R: GeoRecord,
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        let mut body = std::pin::pin!(body);
        let mut decoder = SseDecoder::new();
        let mut batcher = Batcher::<R>::new(batch_size);
        let mut ticker = tokio::time::interval(PAINT_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let wake = tokio::select! {
                biased;
                _ = ticker.tick(), if batcher.has_pending() => Wake::Paint,
                chunk = body.next() => Wake::Chunk(chunk),
            };

            match wake {
                Wake::Paint => {
                    for batch in batcher.take_pending() {
                        yield Ok(ConsumerEvent::Batch(batch));
                    }
                }
                Wake::Chunk(Some(Ok(bytes))) => {
                    let mut done = false;
                    for frame in decoder.push(bytes.as_ref()) {
                        if batcher.accept(&frame) {
                            done = true;
                            break;
                        }
                    }
                    if done {
                        for batch in batcher.finish() {
                            yield Ok(ConsumerEvent::Batch(batch));
                        }
                        if batcher.malformed > 0 {
                            log::debug!("{} stream dropped {} malformed rows", R::KIND, batcher.malformed);
                        }
                        yield Ok(ConsumerEvent::Done);
                        return;
                    }
                }
                Wake::Chunk(Some(Err(e))) => {
                    for batch in batcher.finish() {
                        yield Ok(ConsumerEvent::Batch(batch));
                    }
                    yield Err(StreamError::Transport { message: e.to_string() });
                    return;
                }
                Wake::Chunk(None) => {
                    let done = decoder.finish().is_some_and(|frame| batcher.accept(&frame));
                    for batch in batcher.finish() {
                        yield Ok(ConsumerEvent::Batch(batch));
                    }
                    if done {
                        yield Ok(ConsumerEvent::Done);
                    } else {
                        yield Err(StreamError::Truncated);
                    }
                    return;
                }
            }
        }
    }
}

/// Applies a batch sequence to a cache until `done`.
///
/// Events that are ready together (the batches released by one paint
/// tick, or the final flush with `done`) are applied in a single cache
/// mutation. Each batch still counts separately in the cache.
///
/// # Errors
///
/// Returns the first error the sequence yields. Batches received before
/// the error stay in the cache.
pub async fn fill_cache<R, S>(
    events: S,
    cache: &watch::Sender<RecordCache<R>>,
) -> Result<(), StreamError>
where
    S: Stream<Item = Result<ConsumerEvent<R>, StreamError>>,
{
    let mut events = std::pin::pin!(events);
    while let Some(group) = next_ready_group(&mut events).await {
        let mut ready = Vec::with_capacity(group.len());
        let mut done = false;
        let mut error = None;
        for event in group {
            match event {
                Ok(ConsumerEvent::Batch(batch)) => ready.push(batch),
                Ok(ConsumerEvent::Done) => done = true,
                Err(e) => error = Some(e),
            }
        }

        if !ready.is_empty() || done {
            cache.send_modify(|c| {
                for batch in ready {
                    c.append(batch);
                }
                if done {
                    c.mark_complete();
                }
            });
        }
        if let Some(e) = error {
            return Err(e);
        }
        if done {
            return Ok(());
        }
    }
    Err(StreamError::Truncated)
}

/// Waits for the next event, then takes every event that is already ready
/// without waiting again. The group ends after `done` or an error.
async fn next_ready_group<R, S>(
    events: &mut Pin<&mut S>,
) -> Option<Vec<Result<ConsumerEvent<R>, StreamError>>>
where
    S: Stream<Item = Result<ConsumerEvent<R>, StreamError>>,
{
    let first = events.next().await?;
    let mut group = vec![first];
    while matches!(group.last(), Some(Ok(ConsumerEvent::Batch(_)))) {
        match events.next().now_or_never() {
            Some(Some(event)) => group.push(event),
            Some(None) | None => break,
        }
    }
    Some(group)
}

/// Handle returned by [`subscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    handle: AbortHandle,
    cancelled: Arc<AtomicBool>,
}

impl Subscription {
    /// Stops delivery and closes the transport. No callback runs after
    /// this returns.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.handle.abort();
    }

    /// Returns `true` once [`Self::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Callback-style wrapper over [`batches`].
///
/// `on_row` is called for each record in arrival order and `on_done` once
/// after the last one. Transport failures end the subscription without
/// calling `on_done`.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn subscribe<R, S, B, E, F, D>(body: S, batch_size: usize, mut on_row: F, on_done: D) -> Subscription
where
    R: GeoRecord,
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    F: FnMut(R) + Send + 'static,
    D: FnOnce() + Send + 'static,
{
    let (handle, registration) = AbortHandle::new_pair();
    let cancelled = Arc::new(AtomicBool::new(false));
    let subscription = Subscription { handle, cancelled };
    let guard = subscription.cancelled.clone();

    let task = async move {
        let mut events = std::pin::pin!(batches::<R, _, _, _>(body, batch_size));
        while let Some(event) = events.next().await {
            match event {
                Ok(ConsumerEvent::Batch(batch)) => {
                    for record in batch {
                        if guard.load(Ordering::SeqCst) {
                            return;
                        }
                        on_row(record);
                    }
                }
                Ok(ConsumerEvent::Done) => {
                    if !guard.load(Ordering::SeqCst) {
                        on_done();
                    }
                    return;
                }
                Err(e) => {
                    log::warn!("{} subscription closed: {e}", R::KIND);
                    return;
                }
            }
        }
    };

    tokio::spawn(async move {
        if Abortable::new(task, registration).await.is_err() {
            log::debug!("{} subscription cancelled", R::KIND);
        }
    });

    subscription
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::io::Cursor;
    use std::sync::Mutex;

    use futures::stream;
    use patrol_map_record_models::EmergencyCallRecord;
    use tokio::io::BufReader;
    use tokio::sync::mpsc;

    use super::*;
    use crate::producer::{Producer, ProducerOutcome};

    fn row(id: usize) -> String {
        format!(
            "event: row\ndata: {{\"id\":\"{id}\",\"eventId\":\"E{id}\",\"policeStation\":\"Sinnar\",\"callType\":\"Theft\",\"latitude\":20.0,\"longitude\":73.0,\"receivedAt\":\"t\"}}\n\n"
        )
    }

    fn chunks(frames: Vec<String>) -> impl Stream<Item = Result<Vec<u8>, Infallible>> {
        stream::iter(frames.into_iter().map(|f| Ok(f.into_bytes())))
    }

    async fn collect(
        body: impl Stream<Item = Result<Vec<u8>, Infallible>>,
        size: usize,
    ) -> Vec<Result<ConsumerEvent<EmergencyCallRecord>, StreamError>> {
        batches::<EmergencyCallRecord, _, _, _>(body, size).collect().await
    }

    fn batch_sizes(events: &[Result<ConsumerEvent<EmergencyCallRecord>, StreamError>]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                Ok(ConsumerEvent::Batch(b)) => Some(b.len()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn producer_to_cache_end_to_end() {
        let mut csv = String::from("#,Event_Id,Police_Station,Call_Type,Latitude,Longitude,Call_Recieved_Time\n");
        for i in 0..150 {
            csv.push_str(&format!("{i},E{i},Sinnar,Theft,20.5,73.{i:03},2024-01-01\n"));
            if i % 50 == 25 {
                csv.push_str(&format!("x{i},E,Sinnar,Theft,not-a-number,73.0,2024-01-01\n"));
            }
        }

        let (tx, mut rx) = mpsc::channel::<String>(8);
        let producer = tokio::spawn(async move {
            let mut producer = Producer::<EmergencyCallRecord>::new();
            producer.run(BufReader::new(Cursor::new(csv)), &tx).await
        });

        let body = stream::poll_fn(move |cx| rx.poll_recv(cx)).map(|f| Ok::<_, Infallible>(f.into_bytes()));
        let (cache_tx, cache_rx) = watch::channel(RecordCache::new());

        let mut sizes = Vec::new();
        let mut dones = 0;
        let events = batches::<EmergencyCallRecord, _, _, _>(body, 100).inspect(|e| match e {
            Ok(ConsumerEvent::Batch(b)) => sizes.push(b.len()),
            Ok(ConsumerEvent::Done) => dones += 1,
            Err(_) => {}
        });
        fill_cache(events, &cache_tx).await.unwrap();

        assert_eq!(
            producer.await.unwrap().unwrap(),
            ProducerOutcome::Completed { rows: 150, rejected: 3 }
        );
        assert_eq!(sizes, vec![100, 50]);
        assert_eq!(dones, 1);

        let cache = cache_rx.borrow();
        assert_eq!(cache.len(), 150);
        assert_eq!(cache.batches(), 2);
        assert!(cache.is_complete());
        assert!(cache.records().iter().all(|r| r.latitude.is_finite() && r.longitude.is_finite()));
        let ids: Vec<usize> = cache.records().iter().map(|r| r.id.parse().unwrap()).collect();
        assert_eq!(ids, (0..150).collect::<Vec<_>>());
    }

    fn call(id: usize) -> EmergencyCallRecord {
        EmergencyCallRecord {
            id: id.to_string(),
            event_id: String::new(),
            police_station: String::new(),
            call_type: String::new(),
            latitude: 20.0,
            longitude: 73.0,
            received_at: String::new(),
        }
    }

    #[tokio::test]
    async fn ready_batches_form_one_group() {
        let events = stream::iter(vec![
            Ok(ConsumerEvent::Batch(vec![call(0), call(1)])),
            Ok(ConsumerEvent::Batch(vec![call(2)])),
            Ok(ConsumerEvent::Done),
        ]);
        let mut events = std::pin::pin!(events);

        let group = next_ready_group(&mut events).await.unwrap();
        assert_eq!(group.len(), 3);
        assert!(matches!(group[2], Ok(ConsumerEvent::Done)));
        assert!(next_ready_group(&mut events).await.is_none());
    }

    #[tokio::test]
    async fn batches_split_by_a_wait_form_separate_groups() {
        let events = async_stream::stream! {
            yield Ok(ConsumerEvent::Batch(vec![call(0)]));
            yield Ok(ConsumerEvent::Batch(vec![call(1)]));
            tokio::time::sleep(Duration::from_millis(20)).await;
            yield Ok(ConsumerEvent::Batch(vec![call(2)]));
            yield Ok::<_, StreamError>(ConsumerEvent::Done);
        };
        let mut events = std::pin::pin!(events);

        assert_eq!(next_ready_group(&mut events).await.unwrap().len(), 2);
        assert_eq!(next_ready_group(&mut events).await.unwrap().len(), 2);
        assert!(next_ready_group(&mut events).await.is_none());
    }

    #[tokio::test]
    async fn one_tick_is_one_cache_update() {
        let events = stream::iter(vec![
            Ok(ConsumerEvent::Batch(vec![call(0), call(1)])),
            Ok(ConsumerEvent::Batch(vec![call(2)])),
            Ok(ConsumerEvent::Done),
        ]);
        let (cache_tx, mut cache_rx) = watch::channel(RecordCache::new());
        cache_rx.borrow_and_update();

        let observer = tokio::spawn(async move {
            let mut updates = 0;
            while cache_rx.changed().await.is_ok() {
                updates += 1;
                let cache = cache_rx.borrow_and_update();
                assert_eq!(cache.batches(), 2);
                assert!(cache.is_complete());
            }
            updates
        });
        tokio::task::yield_now().await;

        fill_cache(events, &cache_tx).await.unwrap();
        drop(cache_tx);
        assert_eq!(observer.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn malformed_rows_are_skipped() {
        let frames = vec![
            ": stream start\n\n".to_string(),
            row(1),
            "event: row\ndata: {not json\n\n".to_string(),
            "event: row\ndata: {\"id\":\"2\"}\n\n".to_string(),
            row(3),
            Frame::done().encode(),
        ];
        let events = collect(chunks(frames), 100).await;
        assert_eq!(batch_sizes(&events), vec![2]);
        assert!(matches!(events.last(), Some(Ok(ConsumerEvent::Done))));
    }

    #[tokio::test]
    async fn missing_done_is_truncated() {
        let events = collect(chunks(vec![row(1), row(2)]), 100).await;
        assert_eq!(batch_sizes(&events), vec![2]);
        assert!(matches!(events.last(), Some(Err(StreamError::Truncated))));
    }

    #[tokio::test]
    async fn transport_error_ends_the_sequence() {
        let body = stream::iter(vec![Ok(row(1).into_bytes()), Err("connection reset")]);
        let events: Vec<_> = batches::<EmergencyCallRecord, _, _, _>(body, 100).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], Err(StreamError::Transport { message }) if message == "connection reset"));
    }

    #[tokio::test]
    async fn subscribe_delivers_rows_then_done() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let frames = (0..5).map(row).chain(std::iter::once(Frame::done().encode())).collect();
        let _subscription = subscribe::<EmergencyCallRecord, _, _, _, _, _>(
            chunks(frames),
            2,
            move |r| sink.lock().unwrap().push(r.id),
            move || {
                done_tx.send(()).ok();
            },
        );

        done_rx.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["0", "1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn cancelled_subscription_stops_delivery() {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(4);
        let body = stream::poll_fn(move |cx| rx.poll_recv(cx)).map(Ok::<_, Infallible>);
        let seen = Arc::new(Mutex::new(0usize));
        let sink = seen.clone();
        let done = Arc::new(AtomicBool::new(false));
        let done_flag = done.clone();

        let subscription = subscribe::<EmergencyCallRecord, _, _, _, _, _>(
            body,
            1,
            move |_| *sink.lock().unwrap() += 1,
            move || done_flag.store(true, Ordering::SeqCst),
        );
        subscription.cancel();
        assert!(subscription.is_cancelled());

        tx.send(row(1).into_bytes()).await.ok();
        tx.send(Frame::done().encode().into_bytes()).await.ok();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*seen.lock().unwrap(), 0);
        assert!(!done.load(Ordering::SeqCst));
    }
}
