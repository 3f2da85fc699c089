//! Server side of a row stream.
//!
//! A [`Producer`] owns one read cursor over one backing file. It encodes
//! every accepted record as a `row` frame and pushes it into a bounded
//! channel whose receiver feeds the HTTP response body. A failed send means
//! the receiver (and with it the connection) is gone; the producer then
//! stops without sending `done` and drops the file.

use std::borrow::Cow;
use std::marker::PhantomData;
use std::path::Path;

use patrol_map_record_models::{AccidentRecord, EmergencyCallRecord, RecordKind};
use patrol_map_records::parser::{LineParser, ParseLine};
use patrol_map_stream_models::Frame;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, BufReader};
use tokio::sync::mpsc;

use crate::StreamError;

/// Frames buffered between the producer and the response body.
pub const CHANNEL_CAPACITY: usize = 16;

/// Lifecycle of one producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    /// Created; nothing sent yet.
    Idle,
    /// The opening comment frame was sent.
    StreamStarted,
    /// At least one row was sent.
    EmittingRows,
    /// Input exhausted and `done` sent.
    Done,
    /// The consumer went away.
    ClientDisconnected,
    /// The file has been released.
    Closed,
}

impl ProducerState {
    /// Returns `true` if moving from `self` to `next` is a legal step.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::StreamStarted | Self::ClientDisconnected | Self::Closed)
                | (
                    Self::StreamStarted | Self::EmittingRows,
                    Self::EmittingRows | Self::Done | Self::ClientDisconnected | Self::Closed
                )
                | (Self::Done | Self::ClientDisconnected, Self::Closed)
        )
    }
}

/// How a producer run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerOutcome {
    /// Every line was read and `done` was sent.
    Completed {
        /// Rows sent.
        rows: u64,
        /// Data lines that failed validation.
        rejected: u64,
    },
    /// The consumer disconnected first.
    ClientDisconnected {
        /// Rows sent before the disconnect.
        rows: u64,
    },
}

/// Opens the backing file for a stream.
///
/// # Errors
///
/// * [`StreamError::NotFound`] if the file does not exist
/// * [`StreamError::Io`] for any other open failure
pub async fn open_source(path: &Path) -> Result<File, StreamError> {
    match File::open(path).await {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StreamError::NotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Streams records of type `R` from one reader.
#[derive(Debug)]
pub struct Producer<R> {
    state: ProducerState,
    parser: LineParser<R>,
    rows: u64,
    _record: PhantomData<fn() -> R>,
}

impl<R: ParseLine> Default for Producer<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ParseLine> Producer<R> {
    /// Creates an idle producer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ProducerState::Idle,
            parser: LineParser::new(),
            rows: 0,
            _record: PhantomData,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ProducerState {
        self.state
    }

    /// Rows sent so far.
    #[must_use]
    pub const fn rows(&self) -> u64 {
        self.rows
    }

    /// Reads `reader` to the end, sending frames to `tx`.
    ///
    /// The reader is consumed and dropped before this returns, so the
    /// producer always ends [`ProducerState::Closed`].
    ///
    /// # Errors
    ///
    /// * [`StreamError::Io`] if reading fails mid-stream
    /// * [`StreamError::Json`] if a record cannot be encoded
    pub async fn run<Rd>(
        &mut self,
        reader: Rd,
        tx: &mpsc::Sender<String>,
    ) -> Result<ProducerOutcome, StreamError>
    where
        Rd: AsyncBufRead + Unpin,
    {
        let result = self.pump(reader, tx).await;
        self.transition(ProducerState::Closed);
        result
    }

    async fn pump<Rd>(
        &mut self,
        mut reader: Rd,
        tx: &mpsc::Sender<String>,
    ) -> Result<ProducerOutcome, StreamError>
    where
        Rd: AsyncBufRead + Unpin,
    {
        if tx.send(Frame::start().encode()).await.is_err() {
            return Ok(self.disconnected());
        }
        self.transition(ProducerState::StreamStarted);

        let mut buf = Vec::new();
        loop {
            if tx.is_closed() {
                return Ok(self.disconnected());
            }
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = decode_line(&buf);
            let Ok(record) = self.parser.parse(&line) else {
                continue;
            };

            let frame = Frame::row(&record)?.encode();
            if tx.send(frame).await.is_err() {
                return Ok(self.disconnected());
            }
            self.rows += 1;
            if self.state != ProducerState::EmittingRows {
                self.transition(ProducerState::EmittingRows);
            }
        }

        if tx.send(Frame::done().encode()).await.is_err() {
            return Ok(self.disconnected());
        }
        self.transition(ProducerState::Done);

        Ok(ProducerOutcome::Completed {
            rows: self.rows,
            rejected: self.parser.rejected(),
        })
    }

    fn disconnected(&mut self) -> ProducerOutcome {
        self.transition(ProducerState::ClientDisconnected);
        ProducerOutcome::ClientDisconnected { rows: self.rows }
    }

    fn transition(&mut self, next: ProducerState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal producer transition {:?} -> {next:?}",
            self.state
        );
        log::trace!("{} producer {:?} -> {next:?}", R::KIND, self.state);
        self.state = next;
    }
}

/// Strips the line terminator and decodes, replacing invalid UTF-8.
fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw)
}

/// Spawns a producer for `R` over `file` and returns the frame receiver.
///
/// Dropping the receiver disconnects the producer.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
#[must_use]
pub fn spawn_producer<R: ParseLine>(file: File) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        log::info!("Starting {} stream", R::KIND);
        let mut producer = Producer::<R>::new();
        match producer.run(BufReader::new(file), &tx).await {
            Ok(ProducerOutcome::Completed { rows, rejected }) => {
                log::info!("Streamed {rows} {} records ({rejected} rejected)", R::KIND);
            }
            Ok(ProducerOutcome::ClientDisconnected { rows }) => {
                log::info!("Client disconnected, stopped {} stream at {rows} records", R::KIND);
            }
            Err(e) => log::error!("{} stream failed: {e}", R::KIND),
        }
    });

    rx
}

/// [`spawn_producer`] for a kind known only at runtime.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
#[must_use]
pub fn spawn_for_kind(kind: RecordKind, file: File) -> mpsc::Receiver<String> {
    match kind {
        RecordKind::EmergencyCall => spawn_producer::<EmergencyCallRecord>(file),
        RecordKind::Accident => spawn_producer::<AccidentRecord>(file),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn calls_csv(rows: usize) -> String {
        let mut csv = String::from("#,Event_Id,Police_Station,Call_Type,Latitude,Longitude,Call_Recieved_Time\n");
        for i in 0..rows {
            csv.push_str(&format!("{i},E{i},Sinnar,Theft,20.{i:04},73.5,2024-01-01 10:00\n"));
        }
        csv
    }

    #[tokio::test]
    async fn emits_start_rows_and_done() {
        let input = format!("{}\n1,E1,Sinnar,Theft,abc,73.5,t\n", calls_csv(3));
        let (tx, mut rx) = mpsc::channel(64);

        let mut producer = Producer::<EmergencyCallRecord>::new();
        let outcome = producer.run(BufReader::new(Cursor::new(input)), &tx).await.unwrap();
        drop(tx);

        assert_eq!(outcome, ProducerOutcome::Completed { rows: 3, rejected: 1 });
        assert_eq!(producer.state(), ProducerState::Closed);

        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[0], ": stream start\n\n");
        assert!(frames[1].starts_with("event: row\ndata: {\"id\":\"0\""));
        assert_eq!(frames[4], "event: done\ndata: end\n\n");
    }

    #[tokio::test]
    async fn stops_without_done_when_client_disconnects() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move {
            let mut producer = Producer::<EmergencyCallRecord>::new();
            let outcome = producer
                .run(BufReader::new(Cursor::new(calls_csv(1000))), &tx)
                .await;
            (outcome, producer.state())
        });

        let mut received = Vec::new();
        for _ in 0..6 {
            received.push(rx.recv().await.unwrap());
        }
        drop(rx);

        let (outcome, state) = handle.await.unwrap();
        let ProducerOutcome::ClientDisconnected { rows } = outcome.unwrap() else {
            panic!("expected a disconnect");
        };
        assert!(rows >= 5);
        assert!(rows < 1000);
        assert_eq!(state, ProducerState::Closed);
        assert!(received.iter().all(|f| !f.contains("event: done")));
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_end_stream() {
        let mut input = calls_csv(1).into_bytes();
        input.extend_from_slice(b"1,E1,Sin\xe9nar,Theft,20.1,73.5,2024-01-01 10:05\r\n");
        input.extend_from_slice(b"2,E2,Sinnar,Theft,20.2,73.5,2024-01-01 10:10\n");
        let (tx, mut rx) = mpsc::channel(64);

        let mut producer = Producer::<EmergencyCallRecord>::new();
        let outcome = producer.run(BufReader::new(Cursor::new(input)), &tx).await.unwrap();
        drop(tx);

        assert_eq!(outcome, ProducerOutcome::Completed { rows: 3, rejected: 0 });

        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 5);
        assert!(frames[2].contains("\"policeStation\":\"Sin\u{fffd}nar\""));
        assert!(frames[2].contains("\"receivedAt\":\"2024-01-01 10:05\""));
        assert!(frames[3].contains("\"eventId\":\"E2\""));
        assert_eq!(frames[4], "event: done\ndata: end\n\n");
    }

    #[test]
    fn decode_line_strips_terminators() {
        assert_eq!(decode_line(b"a,b\r\n"), "a,b");
        assert_eq!(decode_line(b"a,b\n"), "a,b");
        assert_eq!(decode_line(b"a,b"), "a,b");
        assert_eq!(decode_line(b"a\xffb\n"), "a\u{fffd}b");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let path = std::env::temp_dir().join("patrol_map_stream_missing.csv");
        assert!(matches!(
            open_source(&path).await,
            Err(StreamError::NotFound { .. })
        ));
    }

    #[test]
    fn done_only_follows_started_stream() {
        assert!(ProducerState::Idle.can_transition_to(ProducerState::StreamStarted));
        assert!(!ProducerState::Idle.can_transition_to(ProducerState::Done));
        assert!(ProducerState::EmittingRows.can_transition_to(ProducerState::ClientDisconnected));
        assert!(ProducerState::StreamStarted.can_transition_to(ProducerState::Done));
        assert!(!ProducerState::Done.can_transition_to(ProducerState::EmittingRows));
        assert!(!ProducerState::Closed.can_transition_to(ProducerState::Idle));
    }
}
