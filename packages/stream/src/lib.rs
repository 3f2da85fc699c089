#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incremental row streaming.
//!
//! The server side ([`producer`]) reads a backing record file one line at a
//! time and pushes framed `row` events through a bounded channel that is
//! drained by the HTTP response. When the client goes away the channel
//! closes and the producer stops at the next line.
//!
//! The client side ([`sse`], [`consumer`], [`layers`]) decodes the event
//! stream, seals records into fixed-size batches, releases sealed batches
//! at most once per paint tick, and appends them to a per-session
//! [`cache::RecordCache`].

pub mod cache;
pub mod consumer;
pub mod layers;
pub mod producer;
pub mod sse;

use std::path::PathBuf;

use patrol_map_record_models::RecordKind;
use thiserror::Error;

pub use cache::RecordCache;
pub use consumer::{ConsumerEvent, Subscription, batches, subscribe};
pub use layers::{HttpRowSource, LayerManager, LayerSession, RowSource};
pub use producer::{Producer, ProducerOutcome, ProducerState};

/// Errors that can occur while producing or consuming a row stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// I/O error reading the backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backing file for a stream does not exist.
    #[error("Backing file not found: {}", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The stream endpoint answered with a non-success status.
    #[error("Stream request to {url} failed: HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The transport failed mid-stream.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// The stream ended without a `done` event.
    #[error("Stream ended before the done event")]
    Truncated,

    /// No layer is registered for the record kind.
    #[error("No layer registered for {kind}")]
    UnknownLayer {
        /// The requested kind.
        kind: RecordKind,
    },
}
