#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Wire framing for the row streams.
//!
//! Each stream is a `text/event-stream` response made of blocks terminated
//! by a blank line:
//!
//! ```text
//! : stream start
//!
//! event: row
//! data: {"id":"1","latitude":20.0,...}
//!
//! event: done
//! data: end
//!
//! ```
//!
//! The comment block is sent once when the stream opens. There is no
//! resume support; a dropped stream is restarted from the beginning.

use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};

/// Text of the comment frame sent when a stream opens.
pub const STREAM_START_COMMENT: &str = "stream start";

/// Literal payload of the `done` event.
pub const DONE_PAYLOAD: &str = "end";

/// `Content-Type` of a row stream.
pub const CONTENT_TYPE: &str = "text/event-stream";

/// Response headers that keep intermediaries from caching or buffering a
/// stream.
pub const STREAM_HEADERS: [(&str, &str); 3] = [
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
    ("X-Accel-Buffering", "no"),
];

/// Named event types carried by a row stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    /// One JSON-encoded record.
    Row,
    /// End of input; payload is [`DONE_PAYLOAD`].
    Done,
}

/// One block of a server-sent event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A `:` comment line (keep-alive).
    Comment(String),
    /// An event with an optional `event:` name and its `data:` payload.
    Event {
        /// Value of the `event:` field, if any.
        event: Option<String>,
        /// The `data:` lines joined with `\n`.
        data: String,
    },
}

impl Frame {
    /// The comment frame that opens every stream.
    #[must_use]
    pub fn start() -> Self {
        Self::Comment(STREAM_START_COMMENT.to_string())
    }

    /// The frame that ends a fully read stream.
    #[must_use]
    pub fn done() -> Self {
        Self::Event {
            event: Some(EventType::Done.to_string()),
            data: DONE_PAYLOAD.to_string(),
        }
    }

    /// A `row` frame carrying `record` as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if the record cannot be serialized.
    pub fn row<T: Serialize>(record: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::Event {
            event: Some(EventType::Row.to_string()),
            data: serde_json::to_string(record)?,
        })
    }

    /// The event type, if this is an event with a recognised name.
    #[must_use]
    pub fn event_type(&self) -> Option<EventType> {
        match self {
            Self::Event {
                event: Some(event), ..
            } => event.parse().ok(),
            _ => None,
        }
    }

    /// Encodes the frame, including its terminating blank line.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Comment(text) => format!(": {text}\n\n"),
            Self::Event { event, data } => {
                let mut out = String::with_capacity(data.len() + 24);
                if let Some(event) = event {
                    out.push_str("event: ");
                    out.push_str(event);
                    out.push('\n');
                }
                for line in data.split('\n') {
                    out.push_str("data: ");
                    out.push_str(line);
                    out.push('\n');
                }
                out.push('\n');
                out
            }
        }
    }
}
