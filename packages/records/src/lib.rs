#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Delimited record parsing and the streamable layer registry.
//!
//! [`parser`] turns raw CSV lines into validated [`GeoRecord`]s, and
//! [`registry`] describes which backing file feeds which stream endpoint.
//!
//! [`GeoRecord`]: patrol_map_record_models::GeoRecord

pub mod parser;
pub mod registry;

use thiserror::Error;

/// Errors that can occur while loading record configuration.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Layer definition TOML failed to parse.
    #[error("Layer definition parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error while reading a layer definition file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A layer definition is internally inconsistent.
    #[error("Invalid layer definition: {message}")]
    InvalidLayer {
        /// Description of what went wrong.
        message: String,
    },
}

/// Why a raw line did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Empty or whitespace-only line.
    Blank,
    /// Header line (first line of the file or a repeated header).
    Header,
    /// Fewer fields than the record kind requires.
    TooFewFields {
        /// Number of fields found.
        found: usize,
        /// Minimum number required.
        required: usize,
    },
    /// Latitude or longitude is missing, unparseable or not finite.
    InvalidCoordinates {
        /// Raw latitude text.
        latitude: String,
        /// Raw longitude text.
        longitude: String,
    },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blank => f.write_str("blank line"),
            Self::Header => f.write_str("header line"),
            Self::TooFewFields { found, required } => {
                write!(f, "expected at least {required} fields, found {found}")
            }
            Self::InvalidCoordinates {
                latitude,
                longitude,
            } => write!(f, "invalid coordinates: lat={latitude}, lng={longitude}"),
        }
    }
}
