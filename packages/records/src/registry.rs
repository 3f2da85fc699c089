//! Registry of streamable record layers.
//!
//! Each layer binds a [`RecordKind`] to the HTTP endpoint that streams it,
//! the backing file it is read from, and the batch size the consumer
//! flushes at. The default set is embedded at compile time from
//! `layers.toml`; deployments can point at their own file instead.

use std::path::Path;

use patrol_map_record_models::RecordKind;
use serde::{Deserialize, Serialize};

use crate::RecordError;

#[cfg(test)]
const EXPECTED_LAYER_COUNT: usize = 2;

const LAYERS_TOML: &str = include_str!("../layers.toml");

/// A streamable record layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDefinition {
    /// Record kind carried by the layer.
    pub kind: RecordKind,
    /// Human-readable name (e.g. "Dial 112 Calls").
    pub name: String,
    /// HTTP path of the stream endpoint.
    pub endpoint: String,
    /// Backing file name, relative to the data directory.
    pub file: String,
    /// Consumer batch size; falls back to the kind's default.
    pub batch_size: Option<usize>,
}

impl LayerDefinition {
    /// Returns the effective consumer batch size for this layer.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
            .filter(|n| *n > 0)
            .unwrap_or_else(|| self.kind.default_batch_size())
    }
}

#[derive(Debug, Deserialize)]
struct LayerFile {
    #[serde(rename = "layer")]
    layers: Vec<LayerDefinition>,
}

/// Parses layer definitions from a TOML document.
///
/// # Errors
///
/// Returns [`RecordError`] if the TOML is malformed, an endpoint does not
/// start with `/`, or two layers share a kind or endpoint.
pub fn parse_layers(toml_str: &str) -> Result<Vec<LayerDefinition>, RecordError> {
    let file: LayerFile = toml::de::from_str(toml_str)?;

    for (i, layer) in file.layers.iter().enumerate() {
        if !layer.endpoint.starts_with('/') {
            return Err(RecordError::InvalidLayer {
                message: format!("endpoint '{}' must start with '/'", layer.endpoint),
            });
        }
        if file.layers[..i]
            .iter()
            .any(|other| other.kind == layer.kind || other.endpoint == layer.endpoint)
        {
            return Err(RecordError::InvalidLayer {
                message: format!("duplicate layer for {} at {}", layer.kind, layer.endpoint),
            });
        }
    }

    Ok(file.layers)
}

/// Loads layer definitions from a TOML file on disk.
///
/// # Errors
///
/// Returns [`RecordError`] if the file cannot be read or parsed.
pub fn load_layers(path: &Path) -> Result<Vec<LayerDefinition>, RecordError> {
    let contents = std::fs::read_to_string(path)?;
    parse_layers(&contents)
}

/// Returns the built-in layer definitions.
///
/// # Panics
///
/// Panics if the embedded `layers.toml` fails to parse. It is a
/// compile-time constant, so a failure is a development error caught by
/// the tests below.
#[must_use]
pub fn all_layers() -> Vec<LayerDefinition> {
    parse_layers(LAYERS_TOML)
        .unwrap_or_else(|e| panic!("Failed to parse embedded layers.toml: {e}"))
}

/// Finds the layer for a record kind.
#[must_use]
pub fn layer_for(layers: &[LayerDefinition], kind: RecordKind) -> Option<&LayerDefinition> {
    layers.iter().find(|l| l.kind == kind)
}
