#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API response types for the patrol map server.
//!
//! Row streams carry the record types directly; these are the JSON bodies
//! of everything else the server answers with.

use patrol_map_record_models::RecordKind;
use patrol_map_records::registry::LayerDefinition;
use serde::{Deserialize, Serialize};

/// Error body returned before a stream is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Always `false`.
    pub success: bool,
    /// What went wrong.
    pub error: String,
}

impl ApiError {
    /// Creates an error body.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

/// A streamable layer as listed by `GET /api/layers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLayer {
    /// Record kind.
    pub kind: RecordKind,
    /// Display name.
    pub name: String,
    /// Stream endpoint path.
    pub endpoint: String,
    /// Records per consumer batch.
    pub batch_size: usize,
    /// Whether the backing file is present.
    pub available: bool,
}

impl ApiLayer {
    /// Builds the listing entry for `layer`.
    #[must_use]
    pub fn new(layer: &LayerDefinition, available: bool) -> Self {
        Self {
            kind: layer.kind,
            name: layer.name.clone(),
            endpoint: layer.endpoint.clone(),
            batch_size: layer.batch_size(),
            available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_shape() {
        let json = serde_json::to_value(ApiError::new("CSV file not found")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": false, "error": "CSV file not found" })
        );
    }

    #[test]
    fn layer_uses_effective_batch_size() {
        let layer = LayerDefinition {
            kind: RecordKind::Accident,
            name: "Accidents".to_string(),
            endpoint: "/stream/accidents".to_string(),
            file: "accident_data.csv".to_string(),
            batch_size: None,
        };
        let json = serde_json::to_value(ApiLayer::new(&layer, true)).unwrap();
        assert_eq!(json["kind"], "accident");
        assert_eq!(json["batchSize"], 50);
        assert_eq!(json["available"], true);
    }
}
