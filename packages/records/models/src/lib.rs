#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Record types carried by the patrol map row streams.
//!
//! Two record shapes exist: Dial 112 emergency calls and road accident
//! grid cells. Both carry a finite latitude/longitude pair; rows without
//! one never make it past the parser. The JSON field names are the wire
//! contract shared by the stream producer and consumer.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use strum_macros::{AsRefStr, Display, EnumString};

/// The kind of record a stream carries.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordKind {
    /// Dial 112 emergency calls
    EmergencyCall,
    /// Road accident hotspots
    Accident,
}

impl RecordKind {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::EmergencyCall, Self::Accident]
    }

    /// Minimum number of delimited fields a data line must have.
    #[must_use]
    pub const fn min_fields(self) -> usize {
        match self {
            Self::EmergencyCall => 7,
            Self::Accident => 8,
        }
    }

    /// Default number of buffered records that seals a consumer batch.
    ///
    /// Accident rows are sparser and heavier to render per row, so they
    /// are flushed in smaller batches.
    #[must_use]
    pub const fn default_batch_size(self) -> usize {
        match self {
            Self::EmergencyCall => 100,
            Self::Accident => 50,
        }
    }
}

/// A record with a validated position that can be placed on the map.
pub trait GeoRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The kind tag for this record type.
    const KIND: RecordKind;

    /// Latitude in degrees (always finite).
    fn latitude(&self) -> f64;

    /// Longitude in degrees (always finite).
    fn longitude(&self) -> f64;

    /// Weight of this record when drawn on a heatmap.
    fn heat_weight(&self) -> f64 {
        1.0
    }
}

/// A single Dial 112 emergency call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyCallRecord {
    /// Row number from the source file.
    pub id: String,
    /// Dispatch event identifier.
    pub event_id: String,
    /// Police station that handled the call.
    pub police_station: String,
    /// Call classification (e.g. "Women Harassment").
    pub call_type: String,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// When the call was received, verbatim from the source.
    pub received_at: String,
}

impl GeoRecord for EmergencyCallRecord {
    const KIND: RecordKind = RecordKind::EmergencyCall;

    fn latitude(&self) -> f64 {
        self.latitude
    }

    fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// A road accident grid cell with its national ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccidentRecord {
    /// Serial number from the source file.
    #[serde(alias = "srNo")]
    pub serial_no: String,
    /// State name.
    pub state: String,
    /// District name.
    pub district: String,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Grid cell identifier.
    pub grid_id: String,
    /// Number of accidents recorded in the cell (0 if unknown).
    pub accident_count: i64,
    /// All-India rank of the cell (0 if unknown).
    pub all_india_rank: i64,
    /// Nearest ambulance point, if listed.
    pub ambulance: String,
}

impl GeoRecord for AccidentRecord {
    const KIND: RecordKind = RecordKind::Accident;

    fn latitude(&self) -> f64 {
        self.latitude
    }

    fn longitude(&self) -> f64 {
        self.longitude
    }

    #[allow(clippy::cast_precision_loss)]
    fn heat_weight(&self) -> f64 {
        if self.accident_count == 0 {
            1.0
        } else {
            self.accident_count as f64
        }
    }
}
