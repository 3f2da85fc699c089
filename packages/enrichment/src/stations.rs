//! Authoritative police station lists.

use patrol_map_geometry_models::StationLike;
use serde_json::Value;

use crate::EnrichmentError;

/// Keys that may hold the station array in a response body.
const LIST_KEYS: &[&str] = &["data", "items", "stations"];

/// Supplies the station pool used for nearest-station lookups.
#[async_trait::async_trait]
pub trait StationSource: Send + Sync {
    /// Fetches every known station.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichmentError`] if the stations cannot be fetched.
    async fn stations(&self) -> Result<Vec<StationLike>, EnrichmentError>;
}

/// Fetches stations from a JSON endpoint.
pub struct HttpStationSource {
    client: reqwest::Client,
    url: String,
}

impl HttpStationSource {
    /// Creates a source that reads `url`.
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait::async_trait]
impl StationSource for HttpStationSource {
    async fn stations(&self) -> Result<Vec<StationLike>, EnrichmentError> {
        log::info!("Fetching police stations from {}", self.url);

        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(EnrichmentError::Status {
                url: self.url.clone(),
                status: resp.status().as_u16(),
            });
        }

        let body: Value = resp.json().await?;
        let stations = parse_stations(&body);
        log::info!("Fetched {} police stations", stations.len());
        Ok(stations)
    }
}

/// Extracts stations from a response body.
///
/// The list is read from the first of `data`, `items` or `stations` that
/// is an array. Coordinates may be numbers or numeric strings; entries
/// with missing, unparseable or zero coordinates are dropped.
#[must_use]
pub fn parse_stations(body: &Value) -> Vec<StationLike> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        log::warn!("Station source reported success=false");
    }

    let Some(list) = LIST_KEYS
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_array))
    else {
        return Vec::new();
    };

    list.iter()
        .filter_map(|entry| {
            let lat = coordinate(entry.get("latitude")?)?;
            let lng = coordinate(entry.get("longitude")?)?;
            if lat.abs() < f64::EPSILON || lng.abs() < f64::EPSILON {
                return None;
            }
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            Some(StationLike { name, lat, lng })
        })
        .collect()
}

fn coordinate(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}
