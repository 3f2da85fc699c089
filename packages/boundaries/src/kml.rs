//! KML placemark extraction.
//!
//! Only the parts the map needs are read: each `Placemark`'s first
//! `name`, its first `coordinates` list, and any `SimpleData` key/value
//! pairs. Placemarks with a ring of three or more vertices become
//! boundaries; placemarks with numeric `latitude`/`longitude` metadata (or
//! a single coordinate) become markers. A placemark can be both.

use std::collections::BTreeMap;

use patrol_map_geometry_models::{BoundaryMarker, BoundaryPolygon, LatLng};
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::{BoundaryError, BoundaryFile, fallback_name, position_from_properties};

/// Where character data inside a placemark is currently routed.
enum TextTarget {
    None,
    Name,
    Coordinates,
    SimpleData(String),
}

#[derive(Default)]
struct PlacemarkBuilder {
    name: Option<String>,
    coordinates: Option<String>,
    properties: BTreeMap<String, String>,
}

impl PlacemarkBuilder {
    fn push_text(&mut self, target: &TextTarget, text: &str) {
        match target {
            TextTarget::None => {}
            TextTarget::Name => self.name.get_or_insert_with(String::new).push_str(text),
            TextTarget::Coordinates => self
                .coordinates
                .get_or_insert_with(String::new)
                .push_str(text),
            TextTarget::SimpleData(key) => self
                .properties
                .entry(key.clone())
                .or_default()
                .push_str(text),
        }
    }

    fn finish(mut self, index: usize, file: &mut BoundaryFile) {
        self.properties.retain(|_, v| !v.trim().is_empty());

        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| fallback_name(index));

        let vertices = self
            .coordinates
            .as_deref()
            .map(parse_coordinates)
            .unwrap_or_default();

        let position = position_from_properties(&self.properties)
            .or_else(|| vertices.first().copied().filter(|_| vertices.len() == 1));

        if let Some(position) = position {
            file.markers.push(BoundaryMarker {
                title: name.clone(),
                position,
                properties: self.properties.clone(),
            });
        }

        if vertices.len() >= 3 {
            file.boundaries.push(BoundaryPolygon {
                name,
                properties: self.properties,
                vertices,
            });
        }
    }
}

/// Parses a KML coordinate list (`lng,lat[,alt]` tuples separated by
/// whitespace). Tuples that fail to parse are dropped.
#[must_use]
pub fn parse_coordinates(text: &str) -> Vec<LatLng> {
    text.split_whitespace()
        .filter(|tuple| tuple.contains(','))
        .filter_map(|tuple| {
            let mut parts = tuple.split(',');
            let lng = parts.next()?.trim().parse::<f64>().ok()?;
            let lat = parts.next()?.trim().parse::<f64>().ok()?;
            (lat.is_finite() && lng.is_finite()).then_some(LatLng::new(lat, lng))
        })
        .collect()
}

/// Parses a KML document.
///
/// Anything before the XML declaration (stray whitespace or a BOM) is
/// ignored.
///
/// # Errors
///
/// Returns [`BoundaryError::Xml`] if the markup is malformed.
pub fn parse_kml(text: &str) -> Result<BoundaryFile, BoundaryError> {
    let cleaned = text.find("<?xml").map_or_else(|| text.trim(), |i| &text[i..]);

    let mut reader = Reader::from_str(cleaned);
    reader.config_mut().trim_text(true);

    let mut file = BoundaryFile::default();
    let mut current: Option<PlacemarkBuilder> = None;
    let mut target = TextTarget::None;
    let mut index = 0;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"Placemark" => {
                    current = Some(PlacemarkBuilder::default());
                    target = TextTarget::None;
                }
                b"name" if current.as_ref().is_some_and(|p| p.name.is_none()) => {
                    target = TextTarget::Name;
                }
                b"coordinates" if current.as_ref().is_some_and(|p| p.coordinates.is_none()) => {
                    target = TextTarget::Coordinates;
                }
                b"SimpleData" if current.is_some() => {
                    if let Some(attr) = e
                        .try_get_attribute("name")
                        .map_err(quick_xml::Error::from)?
                    {
                        target = TextTarget::SimpleData(attr.unescape_value()?.into_owned());
                    }
                }
                _ => {}
            },
            Event::Text(t) => {
                if let Some(placemark) = current.as_mut() {
                    placemark.push_text(&target, &t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(placemark) = current.as_mut() {
                    placemark.push_text(&target, &String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"Placemark" => {
                    if let Some(placemark) = current.take() {
                        placemark.finish(index, &mut file);
                        index += 1;
                    }
                    target = TextTarget::None;
                }
                b"name" | b"coordinates" | b"SimpleData" => target = TextTarget::None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(file)
}
