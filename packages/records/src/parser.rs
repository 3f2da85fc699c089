//! Line-level parsing for the two flat record files.
//!
//! [`parse_line`] is a pure function of one line. [`LineParser`] adds the
//! per-file state needed to drop the leading header line.

use std::marker::PhantomData;

use patrol_map_record_models::{AccidentRecord, EmergencyCallRecord, GeoRecord};

use crate::SkipReason;

/// Field delimiter used by both record files.
pub const DELIMITER: char = ',';

/// Signature of the repeated header row found in the accident export.
pub const ACCIDENT_HEADER_SIGNATURE: &str = "S.No,State name";

/// A record type that can be built from one delimited line.
pub trait ParseLine: GeoRecord {
    /// Returns `true` if the line is a repeated header for this file type.
    fn is_header(_line: &str) -> bool {
        false
    }

    /// Builds a record from fields already known to satisfy
    /// [`RecordKind::min_fields`](patrol_map_record_models::RecordKind::min_fields).
    ///
    /// # Errors
    ///
    /// Returns [`SkipReason::InvalidCoordinates`] if the position fields do
    /// not hold finite numbers.
    fn from_fields(fields: &[&str]) -> Result<Self, SkipReason>;
}

impl ParseLine for EmergencyCallRecord {
    // #,Event_Id,Police_Station,Call_Type,Latitude,Longitude,Call_Recieved_Time
    fn from_fields(fields: &[&str]) -> Result<Self, SkipReason> {
        let (latitude, longitude) = parse_position(fields[4], fields[5])?;

        Ok(Self {
            id: fields[0].trim().to_string(),
            event_id: fields[1].trim().to_string(),
            police_station: fields[2].trim().to_string(),
            call_type: fields[3].trim().to_string(),
            latitude,
            longitude,
            // Timestamps may themselves contain the delimiter.
            received_at: fields[6..].join(",").trim().to_string(),
        })
    }
}

impl ParseLine for AccidentRecord {
    fn is_header(line: &str) -> bool {
        line.contains(ACCIDENT_HEADER_SIGNATURE)
    }

    // Sr_No,State,District,Latitude,Longitude,Grid_ID,Accident_Count,All_India_Rank[,Ambulance]
    fn from_fields(fields: &[&str]) -> Result<Self, SkipReason> {
        let (latitude, longitude) = parse_position(fields[3], fields[4])?;

        Ok(Self {
            serial_no: fields[0].trim().to_string(),
            state: fields[1].trim().to_string(),
            district: fields[2].trim().to_string(),
            latitude,
            longitude,
            grid_id: fields[5].trim().to_string(),
            accident_count: parse_count(fields[6]),
            all_india_rank: parse_count(fields[7]),
            ambulance: fields
                .get(8)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        })
    }
}

/// Parses one raw line into a record of type `R`.
///
/// # Errors
///
/// Returns the [`SkipReason`] when the line is blank, a repeated header,
/// short of fields, or carries non-finite coordinates.
pub fn parse_line<R: ParseLine>(line: &str) -> Result<R, SkipReason> {
    if line.trim().is_empty() {
        return Err(SkipReason::Blank);
    }
    if R::is_header(line) {
        return Err(SkipReason::Header);
    }

    let fields: Vec<&str> = line.split(DELIMITER).collect();
    let required = R::KIND.min_fields();
    if fields.len() < required {
        return Err(SkipReason::TooFewFields {
            found: fields.len(),
            required,
        });
    }

    R::from_fields(&fields)
}

/// Parses a coordinate, accepting only finite numbers.
#[must_use]
pub fn parse_coordinate(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a best-effort integer count, defaulting to `0`.
///
/// Decimal values are truncated toward zero.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn parse_count(s: &str) -> i64 {
    let s = s.trim();
    s.parse::<i64>().unwrap_or_else(|_| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map_or(0, |v| v as i64)
    })
}

fn parse_position(lat: &str, lng: &str) -> Result<(f64, f64), SkipReason> {
    match (parse_coordinate(lat), parse_coordinate(lng)) {
        (Some(latitude), Some(longitude)) => Ok((latitude, longitude)),
        _ => Err(SkipReason::InvalidCoordinates {
            latitude: lat.trim().to_string(),
            longitude: lng.trim().to_string(),
        }),
    }
}

/// Stateful parser for one pass over a record file.
///
/// The first non-blank line of every file is its header and is always
/// skipped; everything else goes through [`parse_line`].
#[derive(Debug)]
pub struct LineParser<R> {
    header_seen: bool,
    accepted: u64,
    rejected: u64,
    _record: PhantomData<fn() -> R>,
}

impl<R: ParseLine> Default for LineParser<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ParseLine> LineParser<R> {
    /// Creates a parser positioned at the start of a file.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            header_seen: false,
            accepted: 0,
            rejected: 0,
            _record: PhantomData,
        }
    }

    /// Parses the next line of the file.
    ///
    /// # Errors
    ///
    /// Returns the [`SkipReason`] for lines that produce no record.
    pub fn parse(&mut self, line: &str) -> Result<R, SkipReason> {
        if line.trim().is_empty() {
            return Err(SkipReason::Blank);
        }
        if !self.header_seen {
            self.header_seen = true;
            return Err(SkipReason::Header);
        }

        match parse_line::<R>(line) {
            Ok(record) => {
                self.accepted += 1;
                Ok(record)
            }
            Err(reason) => {
                if !matches!(reason, SkipReason::Header) {
                    self.rejected += 1;
                }
                log::debug!("Skipping {} line: {reason}", R::KIND);
                Err(reason)
            }
        }
    }

    /// Number of records accepted so far.
    #[must_use]
    pub const fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Number of data lines rejected so far (headers and blanks excluded).
    #[must_use]
    pub const fn rejected(&self) -> u64 {
        self.rejected
    }
}
