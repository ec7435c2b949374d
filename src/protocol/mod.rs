// Protocol adapters: raw wire input -> PositionReport
//
// Every adapter is a pure function. A failed parse never touches device
// state; the caller rejects the input (HTTP) or drops the line (raw socket).

mod direct;
mod nmea;
mod osmand;
mod raw_line;

pub use direct::{parse_push, PushedPosition};
pub use nmea::parse_gprmc;
pub use osmand::{parse_osmand, parse_osmand_at};
pub use raw_line::parse_line;

use std::fmt;

/// Adapter failures
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A mandatory field is absent or could not be parsed
    MissingRequiredField(&'static str),
    /// NMEA sentence does not match the GPRMC grammar
    MalformedSentence(String),
    /// Raw-socket line is not `deviceId,lat,lon,speed,timestampMs`
    MalformedLine(String),
    /// Field parsed but lies outside its valid range
    OutOfRange { field: &'static str, value: f64 },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingRequiredField(field) => {
                write!(f, "missing or invalid required field '{}'", field)
            }
            ParseError::MalformedSentence(reason) => {
                write!(f, "malformed NMEA sentence: {}", reason)
            }
            ParseError::MalformedLine(reason) => write!(f, "malformed line: {}", reason),
            ParseError::OutOfRange { field, value } => {
                write!(f, "field '{}' out of range: {}", field, value)
            }
        }
    }
}

impl std::error::Error for ParseError {}
