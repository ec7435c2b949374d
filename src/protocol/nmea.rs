use super::ParseError;
use crate::position::{self, PositionRecord, PositionReport, PositionStatus, PowerSignal};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

const KNOTS_TO_KMH: f64 = 1.852;

/// Parses a `$GPRMC` sentence reported on behalf of `device_id`.
///
/// Grammar:
/// `$GPRMC,hhmmss[.ss],{A|V},ddmm.mmmm,{N|S},dddmm.mmmm,{E|W},speed,bearing,ddmmyy[,...][*hh]`
///
/// The status field is read as a power signal: `A` is powered on, `V`
/// powered off. A `V` sentence only has to match the grammar; its
/// coordinates are not range-checked since the fix is never stored.
/// Speed arrives in knots and is stored in km/h.
pub fn parse_gprmc(device_id: &str, sentence: &str) -> Result<PositionReport, ParseError> {
    if device_id.trim().is_empty() {
        return Err(ParseError::MissingRequiredField("id"));
    }

    let body = strip_framing(sentence.trim())?;
    let fields: Vec<&str> = body.split(',').collect();

    if fields[0] != "GPRMC" {
        return Err(malformed(format!("unexpected sentence type '{}'", fields[0])));
    }
    if fields.len() < 10 {
        return Err(malformed(format!("expected at least 10 fields, got {}", fields.len())));
    }

    let time = parse_time(fields[1])?;

    let (power, status) = match fields[2] {
        "A" => (PowerSignal::On, PositionStatus::Active),
        "V" => (PowerSignal::Off, PositionStatus::Inactive),
        other => return Err(malformed(format!("invalid status '{}'", other))),
    };

    let check_range = power != PowerSignal::Off;
    let latitude = parse_coordinate(fields[3], fields[4], 2, ('N', 'S'), check_range)?;
    let longitude = parse_coordinate(fields[5], fields[6], 3, ('E', 'W'), check_range)?;

    let speed_knots = optional_number("speed", fields[7])?;
    if speed_knots < 0.0 {
        return Err(malformed(format!("negative speed '{}'", fields[7])));
    }
    let bearing = optional_number("bearing", fields[8])?.rem_euclid(360.0);

    let date = parse_date(fields[9])?;
    let timestamp_ms = NaiveDateTime::new(date, time).and_utc().timestamp_millis();

    let record = PositionRecord {
        device_id: device_id.trim().to_string(),
        latitude,
        longitude,
        speed: speed_knots * KNOTS_TO_KMH,
        bearing,
        altitude: None,
        accuracy: None,
        battery: None,
        timestamp_ms,
        status,
    };

    if check_range {
        position::validate(&record)?;
    }

    Ok(PositionReport::new(record, power))
}

fn malformed(reason: impl Into<String>) -> ParseError {
    ParseError::MalformedSentence(reason.into())
}

/// Strips `$` and an optional `*hh` checksum, verifying the checksum when present.
fn strip_framing(sentence: &str) -> Result<&str, ParseError> {
    let without_dollar = sentence
        .strip_prefix('$')
        .ok_or_else(|| malformed("sentence must start with '$'"))?;

    match without_dollar.split_once('*') {
        None => Ok(without_dollar),
        Some((body, checksum)) => {
            let expected = u8::from_str_radix(checksum, 16)
                .ok()
                .filter(|_| checksum.len() == 2)
                .ok_or_else(|| malformed(format!("invalid checksum field '{}'", checksum)))?;
            let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);
            if actual != expected {
                return Err(malformed(format!(
                    "checksum mismatch: expected {:02X}, computed {:02X}",
                    expected, actual
                )));
            }
            Ok(body)
        }
    }
}

/// `hhmmss` with an optional fractional second part.
fn parse_time(field: &str) -> Result<NaiveTime, ParseError> {
    let (whole, fraction) = match field.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (field, None),
    };

    if whole.len() != 6 || !all_digits(whole) {
        return Err(malformed(format!("invalid time '{}'", field)));
    }

    let millis = match fraction {
        None => 0,
        Some(f) if !f.is_empty() && all_digits(f) => {
            // Scale the fraction to exactly three digits
            let padded = format!("{:0<3}", f);
            padded[..3].parse::<u32>().unwrap_or(0)
        }
        Some(_) => return Err(malformed(format!("invalid time '{}'", field))),
    };

    let hh = whole[0..2].parse::<u32>().unwrap_or(u32::MAX);
    let mm = whole[2..4].parse::<u32>().unwrap_or(u32::MAX);
    let ss = whole[4..6].parse::<u32>().unwrap_or(u32::MAX);

    NaiveTime::from_hms_milli_opt(hh, mm, ss, millis)
        .ok_or_else(|| malformed(format!("invalid time '{}'", field)))
}

/// `ddmmyy`; two-digit years follow chrono's 1969..2068 window.
fn parse_date(field: &str) -> Result<NaiveDate, ParseError> {
    if field.len() != 6 || !all_digits(field) {
        return Err(malformed(format!("invalid date '{}'", field)));
    }
    NaiveDate::parse_from_str(field, "%d%m%y")
        .map_err(|_| malformed(format!("invalid date '{}'", field)))
}

/// Degrees-minutes coordinate (`ddmm.mmmm` / `dddmm.mmmm`) with hemisphere.
fn parse_coordinate(
    value: &str,
    hemisphere: &str,
    degree_digits: usize,
    (positive, negative): (char, char),
    check_range: bool,
) -> Result<f64, ParseError> {
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (value, ""),
    };

    if whole.len() != degree_digits + 2 || !all_digits(whole) || !all_digits(fraction) {
        return Err(malformed(format!("invalid coordinate '{}'", value)));
    }

    let degrees: f64 = whole[..degree_digits]
        .parse()
        .map_err(|_| malformed(format!("invalid coordinate '{}'", value)))?;
    let minutes: f64 = format!("{}.{}0", &whole[degree_digits..], fraction)
        .parse()
        .map_err(|_| malformed(format!("invalid coordinate '{}'", value)))?;

    if minutes >= 60.0 {
        return Err(malformed(format!("invalid coordinate minutes '{}'", value)));
    }

    let max_degrees = if degree_digits == 2 { 90.0 } else { 180.0 };
    if check_range && degrees + minutes / 60.0 > max_degrees {
        return Err(malformed(format!("coordinate out of range '{}'", value)));
    }

    let decimal = degrees + minutes / 60.0;

    let mut chars = hemisphere.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c == positive => Ok(decimal),
        (Some(c), None) if c == negative => Ok(-decimal),
        _ => Err(malformed(format!("invalid hemisphere '{}'", hemisphere))),
    }
}

fn optional_number(name: &str, field: &str) -> Result<f64, ParseError> {
    if field.is_empty() {
        return Ok(0.0);
    }
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| malformed(format!("invalid {} '{}'", name, field)))
}

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}
