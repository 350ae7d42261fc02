//! Label-anchored extraction of readings from the feed body
//!
//! The body is treated as text with a known layout rather than as a JSON
//! document. Extraction follows a small set of named grammar rules:
//!
//! ```text
//! status_field   := "\"status\"" ws ":" ws string
//! readings_field := "\"readings\"" ws ":" ws "[" ( object ( "," object )* )? "]"
//! object         := "{" pair ( "," pair )* "}"
//! pair           := string ws ":" ws scalar
//! ```
//!
//! Only the `station_id` and `value` pairs of each object are interpreted.
//! Brackets and braces inside quoted strings do not delimit anything. Inside
//! the readings list only objects, commas and whitespace are accepted.

use super::{ParsedFeed, Reading, StatusInfo};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Label of the feed status field
pub const STATUS_LABEL: &str = "status";
/// Label of the readings list
pub const READINGS_LABEL: &str = "readings";
/// Field carrying the station identifier inside a reading object
pub const STATION_ID_FIELD: &str = "station_id";
/// Field carrying the measured value inside a reading object
pub const VALUE_FIELD: &str = "value";

static STATUS_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""status"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("status rule is a valid regex")
});

static READINGS_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""readings"\s*:\s*\["#).expect("readings rule is a valid regex")
});

static PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""((?:[^"\\]|\\.)*)"\s*:\s*("(?:[^"\\]|\\.)*"|[^,\s]+)"#)
        .expect("pair rule is a valid regex")
});

/// Feed extraction errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Feed body has no '{section}' section")]
    MissingSection { section: &'static str },
    #[error("Malformed number in '{field}': {text:?}")]
    MalformedNumber { field: &'static str, text: String },
    #[error("Unexpected content in '{section}': {text:?}")]
    UnexpectedContent { section: &'static str, text: String },
}

/// Extract the ordered readings and the status string from a feed body
///
/// Every reading object is returned, including stations nobody routes;
/// filtering happens at publish time.
pub fn parse_feed(body: &str) -> Result<ParsedFeed, ParseError> {
    if body.trim().is_empty() {
        return Err(ParseError::MissingSection { section: "body" });
    }

    let status = parse_status(body)?;
    let readings = parse_readings(body)?;

    Ok(ParsedFeed { readings, status })
}

/// Extract the status string, delimited by its closing quote
pub fn parse_status(body: &str) -> Result<StatusInfo, ParseError> {
    let captures = STATUS_FIELD
        .captures(body)
        .ok_or(ParseError::MissingSection {
            section: STATUS_LABEL,
        })?;

    Ok(StatusInfo::new(unescape(&captures[1])))
}

/// Extract every reading object of the readings list, in order
pub fn parse_readings(body: &str) -> Result<Vec<Reading>, ParseError> {
    readings_objects(body)?
        .into_iter()
        .map(parse_object)
        .collect()
}

/// The bodies of the objects in the readings list, braces stripped
fn readings_objects(body: &str) -> Result<Vec<&str>, ParseError> {
    let missing = ParseError::MissingSection {
        section: READINGS_LABEL,
    };

    let open = READINGS_FIELD.find(body).ok_or(missing.clone())?;
    let list = &body[open.end()..];

    let mut objects = Vec::new();
    let mut pos = 0;
    loop {
        let rest = &list[pos..];
        let Some(c) = rest.chars().next() else {
            return Err(missing);
        };
        match c {
            ']' => return Ok(objects),
            '{' => {
                let len = object_len(rest).ok_or(missing.clone())?;
                objects.push(&rest[1..len - 1]);
                pos += len;
            }
            c if c == ',' || c.is_whitespace() => pos += c.len_utf8(),
            _ => return Err(unexpected(READINGS_LABEL, rest)),
        }
    }
}

/// Byte length of the object starting at `text`, closing brace included
fn object_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_object(object: &str) -> Result<Reading, ParseError> {
    let mut station = None;
    let mut value = None;
    let mut cursor = 0;

    for pair in PAIR.captures_iter(object) {
        let whole = pair.get(0).map_or(cursor..cursor, |m| m.range());
        expect_separator(&object[cursor..whole.start])?;
        cursor = whole.end;

        let raw = pair.get(2).map_or("", |m| m.as_str());
        match pair.get(1).map_or("", |m| m.as_str()) {
            STATION_ID_FIELD if station.is_none() => station = Some(raw),
            VALUE_FIELD if value.is_none() => value = Some(raw),
            _ => {}
        }
    }
    expect_separator(&object[cursor..])?;

    let station = station.ok_or(ParseError::MissingSection {
        section: STATION_ID_FIELD,
    })?;
    let value = value.ok_or(ParseError::MissingSection {
        section: VALUE_FIELD,
    })?;

    Ok(Reading::new(
        parse_station_id(station)?,
        parse_value(value)?,
    ))
}

/// Text between pairs may only be commas and whitespace
fn expect_separator(text: &str) -> Result<(), ParseError> {
    match text.find(|c: char| c != ',' && !c.is_whitespace()) {
        None => Ok(()),
        Some(at) => Err(unexpected(READINGS_LABEL, &text[at..])),
    }
}

fn unexpected(section: &'static str, text: &str) -> ParseError {
    ParseError::UnexpectedContent {
        section,
        text: text.chars().take(24).collect(),
    }
}

/// Parse a station identifier such as `50`, `"50"` or `"S50"`
pub fn parse_station_id(raw: &str) -> Result<u32, ParseError> {
    let text = unquote(raw);
    let digits = text.trim().trim_start_matches(|c: char| c.is_ascii_alphabetic());

    digits.parse::<u32>().map_err(|_| ParseError::MalformedNumber {
        field: STATION_ID_FIELD,
        text: text.clone(),
    })
}

/// Parse a reading value such as `27.3` or `"27.3"`; non-finite values are rejected
pub fn parse_value(raw: &str) -> Result<f64, ParseError> {
    let text = unquote(raw);

    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ParseError::MalformedNumber {
            field: VALUE_FIELD,
            text,
        }),
    }
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        unescape(&raw[1..raw.len() - 1])
    } else {
        raw.to_string()
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
