//! Payload decoding: one raw broker message to one numeric value.
//!
//! `decode_sample` is a pure function of the payload bytes and the query's
//! decode configuration. Failures are sample-local by contract: the caller
//! records a null sample for that instant and the subscription carries on.

use thiserror::Error;

use crate::models::{DataFormat, QuerySpec, ValueEncoding};

/// Failure to turn one message payload into a number.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload was not valid UTF-8 JSON.
    #[error("Malformed JSON payload: {0}")]
    MalformedJson(String),

    /// The configured path does not exist in the document, or its terminal
    /// value is not numeric.
    #[error("Path '{0}' not found or not numeric")]
    PathNotFound(String),

    /// The payload text does not parse as a decimal number.
    #[error("Payload is not a number: {0}")]
    NotANumber(String),

    /// The payload is shorter than the fixed-width encoding requires.
    #[error("Payload too short: needed {needed} bytes, got {available}")]
    Truncated {
        /// Bytes the encoding requires.
        needed: usize,
        /// Bytes actually present.
        available: usize,
    },
}

/// Decode `payload` under the query's decode configuration.
pub fn decode_sample(payload: &[u8], spec: &QuerySpec) -> Result<f64, DecodeError> {
    match spec.data_format {
        DataFormat::Json => decode_json(payload, &spec.data_path),
        DataFormat::Bytes => match spec.value_encoding {
            ValueEncoding::Text => decode_text(payload),
            encoding => decode_fixed_width(payload, encoding),
        },
    }
}

/// One step of a dotted-key/bracket-index path (`a.b[0]`).
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

fn decode_json(payload: &[u8], path: &str) -> Result<f64, DecodeError> {
    let root: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| DecodeError::MalformedJson(e.to_string()))?;

    let segments = parse_path(path)?;
    let mut cursor = &root;
    for segment in &segments {
        cursor = match segment {
            PathSegment::Key(key) => cursor.get(key.as_str()),
            PathSegment::Index(index) => cursor.get(*index),
        }
        .ok_or_else(|| DecodeError::PathNotFound(path.to_string()))?;
    }
    cursor
        .as_f64()
        .ok_or_else(|| DecodeError::PathNotFound(path.to_string()))
}

/// Parse `a.b[0].c` into segments. An empty or malformed path addresses
/// nothing and is reported as [`DecodeError::PathNotFound`].
fn parse_path(path: &str) -> Result<Vec<PathSegment>, DecodeError> {
    if path.is_empty() {
        return Err(DecodeError::PathNotFound(path.to_string()));
    }

    let not_found = || DecodeError::PathNotFound(path.to_string());
    let mut segments = Vec::new();

    for token in path.split('.') {
        let (key, mut rest) = match token.find('[') {
            Some(pos) => token.split_at(pos),
            None => (token, ""),
        };

        if key.is_empty() && rest.is_empty() {
            // Consecutive or trailing dots
            return Err(not_found());
        }
        if !key.is_empty() {
            segments.push(PathSegment::Key(key.to_string()));
        }

        // Zero or more [index] groups after the key part
        while let Some(stripped) = rest.strip_prefix('[') {
            let close = stripped.find(']').ok_or_else(not_found)?;
            let index: usize = stripped[..close].parse().map_err(|_| not_found())?;
            segments.push(PathSegment::Index(index));
            rest = &stripped[close + 1..];
        }
        if !rest.is_empty() {
            return Err(not_found());
        }
    }

    Ok(segments)
}

fn decode_text(payload: &[u8]) -> Result<f64, DecodeError> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| DecodeError::NotANumber("<invalid utf-8>".to_string()))?;
    let trimmed = text.trim();
    trimmed
        .parse::<f64>()
        .map_err(|_| DecodeError::NotANumber(trimmed.to_string()))
}

fn decode_fixed_width(payload: &[u8], encoding: ValueEncoding) -> Result<f64, DecodeError> {
    match encoding {
        ValueEncoding::Float32 => Ok(f32::from_be_bytes(leading(payload)?) as f64),
        ValueEncoding::Float64 => Ok(f64::from_be_bytes(leading(payload)?)),
        ValueEncoding::Int16 => Ok(i16::from_be_bytes(leading(payload)?) as f64),
        ValueEncoding::Int32 => Ok(i32::from_be_bytes(leading(payload)?) as f64),
        ValueEncoding::Text => decode_text(payload),
    }
}

/// The leading `N` bytes of `payload`, or `Truncated`.
fn leading<const N: usize>(payload: &[u8]) -> Result<[u8; N], DecodeError> {
    payload
        .get(..N)
        .and_then(|bytes| <[u8; N]>::try_from(bytes).ok())
        .ok_or(DecodeError::Truncated {
            needed: N,
            available: payload.len(),
        })
}
