#![forbid(unsafe_code)]

//! Self-describing prefix around a persisted snapshot payload.
//!
//! Grammar: `pf_` `C`? `E`? version `__` payload, where version is `digits` or
//! `digits.digits`. The payload is everything after the first separator that follows the
//! version, taken verbatim.

pub const MARKER: &str = "pf_";
pub const SEPARATOR: &str = "__";

const FLAG_COMPRESSED: char = 'C';
const FLAG_ENCRYPTED: char = 'E';

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EnvelopeFlags {
    pub compressed: bool,
    pub encrypted: bool,
}

impl EnvelopeFlags {
    pub const PLAIN: Self = Self {
        compressed: false,
        encrypted: false,
    };

    pub fn new(compressed: bool, encrypted: bool) -> Self {
        Self {
            compressed,
            encrypted,
        }
    }
}

/// A decoded view over persisted envelope text. Borrows the payload; owns nothing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope<'a> {
    pub flags: EnvelopeFlags,
    pub model_version: f64,
    pub payload: &'a str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeError {
    MissingMarker,
    MalformedVersion,
    MissingSeparator,
    InvalidVersion,
}

impl EnvelopeError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingMarker => "envelope must start with 'pf_'",
            Self::MalformedVersion => "envelope model version is malformed",
            Self::MissingSeparator => "envelope is missing the '__' separator",
            Self::InvalidVersion => "model version must be a finite, non-negative number",
        }
    }
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid envelope: {}", self.message())
    }
}

impl std::error::Error for EnvelopeError {}

pub fn encode_prefix(flags: EnvelopeFlags, model_version: f64) -> Result<String, EnvelopeError> {
    if !model_version.is_finite() || model_version < 0.0 {
        return Err(EnvelopeError::InvalidVersion);
    }
    // `-0.0` passes the sign check above but would render as "-0".
    let model_version = if model_version == 0.0 { 0.0 } else { model_version };

    let mut out = String::with_capacity(MARKER.len() + SEPARATOR.len() + 12);
    out.push_str(MARKER);
    if flags.compressed {
        out.push(FLAG_COMPRESSED);
    }
    if flags.encrypted {
        out.push(FLAG_ENCRYPTED);
    }
    // f64 Display never uses exponent notation and prints the shortest round-trip digits.
    out.push_str(&model_version.to_string());
    out.push_str(SEPARATOR);
    Ok(out)
}

pub fn encode(
    flags: EnvelopeFlags,
    model_version: f64,
    payload: &str,
) -> Result<String, EnvelopeError> {
    let mut out = encode_prefix(flags, model_version)?;
    out.push_str(payload);
    Ok(out)
}

pub fn decode(data: &str) -> Result<Envelope<'_>, EnvelopeError> {
    let Some(mut rest) = data.strip_prefix(MARKER) else {
        return Err(EnvelopeError::MissingMarker);
    };

    let mut flags = EnvelopeFlags::PLAIN;
    if let Some(after) = rest.strip_prefix(FLAG_COMPRESSED) {
        flags.compressed = true;
        rest = after;
    }
    if let Some(after) = rest.strip_prefix(FLAG_ENCRYPTED) {
        flags.encrypted = true;
        rest = after;
    }

    let number_len = scan_version(rest);
    let (number, after) = rest.split_at(number_len.unwrap_or(0));

    let Some(payload) = after.strip_prefix(SEPARATOR).filter(|_| number_len.is_some()) else {
        return Err(if rest.contains(SEPARATOR) {
            EnvelopeError::MalformedVersion
        } else {
            EnvelopeError::MissingSeparator
        });
    };

    let model_version = number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or(EnvelopeError::MalformedVersion)?;

    Ok(Envelope {
        flags,
        model_version,
        payload,
    })
}

/// Length of a leading `digits[.digits]` run, or `None` if the run is not a complete number.
fn scan_version(value: &str) -> Option<usize> {
    let bytes = value.as_bytes();
    let mut int_digits = 0usize;
    let mut frac_digits = 0usize;
    let mut seen_dot = false;
    let mut end = 0usize;

    while let Some(&b) = bytes.get(end) {
        match b {
            b'0'..=b'9' if seen_dot => frac_digits += 1,
            b'0'..=b'9' => int_digits += 1,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }

    if int_digits == 0 || (seen_dot && frac_digits == 0) {
        return None;
    }
    Some(end)
}
