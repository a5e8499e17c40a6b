//! Parsing of `rclone size --json` output.

use serde::Deserialize;
use thiserror::Error;

/// Outcome of one size probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub object_count: u64,
    pub total_bytes: u64,
}

/// Why a size report was rejected.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("rclone returned empty output")]
    Empty,

    #[error("invalid rclone JSON output: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("rclone returned invalid negative values (count={count}, bytes={bytes})")]
    InvalidValue { count: i64, bytes: i64 },
}

/// Wire shape of the report. Signed so that negative values surface as
/// [`ParseError::InvalidValue`] rather than a decode error.
///
/// Decoded from an already parsed JSON object only: serde's derived struct
/// impls would otherwise also accept the sequence form `[count, bytes]`.
#[derive(Debug, Deserialize)]
struct SizeReport {
    count: i64,
    bytes: i64,
}

/// Decode and validate a size report. Unknown fields are ignored.
pub fn parse_size_output(raw: &[u8]) -> Result<ProbeResult, ParseError> {
    if raw.trim_ascii().is_empty() {
        return Err(ParseError::Empty);
    }

    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(raw).map_err(ParseError::Malformed)?;
    let report: SizeReport = serde_json::from_value(serde_json::Value::Object(object))
        .map_err(ParseError::Malformed)?;

    match (u64::try_from(report.count), u64::try_from(report.bytes)) {
        (Ok(object_count), Ok(total_bytes)) => Ok(ProbeResult {
            object_count,
            total_bytes,
        }),
        _ => Err(ParseError::InvalidValue {
            count: report.count,
            bytes: report.bytes,
        }),
    }
}
