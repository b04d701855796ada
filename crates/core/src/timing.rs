//! Parsing of serialized beat / downbeat timing sequences.
//!
//! The library stores timing grids as JSON arrays of seconds, e.g.
//! `[0.48, 0.96, 1.44]`.

use crate::error::CoreError;

/// Parse a stored timing blob into a list of positions in seconds.
///
/// Fails on malformed JSON, non-numeric entries, or non-finite values.
pub fn parse_timing(blob: &str) -> Result<Vec<f64>, CoreError> {
    let values: Vec<f64> = serde_json::from_str(blob)
        .map_err(|e| CoreError::Validation(format!("Invalid timing data: {e}")))?;

    if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
        return Err(CoreError::Validation(format!(
            "Invalid timing position {bad}"
        )));
    }
    Ok(values)
}
