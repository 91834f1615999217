//! Status payload parsing.
//!
//! Devices report their online state on `devices/{id}/status` with a JSON
//! object such as:
//!
//! ```json
//! {"is_online": true, "firmware": "1.4.2"}
//! ```
//!
//! Only `is_online` is recognised.  Any other field is ignored, a missing or
//! non-boolean `is_online` simply means "no state change".  A payload that is
//! not JSON at all is an error: the message is dropped by the caller.

use serde_json::Value;
use thiserror::Error;

/// Name of the recognised status field.
pub const ONLINE_FIELD: &str = "is_online";

/// The payload could not be parsed as JSON.
#[derive(Debug, Error)]
#[error("status payload is not valid JSON: {0}")]
pub struct StatusPayloadError(#[from] serde_json::Error);

/// The information the bridge extracts from a status payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// `Some` when the payload is an object with a boolean `is_online` field.
    pub is_online: Option<bool>,
}

/// Parses a status payload.
///
/// Any structurally valid JSON document is accepted.  Documents that are not
/// objects, or objects without a boolean `is_online`, yield
/// `StatusReport { is_online: None }`.
///
/// # Errors
///
/// Returns [`StatusPayloadError`] when `payload` is not valid JSON.
///
/// # Examples
///
/// ```rust
/// use device_bridge_core::parse_status_payload;
///
/// let report = parse_status_payload(r#"{"is_online": false}"#).unwrap();
/// assert_eq!(report.is_online, Some(false));
///
/// assert!(parse_status_payload("online").is_err());
/// ```
pub fn parse_status_payload(payload: &str) -> Result<StatusReport, StatusPayloadError> {
    let value: Value = serde_json::from_str(payload)?;
    let is_online = value.get(ONLINE_FIELD).and_then(Value::as_bool);
    Ok(StatusReport { is_online })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_online_true() {
        let report = parse_status_payload(r#"{"is_online": true}"#).unwrap();
        assert_eq!(report.is_online, Some(true));
    }

    #[test]
    fn test_parse_ignores_unrelated_fields() {
        let report = parse_status_payload(r#"{"battery": 80, "is_online": false}"#).unwrap();
        assert_eq!(report.is_online, Some(false));
    }

    #[test]
    fn test_parse_missing_field_yields_none() {
        let report = parse_status_payload(r#"{"battery": 80}"#).unwrap();
        assert_eq!(report, StatusReport { is_online: None });
    }

    #[test]
    fn test_parse_non_boolean_field_yields_none() {
        // A string "true" is not a boolean; the state is left untouched.
        let report = parse_status_payload(r#"{"is_online": "true"}"#).unwrap();
        assert_eq!(report.is_online, None);
    }

    #[test]
    fn test_parse_non_object_json_yields_none() {
        assert_eq!(parse_status_payload("42").unwrap().is_online, None);
        assert_eq!(parse_status_payload("[true]").unwrap().is_online, None);
    }

    #[test]
    fn test_parse_malformed_json_is_error() {
        assert!(parse_status_payload("{is_online: true").is_err());
        assert!(parse_status_payload("").is_err());
    }
}
