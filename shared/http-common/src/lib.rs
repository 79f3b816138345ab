//! Shared HTTP utilities for the shop API workspace.
//!
//! Framework-agnostic response bodies and the wire format for timestamps, so
//! handlers and tests agree on one shape.

use chrono::NaiveDateTime;
use serde::Serialize;

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Message body used for 404s, confirmations and notices.
///
/// Returns: `{"message": "<message>"}`
pub fn json_message(message: &str) -> serde_json::Value {
    serde_json::json!({ "message": message })
}

/// Body for a validation failure: the field -> messages map itself.
///
/// Falls back to a `_schema` entry if the value cannot be serialized.
pub fn json_field_errors<T: Serialize>(errors: &T) -> serde_json::Value {
    serde_json::to_value(errors)
        .unwrap_or_else(|_| serde_json::json!({ "_schema": ["Invalid input."] }))
}

/// Body for unexpected server-side failures. Details stay in the logs.
pub fn json_internal_error() -> serde_json::Value {
    json_message("Internal server error")
}

// ============================================================================
// Messages
// ============================================================================

/// `Invalid <entity> ID: <id>`
pub fn invalid_id_message(entity: &str, id: i64) -> String {
    format!("Invalid {} ID: {}", entity, id)
}

/// `Successfully deleted <entity> ID: <id>`
pub fn deleted_message(entity: &str, id: i64) -> String {
    format!("Successfully deleted {} ID: {}", entity, id)
}

// ============================================================================
// Time Utilities
// ============================================================================

/// Format a zone-less timestamp as ISO-8601 with a `T` separator.
///
/// Fractional seconds are printed only when non-zero, e.g.
/// `2024-05-01T10:30:00` or `2024-05-01T10:30:00.250`.
pub fn format_naive_datetime(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    #[test]
    fn test_json_message() {
        assert_eq!(
            json_message("Invalid user ID"),
            serde_json::json!({"message": "Invalid user ID"})
        );
    }

    #[test]
    fn test_json_field_errors() {
        let mut errs = BTreeMap::new();
        errs.insert("email", vec!["Missing data for required field."]);
        assert_eq!(
            json_field_errors(&errs),
            serde_json::json!({"email": ["Missing data for required field."]})
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(invalid_id_message("product", 4), "Invalid product ID: 4");
        assert_eq!(deleted_message("user", 2), "Successfully deleted user ID: 2");
    }

    #[test]
    fn test_format_naive_datetime() {
        let d = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let whole = d.and_hms_opt(10, 30, 0).unwrap();
        assert_eq!(format_naive_datetime(whole), "2024-05-01T10:30:00");
        let frac = d.and_hms_milli_opt(10, 30, 0, 250).unwrap();
        assert_eq!(format_naive_datetime(frac), "2024-05-01T10:30:00.250");
    }
}
