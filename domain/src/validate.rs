//! Schema validation: turn a raw JSON payload into a typed input record.
//!
//! Every field is checked and all problems are reported together, keyed by
//! field name. Messages keep the wording API clients already match on.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::{
    FieldErrors, NewOrder, NewProduct, NewUser, PRODUCT_NAME_MAX, USER_ADDRESS_MAX,
    USER_EMAIL_MAX, USER_NAME_MAX,
};

pub const MSG_REQUIRED: &str = "Missing data for required field.";
pub const MSG_NULL: &str = "Field may not be null.";
pub const MSG_STRING: &str = "Not a valid string.";
pub const MSG_NUMBER: &str = "Not a valid number.";
pub const MSG_INTEGER: &str = "Not a valid integer.";
pub const MSG_DATETIME: &str = "Not a valid datetime.";
pub const MSG_SPECIAL_NUMBER: &str = "Special numeric values (nan or infinity) are not permitted.";
pub const MSG_UNKNOWN: &str = "Unknown field.";
pub const MSG_INPUT_TYPE: &str = "Invalid input type.";

/// Key used for errors that concern the payload as a whole.
pub const SCHEMA_KEY: &str = "_schema";

/// Client-supplied ids are tolerated and ignored; the database assigns them.
const IGNORED_KEYS: &[&str] = &["id"];

const USER_FIELDS: &[&str] = &["name", "email", "address"];
const PRODUCT_FIELDS: &[&str] = &["product_name", "price"];
const ORDER_FIELDS: &[&str] = &["order_date_time", "user_id"];

/// Validate a user payload (create or full replace).
pub fn load_user(payload: &Value) -> Result<NewUser, FieldErrors> {
    let obj = as_object(payload)?;
    let mut errs = FieldErrors::new();
    reject_unknown(obj, USER_FIELDS, &mut errs);

    let name = required_string(obj, "name", USER_NAME_MAX, &mut errs);
    let email = required_string(obj, "email", USER_EMAIL_MAX, &mut errs);
    let address = optional_string(obj, "address", USER_ADDRESS_MAX, &mut errs);

    match (name, email, address) {
        (Some(name), Some(email), Some(address)) if errs.is_empty() => Ok(NewUser {
            name,
            email,
            address,
        }),
        _ => Err(errs),
    }
}

/// Validate a product payload (create or full replace).
pub fn load_product(payload: &Value) -> Result<NewProduct, FieldErrors> {
    let obj = as_object(payload)?;
    let mut errs = FieldErrors::new();
    reject_unknown(obj, PRODUCT_FIELDS, &mut errs);

    let product_name = required_string(obj, "product_name", PRODUCT_NAME_MAX, &mut errs);
    let price = required(obj, "price", &mut errs).and_then(|v| match parse_float(v) {
        Ok(p) => Some(round_price(p)),
        Err(msg) => {
            errs.add("price", msg);
            None
        }
    });

    match (product_name, price) {
        (Some(product_name), Some(price)) if errs.is_empty() => Ok(NewProduct {
            product_name,
            price,
        }),
        _ => Err(errs),
    }
}

/// Validate an order payload. Whether `user_id` exists is checked later by the service.
pub fn load_order(payload: &Value) -> Result<NewOrder, FieldErrors> {
    let obj = as_object(payload)?;
    let mut errs = FieldErrors::new();
    reject_unknown(obj, ORDER_FIELDS, &mut errs);

    let order_date_time =
        required(obj, "order_date_time", &mut errs).and_then(|v| match v.as_str() {
            Some(s) => match parse_datetime(s) {
                Some(dt) => Some(dt),
                None => {
                    errs.add("order_date_time", MSG_DATETIME);
                    None
                }
            },
            None => {
                errs.add("order_date_time", MSG_DATETIME);
                None
            }
        });
    let user_id = required(obj, "user_id", &mut errs).and_then(|v| match parse_integer(v) {
        Some(id) => Some(id),
        None => {
            errs.add("user_id", MSG_INTEGER);
            None
        }
    });

    match (order_date_time, user_id) {
        (Some(order_date_time), Some(user_id)) if errs.is_empty() => Ok(NewOrder {
            order_date_time,
            user_id,
        }),
        _ => Err(errs),
    }
}

/// Parse an ISO-8601 timestamp into a zone-less datetime.
///
/// Accepts `T` or space separators, optional fractional seconds, a bare date
/// (midnight), and offsets (converted to UTC).
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Round to two decimals, the precision prices are stored with.
///
/// Magnitudes of 1e15 and above have no representable cents and are returned
/// as-is; scaling them by 100 could overflow to infinity.
pub fn round_price(p: f64) -> f64 {
    if p.abs() >= 1e15 {
        return p;
    }
    (p * 100.0).round() / 100.0
}

fn as_object(payload: &Value) -> Result<&Map<String, Value>, FieldErrors> {
    payload.as_object().ok_or_else(|| {
        let mut errs = FieldErrors::new();
        errs.add(SCHEMA_KEY, MSG_INPUT_TYPE);
        errs
    })
}

fn reject_unknown(obj: &Map<String, Value>, known: &[&str], errs: &mut FieldErrors) {
    for key in obj.keys() {
        let key = key.as_str();
        if !known.contains(&key) && !IGNORED_KEYS.contains(&key) {
            errs.add(key, MSG_UNKNOWN);
        }
    }
}

// Present and non-null, or an error is recorded.
fn required<'a>(
    obj: &'a Map<String, Value>,
    field: &str,
    errs: &mut FieldErrors,
) -> Option<&'a Value> {
    match obj.get(field) {
        None => {
            errs.add(field, MSG_REQUIRED);
            None
        }
        Some(Value::Null) => {
            errs.add(field, MSG_NULL);
            None
        }
        Some(v) => Some(v),
    }
}

fn required_string(
    obj: &Map<String, Value>,
    field: &str,
    max: usize,
    errs: &mut FieldErrors,
) -> Option<String> {
    required(obj, field, errs).and_then(|v| check_string(v, field, max, errs))
}

// Outer `None` means invalid; `Some(None)` means absent or null.
fn optional_string(
    obj: &Map<String, Value>,
    field: &str,
    max: usize,
    errs: &mut FieldErrors,
) -> Option<Option<String>> {
    match obj.get(field) {
        None | Some(Value::Null) => Some(None),
        Some(v) => check_string(v, field, max, errs).map(Some),
    }
}

fn check_string(v: &Value, field: &str, max: usize, errs: &mut FieldErrors) -> Option<String> {
    let Some(s) = v.as_str() else {
        errs.add(field, MSG_STRING);
        return None;
    };
    if s.chars().count() > max {
        errs.add(field, format!("Longer than maximum length {}.", max));
        return None;
    }
    Some(s.to_string())
}

fn parse_float(v: &Value) -> Result<f64, &'static str> {
    let n = match v {
        Value::Number(n) => n.as_f64().ok_or(MSG_NUMBER)?,
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| MSG_NUMBER)?,
        _ => return Err(MSG_NUMBER),
    };
    if n.is_finite() {
        Ok(n)
    } else {
        Err(MSG_SPECIAL_NUMBER)
    }
}

fn parse_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_with_all_fields_loads() {
        let u = load_user(&json!({"name": "Ada", "email": "ada@example.com", "address": "1 Loop Rd"}))
            .unwrap();
        assert_eq!(u.name, "Ada");
        assert_eq!(u.address.as_deref(), Some("1 Loop Rd"));
    }

    #[test]
    fn user_address_is_optional() {
        let u = load_user(&json!({"name": "Ada", "email": "ada@example.com"})).unwrap();
        assert_eq!(u.address, None);
        let u = load_user(&json!({"name": "Ada", "email": "ada@example.com", "address": null}))
            .unwrap();
        assert_eq!(u.address, None);
    }

    #[test]
    fn user_reports_every_bad_field() {
        let errs = load_user(&json!({"name": "x".repeat(31), "address": 5})).unwrap_err();
        assert_eq!(errs.get("name"), Some(&["Longer than maximum length 30.".to_string()][..]));
        assert_eq!(errs.get("email"), Some(&[MSG_REQUIRED.to_string()][..]));
        assert_eq!(errs.get("address"), Some(&[MSG_STRING.to_string()][..]));
    }

    #[test]
    fn null_required_field_is_rejected() {
        let errs = load_user(&json!({"name": null, "email": "a@b.c"})).unwrap_err();
        assert_eq!(errs.get("name"), Some(&[MSG_NULL.to_string()][..]));
    }

    #[test]
    fn unknown_fields_rejected_but_id_ignored() {
        let errs = load_user(&json!({"name": "A", "email": "a@b.c", "role": "admin"})).unwrap_err();
        assert_eq!(errs.get("role"), Some(&[MSG_UNKNOWN.to_string()][..]));
        assert!(load_user(&json!({"id": 99, "name": "A", "email": "a@b.c"})).is_ok());
    }

    #[test]
    fn non_object_payload_is_schema_error() {
        let errs = load_product(&json!(["nope"])).unwrap_err();
        assert_eq!(errs.get(SCHEMA_KEY), Some(&[MSG_INPUT_TYPE.to_string()][..]));
        assert!(load_order(&Value::Null).is_err());
    }

    #[test]
    fn product_price_rules() {
        let p = load_product(&json!({"product_name": "Lamp", "price": 19.999})).unwrap();
        assert_eq!(p.price, 20.0);
        let p = load_product(&json!({"product_name": "Lamp", "price": "4.5"})).unwrap();
        assert_eq!(p.price, 4.5);
        let errs = load_product(&json!({"product_name": "Lamp", "price": true})).unwrap_err();
        assert_eq!(errs.get("price"), Some(&[MSG_NUMBER.to_string()][..]));
        let errs = load_product(&json!({"product_name": "Lamp", "price": "inf"})).unwrap_err();
        assert_eq!(errs.get("price"), Some(&[MSG_SPECIAL_NUMBER.to_string()][..]));
    }

    #[test]
    fn huge_prices_stay_finite() {
        let p = load_product(&json!({"product_name": "Big", "price": 1e307})).unwrap();
        assert!(p.price.is_finite());
        assert_eq!(p.price, 1e307);
        let lowest = f64::MIN;
        let p = load_product(&json!({"product_name": "Big", "price": lowest})).unwrap();
        assert_eq!(p.price, lowest);
        assert_eq!(round_price(123_456.789), 123_456.79);
    }

    #[test]
    fn order_fields_parse() {
        let o = load_order(&json!({"order_date_time": "2024-05-01T10:30:00", "user_id": "3"}))
            .unwrap();
        assert_eq!(o.user_id, 3);
        assert_eq!(o.order_date_time.to_string(), "2024-05-01 10:30:00");

        let errs = load_order(&json!({"order_date_time": "yesterday", "user_id": 1.5})).unwrap_err();
        assert_eq!(errs.get("order_date_time"), Some(&[MSG_DATETIME.to_string()][..]));
        assert_eq!(errs.get("user_id"), Some(&[MSG_INTEGER.to_string()][..]));
    }

    #[test]
    fn datetime_variants() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(10, 30, 0))
            .unwrap();
        assert_eq!(parse_datetime("2024-05-01 10:30:00"), Some(expected));
        assert_eq!(parse_datetime("2024-05-01T12:30:00+02:00"), Some(expected));
        assert_eq!(parse_datetime("2024-05-01T10:30"), Some(expected));
        assert_eq!(
            parse_datetime("2024-05-01"),
            NaiveDate::from_ymd_opt(2024, 5, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
        assert_eq!(parse_datetime("05/01/2024"), None);
    }
}
