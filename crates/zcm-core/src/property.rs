//! Typing of raw property values reported by the `zfs` tool.
//!
//! The tool always prints values as text. `type_property` turns a value into a
//! [`PropertyValue`] using the property name as a hint. Classification lives
//! in the two lookup tables below and nowhere else.

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// User property recording the external management path of a dataset.
pub const MANAGEMENT_PATH_PROPERTY: &str = "zfs_clone_manager:path";

/// Properties whose values are filesystem paths.
pub const PATH_PROPERTIES: &[&str] = &["mountpoint", MANAGEMENT_PATH_PROPERTY];

/// Properties whose values are Unix timestamps in seconds.
pub const TIMESTAMP_PROPERTIES: &[&str] = &["creation", "st_ctim", "mtime", "atime", "crtime"];

/// Typed form of a single property value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// The tool printed `-`.
    Absent,
    Bool(bool),
    /// Wide enough for every unsigned 64-bit value the tool reports (`guid`).
    Int(i128),
    Path(PathBuf),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl PropertyValue {
    /// True when the tool printed `-`.
    pub fn is_absent(&self) -> bool {
        matches!(self, PropertyValue::Absent)
    }

    /// Boolean value of an `on`/`off` property.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric value, e.g. byte counts reported under `-p`.
    pub fn as_int(&self) -> Option<i128> {
        match self {
            PropertyValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Path value of a path property.
    pub fn as_path(&self) -> Option<&std::path::Path> {
        match self {
            PropertyValue::Path(path) => Some(path.as_path()),
            _ => None,
        }
    }

    /// Local wall-clock time of a timestamp property.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            PropertyValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Raw text of a value no other rule matched.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Absent => write!(f, "-"),
            PropertyValue::Bool(true) => write!(f, "on"),
            PropertyValue::Bool(false) => write!(f, "off"),
            PropertyValue::Int(value) => write!(f, "{value}"),
            PropertyValue::Path(path) => write!(f, "{}", path.display()),
            PropertyValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            PropertyValue::Text(text) => write!(f, "{text}"),
        }
    }
}

/// True for properties listed in [`PATH_PROPERTIES`].
pub fn is_path_property(name: &str) -> bool {
    PATH_PROPERTIES.contains(&name)
}

/// True for properties listed in [`TIMESTAMP_PROPERTIES`].
pub fn is_timestamp_property(name: &str) -> bool {
    TIMESTAMP_PROPERTIES.contains(&name)
}

/// Convert `raw` into a typed value. Rules apply in order and the first match
/// wins; the function never fails and falls back to the original text.
pub fn type_property(name: &str, raw: &str) -> PropertyValue {
    match raw {
        "-" => return PropertyValue::Absent,
        "on" => return PropertyValue::Bool(true),
        "off" => return PropertyValue::Bool(false),
        _ => {}
    }

    if is_path_property(name) {
        return PropertyValue::Path(PathBuf::from(raw));
    }

    if is_timestamp_property(name) {
        if let Some(ts) = local_datetime_from_epoch(raw) {
            return PropertyValue::Timestamp(ts);
        }
    }

    match raw.trim().parse::<i128>() {
        Ok(value) => PropertyValue::Int(value),
        Err(_) => PropertyValue::Text(raw.to_string()),
    }
}

/// Parse fractional epoch seconds into a timezone-naive local datetime.
pub fn local_datetime_from_epoch(raw: &str) -> Option<NaiveDateTime> {
    let seconds: f64 = raw.trim().parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return None;
    }
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    let utc = DateTime::from_timestamp(whole as i64, nanos)?;
    Some(utc.with_timezone(&Local).naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn dash_is_absent_for_every_property() {
        for name in ["mountpoint", "creation", "used", "origin", "anything"] {
            assert_eq!(type_property(name, "-"), PropertyValue::Absent);
        }
    }

    #[test]
    fn on_off_become_booleans_before_path_rules() {
        assert_eq!(type_property("readonly", "on"), PropertyValue::Bool(true));
        assert_eq!(type_property("mounted", "off"), PropertyValue::Bool(false));
        assert_eq!(type_property("mountpoint", "on"), PropertyValue::Bool(true));
    }

    #[test]
    fn path_properties_parse_as_paths() {
        let value = type_property("mountpoint", "/srv/data");
        assert_eq!(value.as_path(), Some(Path::new("/srv/data")));

        let value = type_property(MANAGEMENT_PATH_PROPERTY, "/opt/app");
        assert_eq!(value, PropertyValue::Path(PathBuf::from("/opt/app")));

        // numeric-looking values still stay paths
        let value = type_property("mountpoint", "42");
        assert_eq!(value, PropertyValue::Path(PathBuf::from("42")));
    }

    #[test]
    fn creation_parses_fractional_epoch() {
        let value = type_property("creation", "1610000000.5");
        let ts = value.as_timestamp().expect("timestamp");
        let expected = DateTime::from_timestamp(1_610_000_000, 500_000_000)
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(ts, expected);
    }

    #[test]
    fn unparsable_timestamp_falls_through_to_text() {
        assert_eq!(
            type_property("creation", "Mon Jan  4 10:00 2021"),
            PropertyValue::Text("Mon Jan  4 10:00 2021".into())
        );
        assert!(matches!(
            type_property("mtime", "nan"),
            PropertyValue::Text(_)
        ));
    }

    #[test]
    fn integers_and_plain_strings() {
        assert_eq!(type_property("used", "123456"), PropertyValue::Int(123456));
        assert_eq!(type_property("used", "-5"), PropertyValue::Int(-5));
        assert_eq!(
            type_property("compression", "lz4"),
            PropertyValue::Text("lz4".into())
        );
        assert_eq!(type_property("origin", ""), PropertyValue::Text(String::new()));
    }

    #[test]
    fn unsigned_64_bit_values_stay_numeric() {
        assert_eq!(
            type_property("guid", "12345678901234567890"),
            PropertyValue::Int(12_345_678_901_234_567_890)
        );
        let max = u64::MAX.to_string();
        assert_eq!(
            type_property("guid", &max).as_int(),
            Some(i128::from(u64::MAX))
        );
        assert_eq!(type_property("guid", &max).to_string(), max);
    }

    #[test]
    fn typing_is_total_over_awkward_input() {
        let awkward = [
            "", " ", "\t", "1e400", "inf", "0x10", "99999999999999999999", "é", "a\tb",
        ];
        for raw in awkward {
            for name in ["creation", "mountpoint", "used", "type"] {
                let _ = type_property(name, raw);
            }
        }
    }

    #[test]
    fn display_mirrors_tool_formatting() {
        assert_eq!(PropertyValue::Absent.to_string(), "-");
        assert_eq!(PropertyValue::Bool(true).to_string(), "on");
        assert_eq!(PropertyValue::Int(7).to_string(), "7");
    }
}
