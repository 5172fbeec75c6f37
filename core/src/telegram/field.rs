use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Value substituted for an ancillary telegram field that failed to parse.
pub const FIELD_SENTINEL: i32 = -9999;

/// Outcome of reading one ancillary telegram field.
///
/// A field that failed to parse upstream is not dropped; it carries an
/// explicit sentinel so the sample stays usable and the substitution stays
/// visible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum FieldOutcome<T> {
    Parsed(T),
    Fallback(T),
}

impl<T: Copy> FieldOutcome<T> {
    pub fn value(&self) -> T {
        match *self {
            FieldOutcome::Parsed(value) | FieldOutcome::Fallback(value) => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, FieldOutcome::Fallback(_))
    }
}

/// Parses `raw`, falling back to `sentinel` when it is not a valid `T`.
pub fn parse_field<T: FromStr>(raw: &str, sentinel: T) -> FieldOutcome<T> {
    match raw.trim().parse::<T>() {
        Ok(value) => FieldOutcome::Parsed(value),
        Err(_) => FieldOutcome::Fallback(sentinel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_distinguishes_fallback() {
        assert_eq!(parse_field(" 61 ", FIELD_SENTINEL), FieldOutcome::Parsed(61));
        let outcome = parse_field("6l", FIELD_SENTINEL);
        assert!(outcome.is_fallback());
        assert_eq!(outcome.value(), -9999);

        let temp = parse_field("", f64::from(FIELD_SENTINEL));
        assert_eq!(temp, FieldOutcome::Fallback(-9999.0));
    }
}
