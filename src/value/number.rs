//! Numeric value representation (spec §3.1): integer variants track sign/width so that a
//! round trip through text preserves the smallest sufficient representation, and doubles
//! retain their original textual form when available so re-serialization can be
//! bit-identical to user input.
//!
//! Grounded on the teacher pack's general approach to "don't lose information serde_json's
//! `Number` would lose" (the `json` crate's `AsNode::as_node` maps a `serde_json::Number`
//! into `PosInt`/`NegInt`/`Float` variants of its own `Node` enum); this module takes that
//! one step further by additionally retaining the original source text for doubles, per
//! spec §3.1's "Double is stored as the original text form when available".

use std::fmt;

/// A JSON number, preserving enough information for lossless round-trips.
#[derive(Debug, Clone, PartialEq)]
pub enum Number {
    /// Non-negative integer, stored unsigned to use the full `u64` range.
    PosInt(u64),
    /// Negative integer.
    NegInt(i64),
    /// A double, with its original source text when the value came from a parse.
    Double { value: f64, text: Option<Box<str>> },
}

impl Number {
    /// Build a `Number` by parsing JSON number text, choosing the narrowest
    /// representation that preserves the source exactly (int vs. double).
    pub fn parse(text: &str) -> Option<Number> {
        if !text.contains(['.', 'e', 'E']) {
            if let Ok(u) = text.parse::<u64>() {
                return Some(Number::PosInt(u));
            }
            if let Ok(i) = text.parse::<i64>() {
                return Some(Number::NegInt(i));
            }
        }
        text.parse::<f64>().ok().map(|value| Number::Double {
            value,
            text: Some(text.into()),
        })
    }

    /// The value as `f64`, regardless of representation.
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::PosInt(u) => *u as f64,
            Number::NegInt(i) => *i as f64,
            Number::Double { value, .. } => *value,
        }
    }

    /// True if this number is represented as an integer (not a double).
    pub fn is_integral(&self) -> bool {
        matches!(self, Number::PosInt(_) | Number::NegInt(_))
    }

    /// The value as `i64` if it's integral and in range.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::PosInt(u) => i64::try_from(*u).ok(),
            Number::NegInt(i) => Some(*i),
            Number::Double { .. } => None,
        }
    }

    /// Integer addition promoting to double on overflow; returns `None` only for double
    /// overflow (±∞), matching spec §4.6's `ADDITION_OVERFLOW`.
    pub fn checked_add(&self, other: &Number) -> Option<Number> {
        if let (Some(a), Some(b)) = (self.as_i64(), other.as_i64()) {
            if let Some(sum) = a.checked_add(b) {
                return Some(Number::from_i64(sum));
            }
        }
        let sum = self.as_f64() + other.as_f64();
        if sum.is_finite() {
            Some(Number::Double { value: sum, text: None })
        } else {
            None
        }
    }

    /// Integer multiplication promoting to double on overflow; returns `None` only for
    /// double overflow, matching spec §4.6's `MULTIPLICATION_OVERFLOW`.
    pub fn checked_mul(&self, other: &Number) -> Option<Number> {
        if let (Some(a), Some(b)) = (self.as_i64(), other.as_i64()) {
            if let Some(prod) = a.checked_mul(b) {
                return Some(Number::from_i64(prod));
            }
        }
        let prod = self.as_f64() * other.as_f64();
        if prod.is_finite() {
            Some(Number::Double { value: prod, text: None })
        } else {
            None
        }
    }

    fn from_i64(n: i64) -> Number {
        if n >= 0 {
            Number::PosInt(n as u64)
        } else {
            Number::NegInt(n)
        }
    }

    /// Numeric comparison per spec §4.5 (`int/int`, `int/double`, `double/double`).
    pub fn compare(&self, other: &Number) -> std::cmp::Ordering {
        match (self, other) {
            (Number::PosInt(a), Number::PosInt(b)) => a.cmp(b),
            (Number::NegInt(a), Number::NegInt(b)) => a.cmp(b),
            (Number::PosInt(a), Number::NegInt(b)) => {
                // A non-negative int is never less than a negative int.
                if *b < 0 {
                    std::cmp::Ordering::Greater
                } else {
                    (*a).cmp(&(*b as u64))
                }
            }
            (Number::NegInt(a), Number::PosInt(b)) => {
                if *a < 0 {
                    std::cmp::Ordering::Less
                } else {
                    (*a as u64).cmp(b)
                }
            }
            _ => self
                .as_f64()
                .partial_cmp(&other.as_f64())
                .unwrap_or(std::cmp::Ordering::Equal),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::PosInt(u) => write!(f, "{u}"),
            Number::NegInt(i) => write!(f, "{i}"),
            Number::Double { text: Some(t), .. } => f.write_str(t),
            Number::Double { value, text: None } => {
                if value.fract() == 0.0 && value.is_finite() {
                    write!(f, "{value:.1}")
                } else {
                    write!(f, "{value}")
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_picks_narrowest_representation() {
        assert_eq!(Number::parse("7").unwrap(), Number::PosInt(7));
        assert_eq!(Number::parse("-7").unwrap(), Number::NegInt(-7));
        assert!(matches!(Number::parse("8.95"), Some(Number::Double { .. })));
    }

    #[test]
    fn double_roundtrips_original_text() {
        let n = Number::parse("22.990").unwrap();
        assert_eq!(n.to_string(), "22.990");
    }

    #[test]
    fn checked_add_promotes_on_overflow() {
        let a = Number::PosInt(u64::MAX);
        let b = Number::PosInt(1);
        match a.checked_add(&b).unwrap() {
            Number::Double { value, .. } => assert!(value > 0.0),
            other => panic!("expected promotion to double, got {other:?}"),
        }
    }

    #[test]
    fn compare_mixed_int_kinds() {
        assert_eq!(
            Number::PosInt(5).compare(&Number::NegInt(-3)),
            std::cmp::Ordering::Greater
        );
        assert_eq!(
            Number::NegInt(-3).compare(&Number::PosInt(5)),
            std::cmp::Ordering::Less
        );
    }
}
