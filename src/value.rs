//! Untyped row scalars and their coercion into typed destinations.
//!
//! Row payloads arrive as JSON scalars and are carried unconverted until a
//! caller scans them. Temporal types are deliberately not supported: a column
//! may hold epoch numbers or ISO strings, so scan into an integer, float or
//! `String` and convert the value yourself.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ScanError;

/// A single decoded scalar from a row or change payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqliteValue {
  Null,
  Bool(bool),
  Number(serde_json::Number),
  Text(String),
}

impl SqliteValue {
  pub fn is_null(&self) -> bool {
    matches!(self, SqliteValue::Null)
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      SqliteValue::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      SqliteValue::Number(n) => n.as_f64(),
      _ => None,
    }
  }
}

impl fmt::Display for SqliteValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SqliteValue::Null => write!(f, "null"),
      SqliteValue::Bool(b) => write!(f, "{}", b),
      SqliteValue::Number(n) => write!(f, "{}", n),
      SqliteValue::Text(s) => write!(f, "{:?}", s),
    }
  }
}

impl From<&str> for SqliteValue {
  fn from(s: &str) -> Self {
    SqliteValue::Text(s.to_string())
  }
}

impl From<String> for SqliteValue {
  fn from(s: String) -> Self {
    SqliteValue::Text(s)
  }
}

impl From<i64> for SqliteValue {
  fn from(i: i64) -> Self {
    SqliteValue::Number(i.into())
  }
}

impl From<f64> for SqliteValue {
  fn from(v: f64) -> Self {
    serde_json::Number::from_f64(v)
      .map(SqliteValue::Number)
      .unwrap_or(SqliteValue::Null)
  }
}

impl From<bool> for SqliteValue {
  fn from(b: bool) -> Self {
    SqliteValue::Bool(b)
  }
}

/// A typed slot a [`SqliteValue`] can be scanned into.
pub trait Scan {
  /// Overwrite `self` with `value`. Never called with [`SqliteValue::Null`]
  /// by [`scan_values`].
  fn scan_from(&mut self, value: &SqliteValue) -> Result<(), ScanError>;
}

/// Scan `values` positionally into `dest`. Null values leave their
/// destination untouched.
pub fn scan_values(values: &[SqliteValue], dest: &mut [&mut dyn Scan]) -> Result<(), ScanError> {
  if values.len() != dest.len() {
    return Err(ScanError::DestinationCount {
      expected: values.len(),
      got: dest.len(),
    });
  }

  for (value, slot) in values.iter().zip(dest.iter_mut()) {
    if value.is_null() {
      continue;
    }
    slot.scan_from(value)?;
  }

  Ok(())
}

/// Exact integral value of a JSON number, if it has one.
fn integral(n: &serde_json::Number) -> Option<i128> {
  if let Some(i) = n.as_i64() {
    return Some(i as i128);
  }
  if let Some(u) = n.as_u64() {
    return Some(u as i128);
  }

  let f = n.as_f64()?;
  if f.is_finite() && f.fract() == 0.0 && f >= i128::MIN as f64 && f < i128::MAX as f64 {
    Some(f as i128)
  } else {
    None
  }
}

macro_rules! impl_scan_integer {
  ($($t:ty),*) => {
    $(
      impl Scan for $t {
        fn scan_from(&mut self, value: &SqliteValue) -> Result<(), ScanError> {
          *self = match value {
            SqliteValue::Number(n) => integral(n)
              .and_then(|i| <$t>::try_from(i).ok())
              .ok_or_else(|| ScanError::coercion(value, stringify!($t)))?,
            SqliteValue::Text(s) => s
              .parse::<$t>()
              .map_err(|_| ScanError::coercion(value, stringify!($t)))?,
            _ => return Err(ScanError::coercion(value, stringify!($t))),
          };
          Ok(())
        }
      }
    )*
  };
}

impl_scan_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// Wire numbers are modeled as float64, so this slot takes them as is.
/// Integers beyond 2^53 round to the nearest representable double.
impl Scan for f64 {
  fn scan_from(&mut self, value: &SqliteValue) -> Result<(), ScanError> {
    *self = match value {
      SqliteValue::Number(n) => n.as_f64().ok_or_else(|| ScanError::coercion(value, "f64"))?,
      SqliteValue::Text(s) => s
        .parse::<f64>()
        .map_err(|_| ScanError::coercion(value, "f64"))?,
      _ => return Err(ScanError::coercion(value, "f64")),
    };
    Ok(())
  }
}

impl Scan for f32 {
  fn scan_from(&mut self, value: &SqliteValue) -> Result<(), ScanError> {
    let mut wide = 0f64;
    wide
      .scan_from(value)
      .map_err(|_| ScanError::coercion(value, "f32"))?;

    // Only values that survive the round trip through f32 unchanged.
    let narrow = wide as f32;
    if narrow as f64 != wide {
      return Err(ScanError::coercion(value, "f32"));
    }
    *self = narrow;
    Ok(())
  }
}

impl Scan for String {
  fn scan_from(&mut self, value: &SqliteValue) -> Result<(), ScanError> {
    match value {
      SqliteValue::Text(s) => {
        self.clone_from(s);
        Ok(())
      }
      _ => Err(ScanError::coercion(value, "String")),
    }
  }
}

impl Scan for bool {
  fn scan_from(&mut self, value: &SqliteValue) -> Result<(), ScanError> {
    *self = match value {
      SqliteValue::Bool(b) => *b,
      SqliteValue::Text(s) => match s.as_str() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => true,
        "0" | "f" | "F" | "false" | "FALSE" | "False" => false,
        _ => return Err(ScanError::coercion(value, "bool")),
      },
      _ => return Err(ScanError::coercion(value, "bool")),
    };
    Ok(())
  }
}

impl Scan for SqliteValue {
  fn scan_from(&mut self, value: &SqliteValue) -> Result<(), ScanError> {
    self.clone_from(value);
    Ok(())
  }
}

impl<T: Scan + Default> Scan for Option<T> {
  fn scan_from(&mut self, value: &SqliteValue) -> Result<(), ScanError> {
    let mut inner = T::default();
    inner.scan_from(value)?;
    *self = Some(inner);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(json: &str) -> SqliteValue {
    serde_json::from_str(json).unwrap()
  }

  #[test]
  fn test_decode_scalars() {
    assert_eq!(parse("null"), SqliteValue::Null);
    assert_eq!(parse("true"), SqliteValue::Bool(true));
    assert_eq!(parse("\"hi\""), SqliteValue::Text("hi".to_string()));
    assert!(matches!(parse("3.5"), SqliteValue::Number(_)));
    assert!(serde_json::from_str::<SqliteValue>("[1]").is_err());
    assert!(serde_json::from_str::<SqliteValue>("{}").is_err());
  }

  #[test]
  fn test_null_leaves_destination_untouched() {
    let mut n = 42i64;
    let mut s = "keep".to_string();
    let mut b = true;
    let values = vec![SqliteValue::Null, SqliteValue::Null, SqliteValue::Null];
    scan_values(&values, &mut [&mut n, &mut s, &mut b]).unwrap();
    assert_eq!(n, 42);
    assert_eq!(s, "keep");
    assert!(b);
  }

  #[test]
  fn test_integral_float_into_integer() {
    let mut n = 0i32;
    n.scan_from(&parse("3.0")).unwrap();
    assert_eq!(n, 3);
  }

  #[test]
  fn test_fractional_number_into_integer_fails() {
    let mut n = 0i64;
    let err = n.scan_from(&parse("3.5")).unwrap_err();
    assert!(matches!(err, ScanError::Coercion { target: "i64", .. }));
    assert_eq!(n, 0);
  }

  #[test]
  fn test_fractional_string_into_integer_fails() {
    let mut n = 0i64;
    assert!(n.scan_from(&SqliteValue::from("3.5")).is_err());
    n.scan_from(&SqliteValue::from("-17")).unwrap();
    assert_eq!(n, -17);
  }

  #[test]
  fn test_integer_range_checked() {
    let mut small = 0u8;
    assert!(small.scan_from(&SqliteValue::from(256)).is_err());
    assert!(small.scan_from(&SqliteValue::from(-1)).is_err());
    small.scan_from(&SqliteValue::from(255)).unwrap();
    assert_eq!(small, 255);

    let mut big = 0u64;
    big.scan_from(&parse("18446744073709551615")).unwrap();
    assert_eq!(big, u64::MAX);
  }

  #[test]
  fn test_float_destinations() {
    let mut f = 0f64;
    f.scan_from(&parse("2.25")).unwrap();
    assert_eq!(f, 2.25);
    f.scan_from(&SqliteValue::from("1.5")).unwrap();
    assert_eq!(f, 1.5);
    f.scan_from(&SqliteValue::from(7)).unwrap();
    assert_eq!(f, 7.0);

    let mut narrow = 0f32;
    narrow.scan_from(&parse("0.5")).unwrap();
    assert_eq!(narrow, 0.5);
    narrow.scan_from(&SqliteValue::from(16777216)).unwrap();
    assert_eq!(narrow, 16777216.0);
    assert!(narrow.scan_from(&parse("1e300")).is_err());
  }

  #[test]
  fn test_f32_rejects_lossy_values() {
    let mut narrow = 0.25f32;
    assert_eq!(
      narrow.scan_from(&parse("0.1")),
      Err(ScanError::coercion("0.1", "f32"))
    );
    assert!(narrow.scan_from(&SqliteValue::from(16777217)).is_err());
    assert!(narrow.scan_from(&SqliteValue::from("0.1")).is_err());
    assert_eq!(narrow, 0.25);

    let mut wide = 0f64;
    wide.scan_from(&parse("0.1")).unwrap();
    assert_eq!(wide, 0.1);
  }

  #[test]
  fn test_string_and_bool() {
    let mut s = String::new();
    s.scan_from(&SqliteValue::from("alice")).unwrap();
    assert_eq!(s, "alice");
    assert!(s.scan_from(&SqliteValue::from(1)).is_err());

    let mut b = false;
    b.scan_from(&SqliteValue::Bool(true)).unwrap();
    assert!(b);
    b.scan_from(&SqliteValue::from("false")).unwrap();
    assert!(!b);
    assert!(b.scan_from(&SqliteValue::from("maybe")).is_err());
    assert!(b.scan_from(&SqliteValue::from(1)).is_err());
  }

  #[test]
  fn test_bool_into_other_types_fails() {
    let mut n = 0i64;
    let mut s = String::new();
    assert!(n.scan_from(&SqliteValue::Bool(true)).is_err());
    assert!(s.scan_from(&SqliteValue::Bool(true)).is_err());
  }

  #[test]
  fn test_option_destination() {
    let mut maybe: Option<i64> = None;
    scan_values(&[SqliteValue::Null], &mut [&mut maybe]).unwrap();
    assert_eq!(maybe, None);
    scan_values(&[SqliteValue::from(5)], &mut [&mut maybe]).unwrap();
    assert_eq!(maybe, Some(5));
  }

  #[test]
  fn test_destination_count_mismatch() {
    let mut a = 0i64;
    let err = scan_values(&[SqliteValue::from(1), SqliteValue::from(2)], &mut [&mut a]).unwrap_err();
    assert_eq!(err, ScanError::DestinationCount { expected: 2, got: 1 });
  }
}
