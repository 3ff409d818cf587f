//! A whole-number percentage constrained to `0..=100`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A discount percentage. Construction is the only place the `0..=100`
/// range is checked; every `Percent` in circulation is valid.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "u8")]
pub struct Percent(u8);

impl Percent {
  pub const ZERO: Self = Self(0);

  pub fn new(value: i64) -> Result<Self> {
    u8::try_from(value)
      .ok()
      .filter(|v| *v <= 100)
      .map(Self)
      .ok_or(Error::DiscountOutOfRange(value))
  }

  /// Clamp `value` into range; for constants known to be valid.
  pub const fn saturating(value: u8) -> Self {
    if value > 100 { Self(100) } else { Self(value) }
  }

  pub fn get(self) -> u8 { self.0 }
}

impl TryFrom<i64> for Percent {
  type Error = Error;

  fn try_from(value: i64) -> Result<Self> { Self::new(value) }
}

impl From<Percent> for u8 {
  fn from(p: Percent) -> Self { p.0 }
}

impl fmt::Display for Percent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}%", self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bounds_are_inclusive() {
    assert_eq!(Percent::new(0).unwrap().get(), 0);
    assert_eq!(Percent::new(100).unwrap().get(), 100);
  }

  #[test]
  fn out_of_range_is_rejected() {
    assert!(matches!(Percent::new(101), Err(Error::DiscountOutOfRange(101))));
    assert!(matches!(Percent::new(-1), Err(Error::DiscountOutOfRange(-1))));
    assert!(matches!(Percent::new(150), Err(Error::DiscountOutOfRange(150))));
  }

  #[test]
  fn deserialises_through_range_check() {
    let ok: Percent = serde_json::from_str("40").unwrap();
    assert_eq!(ok.get(), 40);
    assert!(serde_json::from_str::<Percent>("150").is_err());
  }
}
