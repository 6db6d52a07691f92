use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use serde_derive::Deserialize;

use crate::error::DataError;

const MAX_NUMERATOR: i64 = 64;
const MAX_DENOMINATOR: i64 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct TimeSignature {
  numerator: u8,   // beats
  denominator: u8, // note value
}

impl TimeSignature {
  pub fn new(numerator: i64, denominator: i64) -> Result<TimeSignature, DataError> {
    let invalid = |cause: &str| DataError::InvalidSignature {
      numerator,
      denominator,
      cause: cause.to_string(),
    };

    if numerator <= 0 {
      return Err(invalid("the numerator must be positive"));
    }
    if numerator > MAX_NUMERATOR {
      return Err(invalid("the numerator is too large"));
    }
    if denominator <= 0 || denominator > MAX_DENOMINATOR || (denominator & (denominator - 1)) != 0 {
      return Err(invalid("the denominator must be a power of two"));
    }

    Ok(TimeSignature {
      numerator: numerator as u8,
      denominator: denominator as u8,
    })
  }

  pub fn get_numerator(&self) -> u32 {
    u32::from(self.numerator)
  }

  pub fn get_denominator(&self) -> u32 {
    u32::from(self.denominator)
  }
}

impl Default for TimeSignature {
  fn default() -> TimeSignature {
    TimeSignature {
      numerator: 4,
      denominator: 4,
    }
  }
}

impl fmt::Display for TimeSignature {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}/{}", self.numerator, self.denominator)
  }
}

impl FromStr for TimeSignature {
  type Err = DataError;

  fn from_str(text: &str) -> Result<TimeSignature, DataError> {
    let malformed = || DataError::MalformedSignature {
      text: text.to_string(),
    };
    let mut parts = text.trim().splitn(2, '/');
    let numerator = parts
      .next()
      .and_then(|part| part.trim().parse::<i64>().ok())
      .ok_or_else(malformed)?;
    let denominator = parts
      .next()
      .and_then(|part| part.trim().parse::<i64>().ok())
      .ok_or_else(malformed)?;
    TimeSignature::new(numerator, denominator)
  }
}

impl TryFrom<String> for TimeSignature {
  type Error = DataError;

  fn try_from(text: String) -> Result<TimeSignature, DataError> {
    text.parse()
  }
}
