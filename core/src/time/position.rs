use std::fmt;
use std::str::FromStr;

use crate::error::DataError;

use super::PPQ;

/// Musical position: zero based measure and beat, plus ticks within the beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
  measure: u32,
  beat: u32,
  tick: u32,
}

impl Position {
  /// Ticks beyond one beat are carried into the beat.
  pub fn new(measure: u32, beat: u32, tick: u32) -> Position {
    Position {
      measure,
      beat: beat + tick / PPQ,
      tick: tick % PPQ,
    }
  }

  pub fn start() -> Position {
    Position::default()
  }

  pub fn from_measure(measure: u32) -> Position {
    Position::new(measure, 0, 0)
  }

  pub fn get_measure(&self) -> u32 {
    self.measure
  }

  pub fn get_beat(&self) -> u32 {
    self.beat
  }

  pub fn get_tick(&self) -> u32 {
    self.tick
  }
}

/// One based, as musicians count: `0001:01:000` is the score start.
impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(
      f,
      "{:04}:{:02}:{:03}",
      self.measure + 1,
      self.beat + 1,
      self.tick
    )
  }
}

impl FromStr for Position {
  type Err = DataError;

  fn from_str(text: &str) -> Result<Position, DataError> {
    let malformed = || DataError::MalformedPosition {
      text: text.to_string(),
    };
    let parts = text
      .trim()
      .split(':')
      .map(|part| part.trim().parse::<u32>().map_err(|_| malformed()))
      .collect::<Result<Vec<u32>, DataError>>()?;

    let (measure, beat, tick) = match parts.as_slice() {
      [measure] => (*measure, 1, 0),
      [measure, beat] => (*measure, *beat, 0),
      [measure, beat, tick] => (*measure, *beat, *tick),
      _ => return Err(malformed()),
    };

    if measure == 0 || beat == 0 || tick >= PPQ {
      return Err(malformed());
    }

    Ok(Position::new(measure - 1, beat - 1, tick))
  }
}
