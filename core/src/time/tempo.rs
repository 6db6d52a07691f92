use std::fmt;

use crate::error::DataError;

use super::TicksTime;

pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 300.0;
pub const DEFAULT_BPM: f64 = 120.0;

const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// Beats per minute, always within [`MIN_BPM`, `MAX_BPM`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Tempo(f64);

impl Tempo {
  pub fn new(bpm: f64) -> Result<Tempo, DataError> {
    if bpm.is_finite() && bpm > 0.0 {
      Ok(Tempo::clamped(bpm))
    } else {
      Err(DataError::InvalidTempo { bpm })
    }
  }

  /// Clamps any number into the supported range. NaN falls back to the slowest tempo.
  pub fn clamped(bpm: f64) -> Tempo {
    if bpm.is_nan() {
      Tempo(MIN_BPM)
    } else {
      Tempo(bpm.max(MIN_BPM).min(MAX_BPM))
    }
  }

  pub fn get_value(&self) -> f64 {
    self.0
  }

  pub fn millis_per_beat(&self) -> f64 {
    MILLIS_PER_MINUTE / self.0
  }

  pub fn beats_per_second(&self) -> f64 {
    self.0 / 60.0
  }
}

impl Default for Tempo {
  fn default() -> Tempo {
    Tempo(DEFAULT_BPM)
  }
}

impl fmt::Display for Tempo {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{:.2} bpm", self.0)
  }
}

impl From<Tempo> for f64 {
  fn from(item: Tempo) -> Self {
    item.0
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoChange {
  pub at_tick: TicksTime,
  pub bpm: Tempo,
}

#[cfg(test)]
mod test {

  use super::{Tempo, MAX_BPM, MIN_BPM};

  #[test]
  pub fn tempo_new() {
    let tempo = Tempo::new(120.0).unwrap();
    assert_eq!(tempo.get_value(), 120.0);
    assert_eq!(tempo.millis_per_beat(), 500.0);
  }

  #[test]
  pub fn tempo_new_rejects_nonsense() {
    assert!(Tempo::new(0.0).is_err());
    assert!(Tempo::new(-10.0).is_err());
    assert!(Tempo::new(std::f64::NAN).is_err());
  }

  #[test]
  pub fn tempo_clamped() {
    assert_eq!(Tempo::clamped(1000.0).get_value(), MAX_BPM);
    assert_eq!(Tempo::clamped(-5.0).get_value(), MIN_BPM);
    assert_eq!(Tempo::clamped(std::f64::NAN).get_value(), MIN_BPM);
    assert_eq!(Tempo::clamped(96.5).get_value(), 96.5);
  }
}
