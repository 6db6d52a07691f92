use std::ops::{Add, AddAssign, Sub, SubAssign};

use super::Tempo;

/// Pulses per quarter note: ticks in one counted beat.
pub const PPQ: u32 = 960;

/// Absolute tick count since the score start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TicksTime(u64);

impl TicksTime {
  pub fn new(ticks: u64) -> TicksTime {
    TicksTime(ticks)
  }

  pub fn zero() -> TicksTime {
    TicksTime(0)
  }

  pub fn from_beats(beats: u64) -> TicksTime {
    TicksTime(beats * u64::from(PPQ))
  }

  pub fn get_ticks(&self) -> u64 {
    self.0
  }

  pub fn to_beats(&self) -> f64 {
    self.0 as f64 / f64::from(PPQ)
  }

  /// Duration of this amount of ticks at a constant tempo.
  pub fn to_millis(&self, tempo: Tempo) -> f64 {
    self.to_beats() * tempo.millis_per_beat()
  }

  pub fn from_millis(millis: f64, tempo: Tempo) -> TicksTime {
    let ticks = millis.max(0.0) * f64::from(PPQ) / tempo.millis_per_beat();
    TicksTime(ticks.floor() as u64)
  }
}

impl Add for TicksTime {
  type Output = TicksTime;
  fn add(self, rhs: TicksTime) -> Self {
    TicksTime::new(self.0 + rhs.0)
  }
}

impl AddAssign for TicksTime {
  fn add_assign(&mut self, rhs: TicksTime) {
    *self = *self + rhs;
  }
}

impl Sub for TicksTime {
  type Output = TicksTime;
  fn sub(self, rhs: TicksTime) -> Self {
    TicksTime::new(self.0.saturating_sub(rhs.0))
  }
}

impl SubAssign for TicksTime {
  fn sub_assign(&mut self, rhs: TicksTime) {
    *self = *self - rhs;
  }
}

impl From<TicksTime> for f64 {
  fn from(item: TicksTime) -> Self {
    item.0 as f64
  }
}

impl From<TicksTime> for u64 {
  fn from(item: TicksTime) -> Self {
    item.0
  }
}

#[cfg(test)]
mod test {

  use super::{TicksTime, PPQ};
  use crate::time::Tempo;

  #[test]
  pub fn new() {
    let ticks_time = TicksTime::new(1234);
    assert_eq!(ticks_time.get_ticks(), 1234);
  }

  #[test]
  pub fn from_beats() {
    assert_eq!(TicksTime::from_beats(2), TicksTime::new(2 * u64::from(PPQ)));
    assert_eq!(TicksTime::new(480).to_beats(), 0.5);
  }

  #[test]
  pub fn millis() {
    let tempo = Tempo::new(120.0).unwrap();
    assert_eq!(TicksTime::from_beats(3).to_millis(tempo), 1500.0);
    assert_eq!(TicksTime::from_millis(50.0, tempo), TicksTime::new(96));
    assert_eq!(TicksTime::from_millis(-1.0, tempo), TicksTime::zero());
  }

  #[test]
  pub fn sub_saturates() {
    let result = TicksTime::new(30) - TicksTime::new(100);
    assert_eq!(result, TicksTime::zero());
    let result = TicksTime::new(100) - TicksTime::new(30);
    assert_eq!(result, TicksTime(70));
  }

  #[test]
  pub fn add() {
    let mut time = TicksTime::new(100) + TicksTime::new(50);
    time += TicksTime::new(10);
    assert_eq!(time, TicksTime(160));
  }
}
