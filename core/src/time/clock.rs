use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::time::Duration;

use super::SampleRate;

pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

pub type UnitType = u64;
pub const UNITS_PER_SECOND: UnitType = NANOS_PER_SECOND as UnitType;
pub const UNITS_PER_MILLI: UnitType = UNITS_PER_SECOND / 1_000;

///! High resolution time, in nanoseconds
#[derive(Debug, Default, PartialOrd, Ord, PartialEq, Eq, Hash, Clone, Copy)]
pub struct ClockTime(UnitType);

impl ClockTime {
  pub fn zero() -> ClockTime {
    ClockTime(0)
  }

  pub fn new(units: UnitType) -> ClockTime {
    ClockTime(units)
  }

  pub fn from_seconds(seconds: f64) -> ClockTime {
    ClockTime((seconds.max(0.0) * UNITS_PER_SECOND as f64).round() as UnitType)
  }

  pub fn from_millis(millis: f64) -> ClockTime {
    ClockTime((millis.max(0.0) * UNITS_PER_MILLI as f64).round() as UnitType)
  }

  pub fn from_samples(samples: u64, sample_rate: SampleRate) -> ClockTime {
    let units = u128::from(samples) * u128::from(UNITS_PER_SECOND) / u128::from(sample_rate);
    ClockTime(units as UnitType)
  }

  pub fn units(&self) -> UnitType {
    self.0
  }

  pub fn to_seconds(&self) -> f64 {
    self.0 as f64 / UNITS_PER_SECOND as f64
  }

  pub fn to_millis(&self) -> f64 {
    self.0 as f64 / UNITS_PER_MILLI as f64
  }

  /// Signed distance in milliseconds from `earlier` to `self`.
  pub fn millis_since(&self, earlier: ClockTime) -> f64 {
    (self.0 as f64 - earlier.0 as f64) / UNITS_PER_MILLI as f64
  }

  /// Shifts the time by a signed amount of milliseconds, saturating at zero.
  pub fn offset_millis(&self, millis: f64) -> ClockTime {
    ClockTime::from_millis(self.to_millis() + millis)
  }
}

impl From<Duration> for ClockTime {
  fn from(duration: Duration) -> ClockTime {
    ClockTime(duration.as_nanos() as UnitType)
  }
}

impl From<ClockTime> for Duration {
  fn from(time: ClockTime) -> Duration {
    Duration::from_nanos(time.0)
  }
}

impl Add for ClockTime {
  type Output = ClockTime;

  fn add(self, rhs: ClockTime) -> ClockTime {
    ClockTime(self.0 + rhs.0)
  }
}

impl AddAssign for ClockTime {
  fn add_assign(&mut self, rhs: ClockTime) {
    *self = *self + rhs;
  }
}

impl Sub for ClockTime {
  type Output = ClockTime;

  fn sub(self, rhs: ClockTime) -> ClockTime {
    ClockTime(self.0.saturating_sub(rhs.0))
  }
}

impl SubAssign for ClockTime {
  fn sub_assign(&mut self, rhs: ClockTime) {
    *self = *self - rhs;
  }
}

#[cfg(test)]
mod test {
  use super::ClockTime;
  use std::time::Duration;

  #[test]
  pub fn clock_time_new() {
    let time = ClockTime::new(15);
    assert_eq!(time.units(), 15);
  }

  #[test]
  pub fn clock_time_conversions() {
    assert_eq!(ClockTime::from_seconds(1.5).units(), 1_500_000_000);
    assert_eq!(ClockTime::from_millis(2.5).units(), 2_500_000);
    assert_eq!(ClockTime::from_samples(44100, 44100).to_seconds(), 1.0);
    assert_eq!(ClockTime::from(Duration::from_millis(20)).to_millis(), 20.0);
  }

  #[test]
  pub fn clock_time_sub_saturates() {
    let time1 = ClockTime::new(15);
    let time2 = ClockTime::new(5);
    assert_eq!(time1 - time2, ClockTime::new(10));
    assert_eq!(time2 - time1, ClockTime::zero());
  }

  #[test]
  pub fn clock_time_signed_millis() {
    let time1 = ClockTime::from_millis(100.0);
    let time2 = ClockTime::from_millis(150.0);
    assert_eq!(time2.millis_since(time1), 50.0);
    assert_eq!(time1.millis_since(time2), -50.0);
    assert_eq!(time1.offset_millis(-200.0), ClockTime::zero());
    assert_eq!(time1.offset_millis(25.0), ClockTime::from_millis(125.0));
  }

  #[test]
  pub fn clock_time_add_assign() {
    let mut time1 = ClockTime::new(15);
    time1 += ClockTime::new(5);
    assert_eq!(time1, ClockTime::new(20));
  }
}
