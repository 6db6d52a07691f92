//! Clock sources feeding the transport with device time and beat progress.

pub mod hardware;
pub mod manual;
pub mod realtime;
pub mod tempo_slot;

pub use self::hardware::{DeviceClock, HardwareClockSource, SystemDeviceClock};
pub use self::manual::{manual_clock, ManualClockHandle, ManualClockSource};
pub use self::tempo_slot::{tempo_slot, TempoReader, TempoWriter};

use crate::error::TimingFault;
use crate::time::{ClockTime, Tempo};

/// Immutable message posted by a clock source on every device buffer boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSample {
  /// Device time, in the device clock timebase.
  pub current_time: ClockTime,
  /// Beats elapsed since the source was created.
  pub beat: f64,
  pub beat_fraction: f64,
}

impl ClockSample {
  pub fn new(current_time: ClockTime, beat: f64) -> ClockSample {
    ClockSample {
      current_time,
      beat,
      beat_fraction: beat.fract(),
    }
  }
}

pub trait ClockSource: Send {
  fn start(&mut self) -> Result<(), TimingFault>;

  fn halt(&mut self);

  fn set_tempo(&mut self, tempo: Tempo);

  /// Drains the pending samples and returns the most recent one.
  fn poll(&mut self) -> Option<ClockSample>;
}
