use super::{ClockTime, SampleRate};

/// Accumulates device buffer sizes into device time.
///
/// A buffer rarely lasts an integer amount of clock units, so instead of adding
/// a rounded per-buffer duration (which drifts), the elapsed time is always
/// derived from the total frame count and only the difference is reported.
#[derive(Debug, Clone)]
pub struct FrameDriftCorrection {
  sample_rate: SampleRate,
  frames: u64,
  time: ClockTime,
  last_correction: i64,
}

impl FrameDriftCorrection {
  pub fn new(sample_rate: SampleRate) -> FrameDriftCorrection {
    FrameDriftCorrection {
      sample_rate,
      frames: 0,
      time: ClockTime::zero(),
      last_correction: 0,
    }
  }

  pub fn get_sample_rate(&self) -> SampleRate {
    self.sample_rate
  }

  pub fn get_frames(&self) -> u64 {
    self.frames
  }

  pub fn get_time(&self) -> ClockTime {
    self.time
  }

  /// Units added to (or removed from) the naive per-buffer duration on the last step.
  pub fn get_last_correction(&self) -> i64 {
    self.last_correction
  }

  /// Advances by a device buffer and returns its corrected duration.
  pub fn next(&mut self, frames: u32) -> ClockTime {
    self.frames += u64::from(frames);
    let next_time = ClockTime::from_samples(self.frames, self.sample_rate);
    let duration = next_time - self.time;
    let naive = ClockTime::from_samples(u64::from(frames), self.sample_rate);
    self.last_correction = duration.units() as i64 - naive.units() as i64;
    self.time = next_time;
    duration
  }

  pub fn reset(&mut self) {
    self.frames = 0;
    self.time = ClockTime::zero();
    self.last_correction = 0;
  }
}
