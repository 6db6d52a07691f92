use log::{info, warn};

use crate::clock::ClockSample;
use crate::error::TimingFault;
use crate::time::{ClockTime, TicksTime, TimeLattice, PPQ};

// Weight of the newest frame in the drift heat average.
const DRIFT_SMOOTHING: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockMode {
  /// Position follows the beats reported by the clock source.
  HardwareTrusted { stalled_frames: u32 },
  /// Position follows the render loop time from `base_tick` on.
  SoftwareFallback {
    base_tick: TicksTime,
    base_now: ClockTime,
    base_clock: ClockTime,
  },
}

impl ClockMode {
  pub fn is_fallback(&self) -> bool {
    match self {
      ClockMode::SoftwareFallback { .. } => true,
      ClockMode::HardwareTrusted { .. } => false,
    }
  }
}

/// Turns clock samples, or the render loop time when they stop coming, into absolute ticks.
pub struct ClockTracker {
  mode: ClockMode,
  stall_threshold: u32,
  anchor_tick: TicksTime,
  anchor_beat: Option<f64>,
  last_sample: Option<ClockSample>,
  last_now: Option<ClockTime>,
  clock_time: ClockTime,
  drift_heat: f64,
}

impl ClockTracker {
  pub fn new(stall_threshold: u32) -> ClockTracker {
    ClockTracker {
      mode: ClockMode::HardwareTrusted { stalled_frames: 0 },
      stall_threshold: stall_threshold.max(1),
      anchor_tick: TicksTime::zero(),
      anchor_beat: None,
      last_sample: None,
      last_now: None,
      clock_time: ClockTime::zero(),
      drift_heat: 0.0,
    }
  }

  pub fn mode(&self) -> ClockMode {
    self.mode
  }

  /// Current time in the clock source timebase, extrapolated while falling back.
  pub fn clock_time(&self) -> ClockTime {
    self.clock_time
  }

  pub fn drift_heat(&self) -> f64 {
    self.drift_heat
  }

  /// Trusts the hardware again from `tick` on, waiting for its first sample.
  pub fn restart(&mut self, tick: TicksTime) {
    self.mode = ClockMode::HardwareTrusted { stalled_frames: 0 };
    self.anchor_tick = tick;
    self.anchor_beat = None;
    self.last_sample = None;
    self.last_now = None;
  }

  pub fn fall_back(&mut self, tick: TicksTime, now: ClockTime) {
    self.mode = ClockMode::SoftwareFallback {
      base_tick: tick,
      base_now: now,
      base_clock: self.clock_time,
    };
  }

  /// Moves the anchors after a jump in position, keeping the current mode.
  pub fn rebase(&mut self, tick: TicksTime, now: ClockTime) {
    self.anchor_tick = tick;
    self.anchor_beat = self.last_sample.map(|sample| sample.beat);
    if self.mode.is_fallback() {
      self.fall_back(tick, now);
    }
  }

  /// Returns the new absolute tick, never behind `current`.
  pub fn advance(
    &mut self,
    sample: Option<ClockSample>,
    now: ClockTime,
    current: TicksTime,
    lattice: &TimeLattice,
  ) -> TicksTime {
    let last_beat = self.last_sample.map(|sample| sample.beat);
    let fresh = sample.filter(|sample| last_beat.map_or(true, |beat| sample.beat > beat));

    let tick = match (self.mode, fresh) {
      (ClockMode::HardwareTrusted { .. }, Some(sample)) => {
        self.update_drift(sample, now);
        self.accept(sample);
        self.mode = ClockMode::HardwareTrusted { stalled_frames: 0 };
        match self.anchor_beat {
          Some(anchor_beat) => {
            let delta = ((sample.beat - anchor_beat) * f64::from(PPQ)).round().max(0.0);
            self.anchor_tick + TicksTime::new(delta as u64)
          }
          None => {
            self.anchor_beat = Some(sample.beat);
            self.anchor_tick = current;
            current
          }
        }
      }
      (ClockMode::HardwareTrusted { stalled_frames }, None) => {
        let stalled_frames = stalled_frames + 1;
        if stalled_frames >= self.stall_threshold {
          warn!(
            "{}, advancing from the render loop",
            TimingFault::Stalled {
              frames: stalled_frames
            }
          );
          self.fall_back(current, now);
        } else {
          self.mode = ClockMode::HardwareTrusted { stalled_frames };
        }
        current
      }
      (ClockMode::SoftwareFallback { .. }, Some(sample)) => {
        info!("Hardware clock resumed");
        self.accept(sample);
        self.mode = ClockMode::HardwareTrusted { stalled_frames: 0 };
        self.anchor_tick = current;
        self.anchor_beat = Some(sample.beat);
        current
      }
      (
        ClockMode::SoftwareFallback {
          base_tick,
          base_now,
          base_clock,
        },
        None,
      ) => {
        let elapsed = now.millis_since(base_now).max(0.0);
        self.clock_time = base_clock.offset_millis(elapsed);
        lattice.millis_to_tick(lattice.tick_to_millis(base_tick) + elapsed)
      }
    };

    self.last_now = Some(now);
    tick.max(current)
  }

  fn accept(&mut self, sample: ClockSample) {
    self.clock_time = sample.current_time;
    self.last_sample = Some(sample);
  }

  fn update_drift(&mut self, sample: ClockSample, now: ClockTime) {
    if let (Some(last_sample), Some(last_now)) = (self.last_sample, self.last_now) {
      let device_elapsed = sample.current_time.millis_since(last_sample.current_time);
      let loop_elapsed = now.millis_since(last_now);
      let drift = (device_elapsed - loop_elapsed).abs();
      self.drift_heat = self.drift_heat * (1.0 - DRIFT_SMOOTHING) + drift * DRIFT_SMOOTHING;
    }
  }
}

#[cfg(test)]
mod test {

  use super::{ClockMode, ClockTracker};
  use crate::clock::ClockSample;
  use crate::time::{ClockTime, MeasureSpec, Tempo, TicksTime, TimeLattice, TimeSignature};

  fn lattice() -> TimeLattice {
    let four_four = TimeSignature::new(4, 4).unwrap();
    TimeLattice::build(&[MeasureSpec::new(four_four); 4], Tempo::clamped(120.0))
  }

  fn sample(millis: f64, beat: f64) -> Option<ClockSample> {
    Some(ClockSample::new(ClockTime::from_millis(millis), beat))
  }

  #[test]
  pub fn follows_hardware_beats() {
    let lattice = lattice();
    let mut tracker = ClockTracker::new(20);
    let now = ClockTime::zero();

    let tick = tracker.advance(sample(0.0, 3.0), now, TicksTime::zero(), &lattice);
    assert_eq!(tick, TicksTime::zero());
    let tick = tracker.advance(sample(500.0, 4.0), now, tick, &lattice);
    assert_eq!(tick, TicksTime::new(960));
    let tick = tracker.advance(sample(750.0, 4.5), now, tick, &lattice);
    assert_eq!(tick, TicksTime::new(1440));
    assert_eq!(tracker.clock_time(), ClockTime::from_millis(750.0));
  }

  #[test]
  pub fn stalls_fall_back_and_resume() {
    let lattice = lattice();
    let mut tracker = ClockTracker::new(3);

    let mut tick = tracker.advance(sample(0.0, 0.0), ClockTime::zero(), TicksTime::zero(), &lattice);
    for frame in 1..=3 {
      let now = ClockTime::from_millis(f64::from(frame) * 10.0);
      tick = tracker.advance(None, now, tick, &lattice);
      assert_eq!(tick, TicksTime::zero());
    }
    assert!(tracker.mode().is_fallback());

    // 500ms later at 120 bpm is one beat
    tick = tracker.advance(None, ClockTime::from_millis(530.0), tick, &lattice);
    assert_eq!(tick, TicksTime::new(960));
    assert_eq!(tracker.clock_time(), ClockTime::from_millis(500.0));

    tick = tracker.advance(sample(600.0, 1.0), ClockTime::from_millis(540.0), tick, &lattice);
    assert_eq!(tracker.mode(), ClockMode::HardwareTrusted { stalled_frames: 0 });
    assert_eq!(tick, TicksTime::new(960));

    tick = tracker.advance(sample(850.0, 1.5), ClockTime::from_millis(790.0), tick, &lattice);
    assert_eq!(tick, TicksTime::new(1440));
  }

  #[test]
  pub fn repeated_beats_count_as_stalls() {
    let lattice = lattice();
    let mut tracker = ClockTracker::new(2);
    let tick = tracker.advance(sample(0.0, 1.0), ClockTime::zero(), TicksTime::zero(), &lattice);
    tracker.advance(sample(0.0, 1.0), ClockTime::zero(), tick, &lattice);
    assert_eq!(tracker.mode(), ClockMode::HardwareTrusted { stalled_frames: 1 });
    tracker.advance(sample(0.0, 1.0), ClockTime::zero(), tick, &lattice);
    assert!(tracker.mode().is_fallback());
  }

  #[test]
  pub fn never_goes_backwards() {
    let lattice = lattice();
    let mut tracker = ClockTracker::new(20);
    let tick = tracker.advance(sample(0.0, 0.0), ClockTime::zero(), TicksTime::new(1000), &lattice);
    assert_eq!(tick, TicksTime::new(1000));
    tracker.rebase(TicksTime::new(2000), ClockTime::zero());
    let tick = tracker.advance(sample(10.0, 0.01), ClockTime::zero(), TicksTime::new(2500), &lattice);
    assert_eq!(tick, TicksTime::new(2500));
  }

  #[test]
  pub fn drift_heat_grows_with_mismatch() {
    let lattice = lattice();
    let mut tracker = ClockTracker::new(20);
    let mut tick = TicksTime::zero();
    for frame in 0..10 {
      let device = f64::from(frame) * 20.0;
      let now = ClockTime::from_millis(f64::from(frame) * 10.0);
      tick = tracker.advance(sample(device, device / 500.0), now, tick, &lattice);
    }
    assert!(tracker.drift_heat() > 0.0);
  }
}
