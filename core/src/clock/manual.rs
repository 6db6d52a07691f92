use crossbeam_channel::{Receiver, Sender};

use crate::error::TimingFault;
use crate::time::{ClockTime, Tempo};

use super::{tempo_slot, ClockSample, ClockSource, TempoReader, TempoWriter};

/// Creates a clock source driven by hand, for offline rendering and tests.
pub fn manual_clock() -> (ManualClockSource, ManualClockHandle) {
  let (samples_tx, samples_rx) = crossbeam_channel::unbounded();
  let (tempo_writer, tempo_reader) = tempo_slot(Tempo::default());
  let source = ManualClockSource {
    samples_rx,
    tempo: tempo_writer,
    running: false,
    start_failure: None,
  };
  let handle = ManualClockHandle {
    samples_tx,
    tempo: tempo_reader,
  };
  (source, handle)
}

pub struct ManualClockSource {
  samples_rx: Receiver<ClockSample>,
  tempo: TempoWriter,
  running: bool,
  start_failure: Option<String>,
}

impl ManualClockSource {
  /// Makes every `start` fail, as a device that can not be opened.
  pub fn failing<T>(mut self, cause: T) -> Self
  where
    T: Into<String>,
  {
    self.start_failure = Some(cause.into());
    self
  }

  pub fn is_running(&self) -> bool {
    self.running
  }
}

impl ClockSource for ManualClockSource {
  fn start(&mut self) -> Result<(), TimingFault> {
    if let Some(cause) = &self.start_failure {
      return Err(TimingFault::ClockUnavailable {
        cause: cause.clone(),
      });
    }
    self.running = true;
    Ok(())
  }

  fn halt(&mut self) {
    self.running = false;
  }

  fn set_tempo(&mut self, tempo: Tempo) {
    self.tempo.write(tempo);
  }

  fn poll(&mut self) -> Option<ClockSample> {
    let latest = self.samples_rx.try_iter().last();
    if self.running {
      latest
    } else {
      None
    }
  }
}

pub struct ManualClockHandle {
  samples_tx: Sender<ClockSample>,
  tempo: TempoReader,
}

impl ManualClockHandle {
  pub fn push(&self, sample: ClockSample) {
    drop(self.samples_tx.send(sample));
  }

  pub fn push_beat(&self, millis: f64, beat: f64) {
    self.push(ClockSample::new(ClockTime::from_millis(millis), beat));
  }

  /// Last tempo written by the transport.
  pub fn tempo(&self) -> f64 {
    self.tempo.read()
  }
}

#[cfg(test)]
mod test {

  use super::manual_clock;
  use crate::clock::ClockSource;
  use crate::time::Tempo;

  #[test]
  pub fn poll_returns_latest_while_running() {
    let (mut source, handle) = manual_clock();
    handle.push_beat(0.0, 0.0);
    assert_eq!(source.poll(), None);

    source.start().unwrap();
    handle.push_beat(10.0, 0.1);
    handle.push_beat(20.0, 0.2);
    let sample = source.poll().unwrap();
    assert_eq!(sample.beat, 0.2);
    assert_eq!(source.poll(), None);
  }

  #[test]
  pub fn tempo_reaches_the_handle() {
    let (mut source, handle) = manual_clock();
    source.set_tempo(Tempo::clamped(90.0));
    assert_eq!(handle.tempo(), 90.0);
  }

  #[test]
  pub fn failing_start() {
    let (source, _handle) = manual_clock();
    let mut source = source.failing("no device");
    assert!(source.start().is_err());
    assert!(!source.is_running());
  }
}
