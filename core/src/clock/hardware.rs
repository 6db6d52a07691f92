use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, info, warn};

use crate::config::Clock as ClockConfig;
use crate::error::TimingFault;
use crate::time::{drift_correction::FrameDriftCorrection, ClockTime, SampleRate, Tempo};

use super::realtime::ClockPriority;
use super::{tempo_slot, ClockSample, ClockSource, TempoReader, TempoWriter};

/// The audio device as seen by the clock thread.
pub trait DeviceClock: Send + 'static {
  fn sample_rate(&self) -> SampleRate;

  fn open(&mut self) -> Result<(), TimingFault> {
    Ok(())
  }

  /// Called when the clock resumes after being halted.
  fn resume(&mut self) {}

  /// Blocks until the next buffer boundary and returns the buffer size in frames.
  fn wait_buffer(&mut self) -> Result<u32, TimingFault>;
}

/// Paces buffers with the system timer, for hosts without a device callback.
pub struct SystemDeviceClock {
  sample_rate: SampleRate,
  frames: u32,
  buffer_duration: Duration,
  next_deadline: Option<Instant>,
}

impl SystemDeviceClock {
  pub fn new(sample_rate: SampleRate, frames: u32) -> SystemDeviceClock {
    let buffer_duration = ClockTime::from_samples(u64::from(frames), sample_rate).into();
    SystemDeviceClock {
      sample_rate,
      frames,
      buffer_duration,
      next_deadline: None,
    }
  }
}

impl DeviceClock for SystemDeviceClock {
  fn sample_rate(&self) -> SampleRate {
    self.sample_rate
  }

  fn open(&mut self) -> Result<(), TimingFault> {
    if self.sample_rate == 0 || self.frames == 0 {
      return Err(TimingFault::ClockUnavailable {
        cause: format!(
          "invalid device format: {} Hz, {} frames",
          self.sample_rate, self.frames
        ),
      });
    }
    Ok(())
  }

  fn resume(&mut self) {
    self.next_deadline = None;
  }

  fn wait_buffer(&mut self) -> Result<u32, TimingFault> {
    let deadline = self.next_deadline.unwrap_or_else(Instant::now) + self.buffer_duration;
    let now = Instant::now();
    if deadline > now {
      thread::sleep(deadline - now);
    }
    self.next_deadline = Some(deadline);
    Ok(self.frames)
  }
}

enum Protocol {
  Run,
  Halt,
  Shutdown,
}

struct ClockThread<D: DeviceClock> {
  device: D,
  samples_tx: Sender<ClockSample>,
  tempo: TempoReader,
  drift_correction: FrameDriftCorrection,
  time: ClockTime,
  beat: f64,
  running: bool,
}

impl<D: DeviceClock> ClockThread<D> {
  fn new(device: D, samples_tx: Sender<ClockSample>, tempo: TempoReader) -> ClockThread<D> {
    let drift_correction = FrameDriftCorrection::new(device.sample_rate());
    ClockThread {
      device,
      samples_tx,
      tempo,
      drift_correction,
      time: ClockTime::zero(),
      beat: 0.0,
      running: false,
    }
  }

  fn handle_messages(&mut self, protocol_rx: Receiver<Protocol>) {
    loop {
      let message = if self.running {
        match protocol_rx.try_recv() {
          Ok(message) => Some(message),
          Err(TryRecvError::Empty) => None,
          Err(TryRecvError::Disconnected) => Some(Protocol::Shutdown),
        }
      } else {
        Some(protocol_rx.recv().unwrap_or(Protocol::Shutdown))
      };

      match message {
        Some(Protocol::Run) => {
          if !self.running {
            self.device.resume();
            self.running = true;
          }
        }
        Some(Protocol::Halt) => self.running = false,
        Some(Protocol::Shutdown) => break,
        None => {}
      }

      if self.running {
        self.process_buffer();
      }
    }
  }

  // Runs once per device buffer: no allocations, no locks, no logging.
  fn process_buffer(&mut self) {
    match self.device.wait_buffer() {
      Ok(frames) => {
        let elapsed = self.drift_correction.next(frames);
        self.time += elapsed;
        self.beat += elapsed.to_seconds() * self.tempo.read() / 60.0;
        let sample = ClockSample::new(self.time, self.beat);
        drop(self.samples_tx.try_send(sample));
      }
      Err(_) => {
        // the transport notices the missing samples and falls back to software
        self.running = false;
      }
    }
  }
}

/// Beat clock running on its own high priority thread, paced by the audio device.
pub struct HardwareClockSource {
  handler: Option<JoinHandle<()>>,
  protocol_tx: Sender<Protocol>,
  samples_rx: Receiver<ClockSample>,
  tempo: TempoWriter,
}

impl HardwareClockSource {
  pub fn spawn<D>(device: D, config: &ClockConfig) -> Result<HardwareClockSource, TimingFault>
  where
    D: DeviceClock,
  {
    info!("Starting the hardware clock ...");

    let (protocol_tx, protocol_rx) = crossbeam_channel::unbounded::<Protocol>();
    let (samples_tx, samples_rx) = crossbeam_channel::bounded::<ClockSample>(config.channel_capacity);
    let (init_tx, init_rx) = crossbeam_channel::bounded::<Result<(), TimingFault>>(1);
    let (tempo_writer, tempo_reader) = tempo_slot(Tempo::default());

    let clock_config = config.clone();

    let handler = thread::Builder::new()
      .name("hardware-clock".into())
      .spawn(move || {
        let mut device = device;
        if let Err(err) = device.open() {
          drop(init_tx.send(Err(err)));
          return;
        }

        let _priority = if clock_config.realtime_priority {
          Self::acquire_priority(&clock_config)
        } else {
          None
        };

        drop(init_tx.send(Ok(())));
        ClockThread::new(device, samples_tx, tempo_reader).handle_messages(protocol_rx);
        debug!("Hardware clock thread finished");
      })
      .map_err(|err| TimingFault::ClockUnavailable {
        cause: err.to_string(),
      })?;

    let init_result = match init_rx.recv_timeout(config.init_timeout()) {
      Ok(result) => result,
      Err(RecvTimeoutError::Timeout) => Err(TimingFault::ClockUnavailable {
        cause: "timeout opening the device".to_string(),
      }),
      Err(RecvTimeoutError::Disconnected) => Err(TimingFault::Disconnected),
    };

    let mut source = HardwareClockSource {
      handler: Some(handler),
      protocol_tx,
      samples_rx,
      tempo: tempo_writer,
    };

    match init_result {
      Ok(()) => Ok(source),
      Err(err) => {
        source.shutdown();
        Err(err)
      }
    }
  }

  fn acquire_priority(config: &ClockConfig) -> Option<ClockPriority> {
    match ClockPriority::acquire(config) {
      Ok(priority) => {
        debug!("Hardware clock thread has now real-time priority");
        Some(priority)
      }
      Err(fault) => {
        warn!("{}", fault);
        None
      }
    }
  }

  fn shutdown(&mut self) {
    if let Some(handler) = self.handler.take() {
      drop(self.protocol_tx.send(Protocol::Shutdown));
      if handler.join().is_err() {
        warn!("Failed to join the hardware clock thread");
      }
    }
  }
}

impl ClockSource for HardwareClockSource {
  fn start(&mut self) -> Result<(), TimingFault> {
    self
      .protocol_tx
      .send(Protocol::Run)
      .map_err(|_| TimingFault::Disconnected)
  }

  fn halt(&mut self) {
    drop(self.protocol_tx.send(Protocol::Halt));
  }

  fn set_tempo(&mut self, tempo: Tempo) {
    self.tempo.write(tempo);
  }

  fn poll(&mut self) -> Option<ClockSample> {
    self.samples_rx.try_iter().last()
  }
}

impl Drop for HardwareClockSource {
  fn drop(&mut self) {
    info!("Stopping the hardware clock ...");
    self.shutdown();
  }
}

#[cfg(test)]
mod test {

  use std::time::Duration;

  use super::{DeviceClock, HardwareClockSource};
  use crate::clock::ClockSource;
  use crate::config::Clock as ClockConfig;
  use crate::error::TimingFault;
  use crate::time::{SampleRate, Tempo};

  /// Device returning buffers as fast as they are asked for.
  struct FreeRunningDevice {
    frames: u32,
  }

  impl DeviceClock for FreeRunningDevice {
    fn sample_rate(&self) -> SampleRate {
      48000
    }

    fn wait_buffer(&mut self) -> Result<u32, TimingFault> {
      std::thread::sleep(Duration::from_millis(1));
      Ok(self.frames)
    }
  }

  struct BrokenDevice;

  impl DeviceClock for BrokenDevice {
    fn sample_rate(&self) -> SampleRate {
      48000
    }

    fn open(&mut self) -> Result<(), TimingFault> {
      Err(TimingFault::ClockUnavailable {
        cause: "unplugged".to_string(),
      })
    }

    fn wait_buffer(&mut self) -> Result<u32, TimingFault> {
      Err(TimingFault::Disconnected)
    }
  }

  fn config() -> ClockConfig {
    ClockConfig {
      realtime_priority: false,
      ..ClockConfig::default()
    }
  }

  #[test]
  pub fn emits_samples_once_started() {
    let mut source = HardwareClockSource::spawn(FreeRunningDevice { frames: 480 }, &config()).unwrap();
    source.set_tempo(Tempo::clamped(120.0));
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(source.poll(), None);

    source.start().unwrap();
    let mut sample = None;
    for _ in 0..200 {
      std::thread::sleep(Duration::from_millis(5));
      sample = source.poll().or(sample);
      if sample.map_or(false, |sample| sample.beat >= 0.1) {
        break;
      }
    }

    let sample = sample.expect("no clock samples");
    // 480 frames at 48kHz are 10ms, 120 bpm gives 0.02 beats per buffer
    let buffers = (sample.current_time.to_millis() / 10.0).round();
    assert!((sample.beat - buffers * 0.02).abs() < 1e-9);
    assert!((sample.beat_fraction - sample.beat.fract()).abs() < 1e-12);
  }

  #[test]
  pub fn halted_source_stops_emitting() {
    let mut source = HardwareClockSource::spawn(FreeRunningDevice { frames: 48 }, &config()).unwrap();
    source.start().unwrap();
    std::thread::sleep(Duration::from_millis(20));
    source.halt();
    std::thread::sleep(Duration::from_millis(20));
    source.poll();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(source.poll(), None);
  }

  #[test]
  pub fn failing_device_is_reported() {
    match HardwareClockSource::spawn(BrokenDevice, &config()) {
      Err(TimingFault::ClockUnavailable { cause }) => assert_eq!(cause, "unplugged"),
      Err(other) => panic!("unexpected {:?}", other),
      Ok(_) => panic!("the device should have failed"),
    }
  }
}
