use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Select, Sender};
use failure::{Error, Fail};
use log::{debug, info, trace};

use tactus_core::plan::Trigger;
use tactus_core::scheduler::TriggerBackend;
use tactus_core::time::ClockTime;
use tactus_core::transport::TransportEngine;

#[derive(Debug, Fail)]
pub enum PlayerError {
  #[fail(display = "Failed to create the Player thread: {}", cause)]
  Start { cause: String },

  #[fail(display = "Failed to join the Player thread")]
  Stop,
}

pub enum Protocol {
  Stop,

  Stats,
}

/// Logs the triggers instead of sounding them.
pub struct LogBackend;

impl TriggerBackend<Trigger> for LogBackend {
  fn is_ready(&self) -> bool {
    true
  }

  fn trigger(&mut self, due: ClockTime, payload: &Trigger) -> Result<(), Error> {
    match payload {
      Trigger::Click { accent: true } => debug!("[{:.1}] TICK", due.to_millis()),
      Trigger::Click { accent: false } => debug!("[{:.1}] tick", due.to_millis()),
      Trigger::Note {
        key,
        velocity,
        duration,
      } => debug!(
        "[{:.1}] note {} vel {} for {} ticks",
        due.to_millis(),
        key,
        velocity,
        duration.get_ticks()
      ),
    }
    Ok(())
  }
}

struct PlayerThread {
  engine: TransportEngine,
  started: Instant,
}

impl PlayerThread {
  fn new(engine: TransportEngine) -> PlayerThread {
    PlayerThread {
      engine,
      started: Instant::now(),
    }
  }

  fn report(&self) {
    let telemetry = self.engine.telemetry();
    info!(
      "{:?} at {} ({} bpm), loops {}",
      self.engine.state(),
      self.engine.position(),
      self.engine.tempo(),
      self.engine.loop_iterations()
    );
    info!("{:#?}", telemetry);
  }

  pub fn handle_messages(
    &mut self,
    protocol_rx: Receiver<Protocol>,
    frame: Duration,
    report_period: Option<Duration>,
  ) {
    let frames = crossbeam_channel::tick(frame);
    let reports = report_period
      .map(crossbeam_channel::tick)
      .unwrap_or_else(crossbeam_channel::never);

    let mut sel = Select::new();
    let protocol_index = sel.recv(&protocol_rx);
    let frames_index = sel.recv(&frames);
    let reports_index = sel.recv(&reports);

    loop {
      let oper = sel.select();
      match oper.index() {
        index if index == frames_index => {
          if oper.recv(&frames).is_ok() {
            let now = ClockTime::from(self.started.elapsed());
            trace!("Frame at {:.3} ms", now.to_millis());
            self.engine.tick(now);
          }
        }
        index if index == reports_index => {
          if oper.recv(&reports).is_ok() {
            self.report();
          }
        }
        index if index == protocol_index => match oper.recv(&protocol_rx) {
          Ok(Protocol::Stats) => self.report(),
          Ok(Protocol::Stop) | Err(_) => {
            self.engine.stop();
            self.engine.tick(ClockTime::from(self.started.elapsed()));
            break;
          }
        },
        _ => unreachable!(),
      }
    }
  }
}

pub struct Player {
  handler: JoinHandle<()>,
  protocol_tx: Sender<Protocol>,
}

impl Player {
  pub fn new(
    engine: TransportEngine,
    frame: Duration,
    report_period: Option<Duration>,
  ) -> Result<Player, PlayerError> {
    info!("Starting Player ...");

    let (protocol_tx, protocol_rx) = crossbeam_channel::unbounded::<Protocol>();

    thread::Builder::new()
      .name("player".into())
      .spawn(move || PlayerThread::new(engine).handle_messages(protocol_rx, frame, report_period))
      .map_err(|err| PlayerError::Start {
        cause: err.to_string(),
      })
      .map(|handler| Player {
        handler,
        protocol_tx,
      })
  }

  pub fn stats(&self) {
    drop(self.protocol_tx.send(Protocol::Stats));
  }

  pub fn stop(self) -> Result<(), PlayerError> {
    info!("Stopping Player ...");

    self
      .protocol_tx
      .send(Protocol::Stop)
      .map_err(|_| PlayerError::Stop)
      .and_then(|()| self.handler.join().map_err(|_| PlayerError::Stop))
  }
}
