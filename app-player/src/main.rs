use std::io::BufRead;

use log::{debug, info, warn};

use failure::{Error, Fail};

use tactus_core::bus::{Event, EventBus, EventKind, Subscription};
use tactus_core::clock::{manual_clock, ClockSource, HardwareClockSource, SystemDeviceClock};
use tactus_core::plan::MetronomePlan;
use tactus_core::score::ScoreDefinition;
use tactus_core::time::Tempo;
use tactus_core::transport::TransportEngine;

mod config;
use crate::config::Config;

mod input;
use crate::input::{parse_line, Input};

mod player;
use crate::player::{LogBackend, Player};

const TACTUS_CONFIG: &str = "TACTUS_CONFIG";
const DEFAULT_TACTUS_CONFIG: &str = "tactus.toml";

const TACTUS_LOG_CONFIG: &str = "TACTUS_LOG_CONFIG";
const DEFAULT_TACTUS_LOG_CONFIG: &str = "log4rs.yaml";

#[derive(Debug, Fail)]
enum MainError {
  #[fail(display = "Failed to init logging: {}", cause)]
  LoggingInit { cause: String },
}

fn main() -> Result<(), Error> {
  init_logging()?;

  let config = init_config()?;

  let bus = EventBus::new();
  let subscriptions = init_listeners(&bus);

  let clock = init_clock(&config);

  let engine = init_engine(&config, clock, bus.clone())?;
  let handle = engine.handle();

  let player = Player::new(engine, config.player.frame(), config.player.report_period())?;

  info!("Ready, type play, pause, stop, seek, tempo, loop, noloop, stats or quit");
  let stdin = std::io::stdin();
  for line in stdin.lock().lines() {
    match parse_line(line?.as_str()) {
      Ok(Input::Transport(command)) => handle.post(command)?,
      Ok(Input::Stats) => player.stats(),
      Ok(Input::Quit) => break,
      Ok(Input::Empty) => {}
      Err(err) => warn!("{}", err),
    }
  }

  player.stop()?;

  for subscription in subscriptions {
    subscription.unsubscribe();
  }

  Ok(())
}

fn init_logging() -> Result<(), Error> {
  let log_config_path =
    std::env::var(TACTUS_LOG_CONFIG).unwrap_or_else(|_| DEFAULT_TACTUS_LOG_CONFIG.to_string());

  log4rs::init_file(log_config_path.as_str(), Default::default()).map_err(|err| {
    MainError::LoggingInit {
      cause: err.to_string(),
    }
  })?;

  Ok(())
}

fn init_config() -> Result<Config, Error> {
  let config_path =
    std::env::var(TACTUS_CONFIG).unwrap_or_else(|_| DEFAULT_TACTUS_CONFIG.to_string());

  info!("Loading player configuration from {} ...", config_path);
  let mut config = Config::from_file(config_path.as_str())?;

  if let Some(score) = std::env::args().nth(1) {
    config.player.score = Some(score);
  }

  debug!("{:#?}", config);

  Ok(config)
}

fn init_listeners(bus: &EventBus) -> Vec<Subscription> {
  vec![
    bus.subscribe(EventKind::Position, |event| {
      if let Event::Position(snapshot) = event {
        info!(
          "{} {} bpm{}",
          snapshot.position,
          snapshot.tempo,
          if snapshot.is_playing { "" } else { " (stopped)" }
        );
      }
      Ok(())
    }),
    bus.subscribe(EventKind::Command, |event| {
      if let Event::Command(event) = event {
        debug!("Applied {} from {:?}", event.command, event.origin);
      }
      Ok(())
    }),
  ]
}

fn init_clock(config: &Config) -> Box<dyn ClockSource> {
  info!("Initialising the clock ...");

  let clock_config = &config.core.clock;
  let device = SystemDeviceClock::new(clock_config.sample_rate, clock_config.frames);

  match HardwareClockSource::spawn(device, clock_config) {
    Ok(source) => Box::new(source),
    Err(err) => {
      warn!("{}, the transport will advance from the player loop", err);
      let (source, _handle) = manual_clock();
      Box::new(source.failing(err.to_string()))
    }
  }
}

fn init_engine(
  config: &Config,
  clock: Box<dyn ClockSource>,
  bus: EventBus,
) -> Result<TransportEngine, Error> {
  info!("Initialising the transport ...");

  let mut engine = TransportEngine::new(&config.core, clock, Box::new(LogBackend), bus);
  engine.add_plan(Box::new(MetronomePlan::new(config.core.metronome.clone())));

  if let Some(path) = config.player.score.as_ref() {
    info!("Loading score from {} ...", path);
    let score = ScoreDefinition::from_file(path.as_str())?;
    let lattice = score.build_lattice(Tempo::clamped(config.core.transport.default_bpm))?;
    let notes = score.notes_plan(&lattice)?;
    debug!("{} measures, {} notes", lattice.len(), notes.len());
    engine.add_plan(Box::new(notes));
    engine.load(lattice)?;
  }

  Ok(engine)
}
