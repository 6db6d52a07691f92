//! The transport: play state, musical position, tempo and loops.
//!
//! The engine is driven by calling `tick` from a general purpose loop (a
//! render loop, a timer thread). Every tick it applies the commands posted
//! into its inbox, converts the clock source samples into an absolute tick,
//! applies loops, plans and fires events, and publishes its state through
//! the event bus.

pub mod clock_mode;
pub mod command;
pub mod session;

pub use self::clock_mode::{ClockMode, ClockTracker};
pub use self::command::{Command, CommandEvent, LoopRegion, Origin, TransportSnapshot};
pub use self::session::{EngineHandle, SessionToken, WarmUpTicket};

use crossbeam_channel::{Receiver, Sender};
use failure::Error;
use log::{debug, info, warn};

use crate::bus::{Delivery, Event, EventBus, Telemetry};
use crate::clock::ClockSource;
use crate::config::Config;
use crate::error::{DataError, StateError};
use crate::plan::{Lane, PlaybackPlan, Trigger};
use crate::scheduler::{Cursor, LookaheadScheduler, TriggerBackend};
use crate::time::{ClockTime, Position, Tempo, TicksTime, TimeLattice};

use self::session::EngineMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
  Idle,
  Loading,
  Ready,
  Playing,
  Paused,
  Stopped,
}

pub type Backend = Box<dyn TriggerBackend<Trigger> + Send>;

// What the last published position looked like.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Published {
  measure: u32,
  beat: u32,
  playing: bool,
  tempo: Tempo,
}

pub struct TransportEngine {
  state: TransportState,

  score: TimeLattice,
  lattice: TimeLattice,
  default_tempo: Tempo,
  tempo_override: Option<Tempo>,

  position: Position,
  tick: TicksTime,
  now: ClockTime,

  loop_region: LoopRegion,
  loop_ticks: Option<(TicksTime, TicksTime)>,
  loop_iterations: u64,

  session: SessionToken,
  warmed_up: Option<SessionToken>,
  pending_play: bool,

  clock: Box<dyn ClockSource>,
  tracker: ClockTracker,
  clock_measure: Option<u32>,

  plans: Vec<Box<dyn PlaybackPlan>>,
  planned_until: TicksTime,
  notes: LookaheadScheduler<Trigger>,
  clicks: LookaheadScheduler<Trigger>,
  backend: Backend,

  bus: EventBus,
  inbox_tx: Sender<EngineMessage>,
  inbox_rx: Receiver<EngineMessage>,
  published: Option<Published>,
}

impl TransportEngine {
  pub fn new(
    config: &Config,
    clock: Box<dyn ClockSource>,
    backend: Backend,
    bus: EventBus,
  ) -> TransportEngine {
    let (inbox_tx, inbox_rx) = crossbeam_channel::unbounded();
    TransportEngine {
      state: TransportState::Idle,

      score: TimeLattice::empty(),
      lattice: TimeLattice::empty(),
      default_tempo: Tempo::clamped(config.transport.default_bpm),
      tempo_override: None,

      position: Position::start(),
      tick: TicksTime::zero(),
      now: ClockTime::zero(),

      loop_region: LoopRegion::disabled(),
      loop_ticks: None,
      loop_iterations: 0,

      session: SessionToken::initial(),
      warmed_up: None,
      pending_play: false,

      clock,
      tracker: ClockTracker::new(config.transport.stall_threshold_frames),
      clock_measure: None,

      plans: Vec::new(),
      planned_until: TicksTime::zero(),
      notes: LookaheadScheduler::new("notes", config.scheduler.lookahead_ms),
      clicks: LookaheadScheduler::new("clicks", config.scheduler.click_lookahead_ms),
      backend,

      bus,
      inbox_tx,
      inbox_rx,
      published: None,
    }
  }

  pub fn handle(&self) -> EngineHandle {
    EngineHandle::new(self.inbox_tx.clone())
  }

  pub fn bus(&self) -> &EventBus {
    &self.bus
  }

  pub fn add_plan(&mut self, plan: Box<dyn PlaybackPlan>) {
    self.plans.push(plan);
  }

  pub fn state(&self) -> TransportState {
    self.state
  }

  pub fn is_playing(&self) -> bool {
    self.state == TransportState::Playing
  }

  pub fn has_score(&self) -> bool {
    !self.score.is_empty()
  }

  pub fn lattice(&self) -> &TimeLattice {
    &self.lattice
  }

  pub fn position(&self) -> Position {
    self.position
  }

  pub fn absolute_tick(&self) -> TicksTime {
    self.tick
  }

  /// Tempo at the current position.
  pub fn tempo(&self) -> Tempo {
    self
      .lattice
      .measure(self.position.get_measure())
      .or_else(|| self.lattice.measures().last())
      .map(|measure| measure.bpm)
      .unwrap_or_else(|| self.tempo_override.unwrap_or(self.default_tempo))
  }

  pub fn loop_region(&self) -> LoopRegion {
    self.loop_region
  }

  pub fn loop_iterations(&self) -> u64 {
    self.loop_iterations
  }

  pub fn session(&self) -> SessionToken {
    self.session
  }

  pub fn clock_mode(&self) -> ClockMode {
    self.tracker.mode()
  }

  pub fn pending_events(&self) -> usize {
    self.notes.len() + self.clicks.len()
  }

  pub fn snapshot(&self) -> TransportSnapshot {
    TransportSnapshot {
      position: self.position,
      absolute_tick: self.tick,
      tempo: self.tempo(),
      is_playing: self.is_playing(),
      loop_region: self.loop_region,
      timestamp: self.tracker.clock_time(),
    }
  }

  pub fn telemetry(&self) -> Telemetry {
    self.bus.telemetry()
  }

  pub fn reset_telemetry(&mut self) {
    self.notes.reset_stats();
    self.clicks.reset_stats();
    self.bus.reset_telemetry();
  }

  /// Replaces the score. A playing transport is stopped first.
  pub fn load(&mut self, lattice: TimeLattice) -> Result<(), StateError> {
    if self.state == TransportState::Playing || self.state == TransportState::Paused {
      self.halt_session();
    }

    self.state = TransportState::Loading;
    if lattice.is_empty() {
      self.score = TimeLattice::empty();
      self.lattice = TimeLattice::empty();
      self.state = TransportState::Idle;
      return Err(StateError::EmptyScore);
    }

    let lattice = match self.tempo_override.take() {
      Some(tempo) => lattice.with_tempo_from(0, tempo),
      None => lattice,
    };
    info!("Loaded a score with {} measures", lattice.len());
    self.score = lattice.clone();
    self.lattice = lattice;
    self.clock_measure = None;
    self.loop_region = LoopRegion::disabled();
    self.loop_ticks = None;
    self.loop_iterations = 0;
    self.move_position(TicksTime::zero());
    self.state = TransportState::Ready;

    if self.pending_play {
      self.pending_play = false;
      self.start_playing(Origin::Local)?;
    }
    Ok(())
  }

  pub fn play(&mut self) -> Result<(), StateError> {
    self.start_playing(Origin::Local)
  }

  pub fn pause(&mut self) {
    self.pause_playing(Origin::Local)
  }

  pub fn stop(&mut self) {
    self.stop_playing(Origin::Local)
  }

  pub fn seek(&mut self, position: Position) -> Result<(), Error> {
    self.seek_to(position, Origin::Local)
  }

  /// Returns the clamped tempo. While playing it takes effect on the next
  /// measure unless `immediate`.
  pub fn set_tempo(&mut self, bpm: f64, immediate: bool) -> Tempo {
    self.change_tempo(bpm, immediate, Origin::Local)
  }

  pub fn set_loop(&mut self, region: LoopRegion) -> Result<(), Error> {
    self.change_loop(region, Origin::Local)
  }

  pub fn clear_loop(&mut self) {
    self.remove_loop(Origin::Local)
  }

  /// Applies a command as if called through the matching operation.
  pub fn dispatch(&mut self, command: Command, origin: Origin) -> Result<(), Error> {
    match command {
      Command::Play => self.start_playing(origin)?,
      Command::Pause => self.pause_playing(origin),
      Command::Stop => self.stop_playing(origin),
      Command::Seek(position) => self.seek_to(position, origin)?,
      Command::SetTempo { bpm, immediate } => {
        self.change_tempo(bpm, immediate, origin);
      }
      Command::SetLoop(region) => self.change_loop(region, origin)?,
      Command::ClearLoop => self.remove_loop(origin),
    }
    Ok(())
  }

  /// Runs one iteration of the transport loop. `now` is the loop time.
  pub fn tick(&mut self, now: ClockTime) {
    self.now = now;
    self.drain_inbox();

    if self.state == TransportState::Playing {
      self.advance();
    }

    self.update_telemetry();
    self.publish_position();
    self.bus.flush();
  }

  fn start_playing(&mut self, origin: Origin) -> Result<(), StateError> {
    match self.state {
      TransportState::Playing => return Ok(()),
      TransportState::Idle | TransportState::Loading => {
        debug!("No score loaded yet, play is pending");
        self.pending_play = true;
        return Ok(());
      }
      TransportState::Ready | TransportState::Paused | TransportState::Stopped => {}
    }

    if self.lattice.is_empty() {
      return Err(StateError::EmptyScore);
    }

    if self.tick >= self.lattice.total_ticks() {
      self.move_position(TicksTime::zero());
    }

    self.session = self.session.next();
    self.warmed_up = None;
    self.state = TransportState::Playing;
    self.tracker.restart(self.tick);
    self.clock_measure = None;
    self.sync_clock_tempo();
    if let Err(fault) = self.clock.start() {
      warn!("{}, advancing from the render loop", fault);
      self.tracker.fall_back(self.tick, self.now);
    }
    self.planned_until = self.tick;
    self.request_warm_up();

    info!("Playing from {}", self.position);
    self.announce(Command::Play, origin);
    Ok(())
  }

  fn pause_playing(&mut self, origin: Origin) {
    if self.state != TransportState::Playing {
      return;
    }
    self.halt_session();
    self.state = TransportState::Paused;
    info!("Paused at {}", self.position);
    self.announce(Command::Pause, origin);
  }

  fn stop_playing(&mut self, origin: Origin) {
    self.pending_play = false;
    if !self.has_score() {
      self.session = self.session.next();
      return;
    }

    self.halt_session();
    self.lattice = self.score.clone();
    self.clock_measure = None;
    self.loop_iterations = 0;
    self.move_position(TicksTime::zero());
    self.tracker.rebase(self.tick, self.now);
    self.state = TransportState::Stopped;
    info!("Stopped");
    self.announce(Command::Stop, origin);
  }

  fn seek_to(&mut self, position: Position, origin: Origin) -> Result<(), Error> {
    if !self.has_score() {
      return Err(StateError::NoScore { operation: "seek" }.into());
    }
    let tick = self.lattice.position_to_tick(position)?;

    self.session = self.session.next();
    self.flush_events();
    self.move_position(tick);

    if self.state == TransportState::Playing {
      self.tracker.rebase(tick, self.now);
      if self.warmed_up.is_some() {
        self.warmed_up = Some(self.session);
      } else {
        self.request_warm_up();
      }
    }

    debug!("Moved to {}", self.position);
    self.announce(Command::Seek(position), origin);
    Ok(())
  }

  fn change_tempo(&mut self, bpm: f64, immediate: bool, origin: Origin) -> Tempo {
    let tempo = Tempo::clamped(bpm);

    if self.has_score() {
      let measure = self.position.get_measure();
      let from = if self.is_playing() && !immediate {
        measure + 1
      } else {
        measure
      };
      self.lattice = self.lattice.with_tempo_from(from, tempo);
      self.tracker.rebase(self.tick, self.now);
      if from == measure {
        self.clock_measure = None;
        self.sync_clock_tempo();
      }
      info!("Tempo {} from measure {}", tempo, from + 1);
    } else {
      self.tempo_override = Some(tempo);
    }

    self.announce(
      Command::SetTempo {
        bpm: tempo.get_value(),
        immediate,
      },
      origin,
    );
    tempo
  }

  fn change_loop(&mut self, region: LoopRegion, origin: Origin) -> Result<(), Error> {
    if !region.enabled {
      self.loop_region = region;
      self.loop_ticks = None;
      self.announce(Command::SetLoop(region), origin);
      return Ok(());
    }

    if !self.has_score() {
      return Err(StateError::NoScore { operation: "loop" }.into());
    }

    let start = region.start.unwrap_or_else(Position::start);
    let end = region.end.unwrap_or_else(|| self.lattice.end_of_score());
    let start_tick = self.lattice.position_to_tick(start)?;
    let end_tick = self.lattice.position_to_tick(end)?;
    if start_tick >= end_tick {
      return Err(
        DataError::InvalidLoop {
          cause: format!("start {} is not before end {}", start, end),
        }
        .into(),
      );
    }

    self.loop_region = region;
    self.loop_ticks = Some((start_tick, end_tick));
    if self.is_playing() {
      // events past the new end were planned without the loop
      self.flush_events();
      self.planned_until = self.tick;
    }

    info!("Looping from {} to {}", start, end);
    self.announce(Command::SetLoop(region), origin);
    Ok(())
  }

  fn remove_loop(&mut self, origin: Origin) {
    self.loop_region = LoopRegion::disabled();
    self.loop_ticks = None;
    self.announce(Command::ClearLoop, origin);
  }

  fn drain_inbox(&mut self) {
    while let Ok(message) = self.inbox_rx.try_recv() {
      match message {
        EngineMessage::Command(event) => {
          let description = event.command.to_string();
          if let Err(err) = self.dispatch(event.command, event.origin) {
            warn!("Rejected '{}': {}", description, err);
          }
        }
        EngineMessage::WarmedUp(token) => self.complete_warm_up(token),
      }
    }
  }

  fn complete_warm_up(&mut self, token: SessionToken) {
    if token == self.session && self.is_playing() {
      debug!("Trigger backend ready for session {}", token.get_value());
      self.warmed_up = Some(token);
      self.planned_until = self.tick;
    } else {
      debug!("Ignoring the warm up of session {}", token.get_value());
    }
  }

  fn request_warm_up(&mut self) {
    let ticket = WarmUpTicket::new(self.session, self.inbox_tx.clone());
    self.backend.warm_up(ticket);
  }

  fn advance(&mut self) {
    let sample = self.clock.poll();
    let previous = self.tick;
    self.tick = self
      .tracker
      .advance(sample, self.now, previous, &self.lattice);

    if let Some((start, end)) = self.loop_ticks {
      if self.tick >= end {
        self.wrap_loop(start);
      }
    }

    if self.tick >= self.lattice.total_ticks() {
      info!("End of score");
      self.stop_playing(Origin::Local);
      return;
    }

    self.position = self.lattice.tick_to_position(self.tick);
    self.sync_clock_tempo();

    if self.warmed_up == Some(self.session) {
      self.plan_ahead();
      self.fire_events();
    }
  }

  fn wrap_loop(&mut self, start: TicksTime) {
    self.tick = start;
    self.loop_iterations += 1;
    debug!("Loop iteration {}", self.loop_iterations);

    self.flush_events();
    self.planned_until = start;
    self.tracker.rebase(self.tick, self.now);
  }

  fn plan_ahead(&mut self) {
    let lookahead = self.notes.lookahead_ms().max(self.clicks.lookahead_ms());
    let horizon = self
      .lattice
      .millis_to_tick(self.lattice.tick_to_millis(self.tick) + lookahead);

    let mut until = match self.lattice.measure_at_tick(horizon) {
      Some(index) => self.lattice.measures()[index].tick_end,
      None => self.lattice.total_ticks(),
    };
    if let Some((_, end)) = self.loop_ticks {
      until = until.min(end);
    }
    if self.planned_until >= until {
      return;
    }

    for plan in self.plans.iter() {
      for (tick, trigger) in plan.events_between(&self.lattice, self.planned_until, until) {
        match trigger.lane() {
          Lane::Notes => self.notes.schedule(tick, trigger),
          Lane::Clicks => self.clicks.schedule(tick, trigger),
        };
      }
    }
    self.planned_until = until;
  }

  fn fire_events(&mut self) {
    let cursor = Cursor::new(self.tracker.clock_time(), self.tick);
    self.notes.advance(cursor, &self.lattice, &mut *self.backend);
    self.clicks.advance(cursor, &self.lattice, &mut *self.backend);
  }

  fn halt_session(&mut self) {
    self.session = self.session.next();
    self.warmed_up = None;
    self.clock.halt();
    self.flush_events();
  }

  fn flush_events(&mut self) {
    self.notes.flush();
    self.clicks.flush();
    self.planned_until = self.tick;
  }

  fn move_position(&mut self, tick: TicksTime) {
    self.tick = tick;
    self.position = self.lattice.tick_to_position(tick);
    self.planned_until = tick;
  }

  fn sync_clock_tempo(&mut self) {
    let measure = self.position.get_measure();
    if self.clock_measure != Some(measure) {
      if let Some(info) = self.lattice.measure(measure) {
        self.clock.set_tempo(info.bpm);
      }
      self.clock_measure = Some(measure);
    }
  }

  /// Stop and seek reach the subscribers right away, the rest with the frame flush.
  fn announce(&self, command: Command, origin: Origin) {
    let delivery = match command {
      Command::Stop | Command::Seek(_) => Delivery::Immediate,
      _ => Delivery::Batched,
    };
    self
      .bus
      .publish(Event::Command(CommandEvent { command, origin }), delivery);
  }

  fn update_telemetry(&self) {
    let notes = self.notes.stats();
    let clicks = self.clicks.stats();
    let drift_heat = self.tracker.drift_heat();
    let fallback = self.tracker.mode().is_fallback();
    let loop_iterations = self.loop_iterations;
    self.bus.update_telemetry(|telemetry| {
      telemetry.jitter_max_ms = notes.jitter_max_ms.max(clicks.jitter_max_ms);
      telemetry.drift_heat = drift_heat;
      telemetry.using_software_fallback = fallback;
      telemetry.events_fired = notes.fired + clicks.fired;
      telemetry.events_dropped = notes.dropped + clicks.dropped;
      telemetry.scheduling_overruns = notes.overruns + clicks.overruns;
      telemetry.loop_iterations = loop_iterations;
    });
  }

  fn publish_position(&mut self) {
    let current = Published {
      measure: self.position.get_measure(),
      beat: self.position.get_beat(),
      playing: self.is_playing(),
      tempo: self.tempo(),
    };
    if self.published == Some(current) {
      return;
    }
    self.published = Some(current);
    self
      .bus
      .publish(Event::Position(self.snapshot()), Delivery::Batched);
    self
      .bus
      .publish(Event::Telemetry(self.bus.telemetry()), Delivery::Batched);
  }
}
