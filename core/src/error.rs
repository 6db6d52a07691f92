use failure::Fail;

use crate::bus::EventKind;
use crate::time::Position;

/// Malformed input data: time signatures, tempos, positions or scores.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum DataError {
  #[fail(
    display = "Invalid time signature {}/{}: {}",
    numerator, denominator, cause
  )]
  InvalidSignature {
    numerator: i64,
    denominator: i64,
    cause: String,
  },

  #[fail(display = "Malformed time signature '{}'", text)]
  MalformedSignature { text: String },

  #[fail(display = "Invalid tempo: {} bpm", bpm)]
  InvalidTempo { bpm: f64 },

  #[fail(display = "Malformed position '{}'", text)]
  MalformedPosition { text: String },

  #[fail(
    display = "Position {} is out of the score bounds ({} measures)",
    position, measures
  )]
  OutOfBounds { position: Position, measures: usize },

  #[fail(display = "Invalid loop region: {}", cause)]
  InvalidLoop { cause: String },

  #[fail(display = "Malformed score: {}", cause)]
  MalformedScore { cause: String },
}

/// An operation that is not allowed in the current transport state.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum StateError {
  #[fail(display = "Cannot {} before a score is loaded", operation)]
  NoScore { operation: &'static str },

  #[fail(display = "A score without measures can not be played")]
  EmptyScore,

  #[fail(display = "The transport engine is gone")]
  EngineGone,
}

/// Clock problems. They never abort playback, the transport degrades to a
/// software clock and reports them through telemetry.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum TimingFault {
  #[fail(display = "Hardware clock unavailable: {}", cause)]
  ClockUnavailable { cause: String },

  #[fail(display = "Hardware clock stalled for {} frames", frames)]
  Stalled { frames: u32 },

  #[fail(display = "Hardware clock disconnected")]
  Disconnected,

  #[fail(display = "Clock thread kept its normal priority: {}", cause)]
  PriorityDenied { cause: String },
}

/// Failures of the cross context transport.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum RemoteError {
  #[fail(display = "Remote transport closed")]
  Closed,
}

#[derive(Debug, Fail, Clone, PartialEq)]
#[fail(display = "Subscriber for {:?} failed: {}", kind, cause)]
pub struct SubscriberFault {
  pub kind: EventKind,
  pub cause: String,
}

#[derive(Debug, Fail, Clone, PartialEq)]
#[fail(display = "Event {} fired {:.3} ms after its due time", id, late_ms)]
pub struct SchedulingOverrun {
  pub id: u64,
  pub late_ms: f64,
}
