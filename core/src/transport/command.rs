use std::fmt;

use crate::coordinator::ContextId;
use crate::time::{ClockTime, Position, Tempo, TicksTime};

/// Loop bounds. A missing start means the score start, a missing end the score end.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoopRegion {
  pub start: Option<Position>,
  pub end: Option<Position>,
  pub enabled: bool,
}

impl LoopRegion {
  pub fn new(start: Position, end: Position) -> LoopRegion {
    LoopRegion {
      start: Some(start),
      end: Some(end),
      enabled: true,
    }
  }

  pub fn disabled() -> LoopRegion {
    LoopRegion::default()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
  Play,
  Pause,
  Stop,
  Seek(Position),
  SetTempo { bpm: f64, immediate: bool },
  SetLoop(LoopRegion),
  ClearLoop,
}

impl fmt::Display for Command {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Command::Play => write!(f, "play"),
      Command::Pause => write!(f, "pause"),
      Command::Stop => write!(f, "stop"),
      Command::Seek(position) => write!(f, "seek {}", position),
      Command::SetTempo { bpm, immediate } => {
        write!(f, "tempo {}{}", bpm, if *immediate { " now" } else { "" })
      }
      Command::SetLoop(region) => match (region.start, region.end) {
        (Some(start), Some(end)) => write!(f, "loop {} {}", start, end),
        _ => write!(f, "loop"),
      },
      Command::ClearLoop => write!(f, "noloop"),
    }
  }
}

/// Where a command was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
  Local,
  Remote(ContextId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandEvent {
  pub command: Command,
  pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportSnapshot {
  pub position: Position,
  pub absolute_tick: TicksTime,
  pub tempo: Tempo,
  pub is_playing: bool,
  pub loop_region: LoopRegion,
  pub timestamp: ClockTime,
}
