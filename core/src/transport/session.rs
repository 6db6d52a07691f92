use crossbeam_channel::Sender;

use crate::error::StateError;

use super::{Command, CommandEvent, Origin};

/// Identifies a play session. Every play, pause, stop and seek starts a new one,
/// so late continuations of an older session can tell they are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SessionToken(u64);

impl SessionToken {
  pub fn initial() -> SessionToken {
    SessionToken(0)
  }

  pub fn next(self) -> SessionToken {
    SessionToken(self.0 + 1)
  }

  pub fn get_value(&self) -> u64 {
    self.0
  }
}

pub(crate) enum EngineMessage {
  Command(CommandEvent),
  WarmedUp(SessionToken),
}

/// Handed to the trigger backend when warming up. Completing it lets the engine
/// plan events, as long as the session is still the current one.
pub struct WarmUpTicket {
  token: SessionToken,
  inbox: Sender<EngineMessage>,
}

impl WarmUpTicket {
  pub(crate) fn new(token: SessionToken, inbox: Sender<EngineMessage>) -> WarmUpTicket {
    WarmUpTicket { token, inbox }
  }

  pub fn token(&self) -> SessionToken {
    self.token
  }

  pub fn complete(self) {
    drop(self.inbox.send(EngineMessage::WarmedUp(self.token)));
  }
}

/// Posts commands into the engine inbox from any thread. They are applied in
/// order at the start of the next engine tick.
#[derive(Clone)]
pub struct EngineHandle {
  inbox: Sender<EngineMessage>,
}

impl EngineHandle {
  pub(crate) fn new(inbox: Sender<EngineMessage>) -> EngineHandle {
    EngineHandle { inbox }
  }

  pub fn post(&self, command: Command) -> Result<(), StateError> {
    self.post_from(command, Origin::Local)
  }

  pub fn post_from(&self, command: Command, origin: Origin) -> Result<(), StateError> {
    self
      .inbox
      .send(EngineMessage::Command(CommandEvent { command, origin }))
      .map_err(|_| StateError::EngineGone)
  }
}
