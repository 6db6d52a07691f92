//! Keeps several transports, living in different contexts, playing together.
//!
//! Commands applied locally are broadcast to the other contexts, where they
//! are posted into the engine inbox with a remote origin, so they are never
//! broadcast back. Snapshots travel the same way, the latest one wins.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender};
use failure::Error;
use log::{debug, warn};
use uuid::Uuid;

use crate::bus::{Event, EventBus, EventKind, Subscription};
use crate::error::{RemoteError, StateError};
use crate::transport::{Command, EngineHandle, Origin, TransportSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
  pub fn new() -> ContextId {
    ContextId(Uuid::new_v4())
  }
}

impl Default for ContextId {
  fn default() -> ContextId {
    ContextId::new()
  }
}

impl fmt::Display for ContextId {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemotePayload {
  Command(Command),
  Snapshot(TransportSnapshot),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMessage {
  pub origin: ContextId,
  pub payload: RemotePayload,
}

/// Broadcast primitive shared by the contexts.
pub trait RemoteTransport: Send + Sync {
  fn broadcast(&self, message: RemoteMessage) -> Result<(), RemoteError>;

  fn try_recv(&self) -> Option<RemoteMessage>;
}

#[derive(Default)]
struct HubPeers {
  senders: Vec<Sender<RemoteMessage>>,
  closed: bool,
}

/// In process broadcast channel. Every connected port receives every message, its own included.
#[derive(Clone, Default)]
pub struct BroadcastHub {
  peers: Arc<Mutex<HubPeers>>,
}

impl BroadcastHub {
  pub fn new() -> BroadcastHub {
    BroadcastHub::default()
  }

  pub fn connect(&self) -> BroadcastPort {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
    if !peers.closed {
      peers.senders.push(tx);
    }
    BroadcastPort {
      peers: self.peers.clone(),
      rx,
    }
  }

  pub fn close(&self) {
    let mut peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
    peers.closed = true;
    peers.senders.clear();
  }
}

pub struct BroadcastPort {
  peers: Arc<Mutex<HubPeers>>,
  rx: Receiver<RemoteMessage>,
}

impl RemoteTransport for BroadcastPort {
  fn broadcast(&self, message: RemoteMessage) -> Result<(), RemoteError> {
    let mut peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
    if peers.closed {
      return Err(RemoteError::Closed);
    }
    // ports that went away are forgotten
    peers
      .senders
      .retain(|sender| sender.send(message.clone()).is_ok());
    Ok(())
  }

  fn try_recv(&self) -> Option<RemoteMessage> {
    self.rx.try_recv().ok()
  }
}

type RemoteSnapshot = Arc<Mutex<Option<(ContextId, TransportSnapshot)>>>;

pub struct CrossContextCoordinator {
  id: ContextId,
  transport: Arc<dyn RemoteTransport>,
  subscriptions: Vec<Subscription>,
  remote_snapshot: RemoteSnapshot,
}

impl CrossContextCoordinator {
  pub fn new(
    transport: Arc<dyn RemoteTransport>,
    bus: &EventBus,
    share_snapshots: bool,
  ) -> CrossContextCoordinator {
    let id = ContextId::new();
    let mut subscriptions = Vec::new();

    let commands_transport = transport.clone();
    subscriptions.push(bus.subscribe(EventKind::Command, move |event| {
      if let Event::Command(event) = event {
        if event.origin == Origin::Local {
          let message = RemoteMessage {
            origin: id,
            payload: RemotePayload::Command(event.command.clone()),
          };
          commands_transport.broadcast(message).map_err(Error::from)?;
        }
      }
      Ok(())
    }));

    if share_snapshots {
      let snapshots_transport = transport.clone();
      subscriptions.push(bus.subscribe(EventKind::Position, move |event| {
        if let Event::Position(snapshot) = event {
          let message = RemoteMessage {
            origin: id,
            payload: RemotePayload::Snapshot(snapshot.clone()),
          };
          snapshots_transport.broadcast(message).map_err(Error::from)?;
        }
        Ok(())
      }));
    }

    debug!("Coordinating transport context {}", id);
    CrossContextCoordinator {
      id,
      transport,
      subscriptions,
      remote_snapshot: RemoteSnapshot::default(),
    }
  }

  pub fn id(&self) -> ContextId {
    self.id
  }

  /// Posts the received remote commands into the engine inbox. Returns how many were posted.
  pub fn pump(&self, engine: &EngineHandle) -> Result<usize, StateError> {
    let mut posted = 0;
    while let Some(message) = self.transport.try_recv() {
      if message.origin == self.id {
        continue;
      }
      match message.payload {
        RemotePayload::Command(command) => {
          debug!("Remote command from {}: {}", message.origin, command);
          engine.post_from(command, Origin::Remote(message.origin))?;
          posted += 1;
        }
        RemotePayload::Snapshot(snapshot) => {
          *self
            .remote_snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((message.origin, snapshot));
        }
      }
    }
    Ok(posted)
  }

  /// The latest snapshot received from another context.
  pub fn remote_snapshot(&self) -> Option<(ContextId, TransportSnapshot)> {
    self
      .remote_snapshot
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub fn close(self) {
    for subscription in self.subscriptions {
      if !subscription.unsubscribe() {
        warn!("Coordinator subscription was already gone");
      }
    }
  }
}
