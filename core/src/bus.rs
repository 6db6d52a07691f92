//! Publish/subscribe of transport positions, commands and telemetry.
//!
//! Handlers run on the publishing thread, outside of any lock, over a
//! snapshot of the listeners taken before delivering, so they can subscribe,
//! unsubscribe or publish themselves.
//!
//! Delivery order within a frame:
//! 1. `Delivery::Immediate` events are delivered while publishing, so they
//!    always precede anything batched in the same frame.
//! 2. On `flush`, batched commands are delivered first, in publish order.
//! 3. Then only the most recent batched position.
//! 4. Then only the most recent batched telemetry.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use failure::Error;
use log::warn;

use crate::error::SubscriberFault;
use crate::transport::{CommandEvent, TransportSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  Position,
  Command,
  Telemetry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
  Position(TransportSnapshot),
  Command(CommandEvent),
  Telemetry(Telemetry),
}

impl Event {
  pub fn kind(&self) -> EventKind {
    match self {
      Event::Position(_) => EventKind::Position,
      Event::Command(_) => EventKind::Command,
      Event::Telemetry(_) => EventKind::Telemetry,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
  /// Delivered on the next frame flush
  Batched,
  Immediate,
}

/// Read-only diagnostics of the timing backbone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
  pub ticks_published: u64,
  pub commands_published: u64,
  pub jitter_max_ms: f64,
  pub drift_heat: f64,
  pub subscriber_count: usize,
  pub using_software_fallback: bool,
  pub subscriber_faults: u64,
  pub events_fired: u64,
  pub events_dropped: u64,
  pub scheduling_overruns: u64,
  pub loop_iterations: u64,
}

type Handler = Arc<dyn Fn(&Event) -> Result<(), Error> + Send + Sync>;

struct Listener {
  id: u64,
  kind: EventKind,
  handler: Handler,
}

#[derive(Default)]
struct Inner {
  listeners: Vec<Listener>,
  next_id: u64,
  pending: Vec<Event>,
  telemetry: Telemetry,
}

impl Inner {
  fn has_listeners(&self, kind: EventKind) -> bool {
    self.listeners.iter().any(|listener| listener.kind == kind)
  }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<Inner> {
  inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returned by `subscribe`, removes the handler when `unsubscribe` is called.
pub struct Subscription {
  id: u64,
  inner: Weak<Mutex<Inner>>,
}

impl Subscription {
  /// Returns false when the handler was already gone.
  pub fn unsubscribe(self) -> bool {
    match self.inner.upgrade() {
      Some(inner) => {
        let mut inner = lock(&inner);
        let before = inner.listeners.len();
        let id = self.id;
        inner.listeners.retain(|listener| listener.id != id);
        inner.telemetry.subscriber_count = inner.listeners.len();
        inner.listeners.len() != before
      }
      None => false,
    }
  }
}

#[derive(Clone, Default)]
pub struct EventBus {
  inner: Arc<Mutex<Inner>>,
}

impl EventBus {
  pub fn new() -> EventBus {
    EventBus::default()
  }

  pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
  where
    F: Fn(&Event) -> Result<(), Error> + Send + Sync + 'static,
  {
    let mut inner = lock(&self.inner);
    let id = inner.next_id;
    inner.next_id += 1;
    inner.listeners.push(Listener {
      id,
      kind,
      handler: Arc::new(handler),
    });
    inner.telemetry.subscriber_count = inner.listeners.len();
    Subscription {
      id,
      inner: Arc::downgrade(&self.inner),
    }
  }

  pub fn publish(&self, event: Event, delivery: Delivery) {
    {
      let mut inner = lock(&self.inner);
      if !inner.has_listeners(event.kind()) {
        return;
      }

      match event.kind() {
        EventKind::Position => inner.telemetry.ticks_published += 1,
        EventKind::Command => inner.telemetry.commands_published += 1,
        EventKind::Telemetry => {}
      }

      if delivery == Delivery::Batched {
        inner.pending.push(event);
        return;
      }
    }

    self.deliver(&event);
  }

  /// Delivers the batched events of the current frame. Returns how many were delivered.
  pub fn flush(&self) -> usize {
    let pending = std::mem::replace(&mut lock(&self.inner).pending, Vec::new());
    if pending.is_empty() {
      return 0;
    }

    let mut position = None;
    let mut telemetry = None;
    let mut ordered = Vec::with_capacity(pending.len());
    for event in pending {
      match event {
        Event::Command(_) => ordered.push(event),
        Event::Position(_) => position = Some(event),
        Event::Telemetry(_) => telemetry = Some(event),
      }
    }
    ordered.extend(position);
    ordered.extend(telemetry);

    for event in ordered.iter() {
      self.deliver(event);
    }
    ordered.len()
  }

  pub fn pending(&self) -> usize {
    lock(&self.inner).pending.len()
  }

  pub fn subscriber_count(&self) -> usize {
    lock(&self.inner).listeners.len()
  }

  pub fn telemetry(&self) -> Telemetry {
    lock(&self.inner).telemetry.clone()
  }

  pub fn reset_telemetry(&self) {
    let mut inner = lock(&self.inner);
    inner.telemetry = Telemetry {
      subscriber_count: inner.listeners.len(),
      using_software_fallback: inner.telemetry.using_software_fallback,
      ..Telemetry::default()
    };
  }

  pub(crate) fn update_telemetry<F>(&self, update: F)
  where
    F: FnOnce(&mut Telemetry),
  {
    update(&mut lock(&self.inner).telemetry);
  }

  fn deliver(&self, event: &Event) {
    let kind = event.kind();
    let handlers = lock(&self.inner)
      .listeners
      .iter()
      .filter(|listener| listener.kind == kind)
      .map(|listener| listener.handler.clone())
      .collect::<Vec<Handler>>();

    for handler in handlers {
      let cause = match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
        Ok(Ok(())) => continue,
        Ok(Err(err)) => err.to_string(),
        Err(_) => "handler panicked".to_string(),
      };
      warn!("{}", SubscriberFault { kind, cause });
      lock(&self.inner).telemetry.subscriber_faults += 1;
    }
  }
}

#[cfg(test)]
mod test {

  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::{Arc, Mutex};

  use failure::format_err;

  use super::{Delivery, Event, EventBus, EventKind, Subscription, Telemetry};
  use crate::time::{ClockTime, Position, Tempo, TicksTime};
  use crate::transport::{Command, CommandEvent, LoopRegion, Origin, TransportSnapshot};

  fn command(command: Command) -> Event {
    Event::Command(CommandEvent {
      command,
      origin: Origin::Local,
    })
  }

  fn position(beat: u32) -> Event {
    Event::Position(TransportSnapshot {
      position: Position::new(0, beat, 0),
      absolute_tick: TicksTime::from_beats(u64::from(beat)),
      tempo: Tempo::default(),
      is_playing: true,
      loop_region: LoopRegion::disabled(),
      timestamp: ClockTime::zero(),
    })
  }

  fn recorder(bus: &EventBus, kind: EventKind, log: &Arc<Mutex<Vec<String>>>) {
    let log = log.clone();
    bus.subscribe(kind, move |event| {
      let entry = match event {
        Event::Command(command) => command.command.to_string(),
        Event::Position(snapshot) => format!("beat {}", snapshot.position.get_beat()),
        Event::Telemetry(telemetry) => format!("telemetry {}", telemetry.ticks_published),
      };
      log.lock().unwrap().push(entry);
      Ok(())
    });
  }

  #[test]
  pub fn handlers_fire_in_subscription_order() {
    let bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    for name in &["first", "second", "third"] {
      let log = log.clone();
      bus.subscribe(EventKind::Command, move |_| {
        log.lock().unwrap().push(name.to_string());
        Ok(())
      });
    }
    bus.publish(command(Command::Play), Delivery::Immediate);
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
  }

  #[test]
  pub fn failing_handler_does_not_block_others() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicUsize::new(0));

    bus.subscribe(EventKind::Command, |_| Err(format_err!("boom")));
    bus.subscribe(EventKind::Command, |_| panic!("kaboom"));
    let counter = calls.clone();
    bus.subscribe(EventKind::Command, move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok(())
    });

    bus.publish(command(Command::Stop), Delivery::Immediate);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(bus.telemetry().subscriber_faults, 2);
  }

  #[test]
  pub fn only_matching_kind_is_delivered() {
    let bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    recorder(&bus, EventKind::Position, &log);
    bus.publish(command(Command::Play), Delivery::Immediate);
    bus.publish(position(1), Delivery::Immediate);
    assert_eq!(*log.lock().unwrap(), vec!["beat 1"]);
  }

  #[test]
  pub fn publish_without_subscribers_is_a_noop() {
    let bus = EventBus::new();
    bus.publish(position(0), Delivery::Batched);
    bus.publish(command(Command::Play), Delivery::Immediate);
    assert_eq!(bus.pending(), 0);
    assert_eq!(bus.flush(), 0);
    assert_eq!(bus.telemetry(), Telemetry::default());
  }

  #[test]
  pub fn batched_events_wait_for_flush() {
    let bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    recorder(&bus, EventKind::Position, &log);

    bus.publish(position(1), Delivery::Batched);
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(bus.flush(), 1);
    assert_eq!(*log.lock().unwrap(), vec!["beat 1"]);
  }

  #[test]
  pub fn flush_orders_commands_before_latest_position() {
    let bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    recorder(&bus, EventKind::Position, &log);
    recorder(&bus, EventKind::Command, &log);
    recorder(&bus, EventKind::Telemetry, &log);

    bus.publish(position(1), Delivery::Batched);
    bus.publish(Event::Telemetry(Telemetry::default()), Delivery::Batched);
    bus.publish(command(Command::Pause), Delivery::Batched);
    bus.publish(position(2), Delivery::Batched);
    bus.publish(command(Command::Play), Delivery::Batched);
    bus.publish(command(Command::Stop), Delivery::Immediate);

    assert_eq!(bus.flush(), 4);
    assert_eq!(
      *log.lock().unwrap(),
      vec!["stop", "pause", "play", "beat 2", "telemetry 0"]
    );
  }

  #[test]
  pub fn subscribe_and_unsubscribe_from_a_handler() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let late_calls = Arc::new(AtomicUsize::new(0));

    let inner_bus = bus.clone();
    let inner_late_calls = late_calls.clone();
    let counter = calls.clone();
    let subscription = Arc::new(Mutex::new(None::<Subscription>));
    let own_subscription = subscription.clone();
    let handle = bus.subscribe(EventKind::Command, move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
      let late_calls = inner_late_calls.clone();
      inner_bus.subscribe(EventKind::Command, move |_| {
        late_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
      });
      if let Some(subscription) = own_subscription.lock().unwrap().take() {
        subscription.unsubscribe();
      }
      Ok(())
    });
    *subscription.lock().unwrap() = Some(handle);

    bus.publish(command(Command::Play), Delivery::Immediate);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);

    bus.publish(command(Command::Play), Delivery::Immediate);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(late_calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  pub fn telemetry_counts() {
    let bus = EventBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    recorder(&bus, EventKind::Position, &log);
    recorder(&bus, EventKind::Command, &log);

    bus.publish(position(0), Delivery::Batched);
    bus.publish(position(1), Delivery::Immediate);
    bus.publish(command(Command::Play), Delivery::Immediate);

    let telemetry = bus.telemetry();
    assert_eq!(telemetry.ticks_published, 2);
    assert_eq!(telemetry.commands_published, 1);
    assert_eq!(telemetry.subscriber_count, 2);

    bus.reset_telemetry();
    assert_eq!(bus.telemetry().ticks_published, 0);
    assert_eq!(bus.telemetry().subscriber_count, 2);
  }

  #[test]
  pub fn unsubscribe_twice() {
    let bus = EventBus::new();
    let subscription = bus.subscribe(EventKind::Position, |_| Ok(()));
    assert_eq!(bus.subscriber_count(), 1);
    assert!(subscription.unsubscribe());
    assert_eq!(bus.subscriber_count(), 0);
    assert_eq!(bus.telemetry().subscriber_count, 0);
  }
}
