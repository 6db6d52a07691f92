use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};

use failure::Error;
use log::{debug, warn};

use crate::error::SchedulingOverrun;
use crate::time::{ClockTime, TicksTime, TimeLattice};
use crate::transport::WarmUpTicket;

// Lateness below this is rounding noise between ticks and millis.
const OVERRUN_TOLERANCE_MS: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
  pub fn get_value(&self) -> u64 {
    self.0
  }
}

/// Receives the events as they leave the lookahead window.
pub trait TriggerBackend<P> {
  /// Events due while the backend is not ready are dropped.
  fn is_ready(&self) -> bool;

  /// `due` is the exact clock time the payload has to sound at.
  fn trigger(&mut self, due: ClockTime, payload: &P) -> Result<(), Error>;

  /// Unlocks the output device. Completes right away unless overridden.
  fn warm_up(&mut self, ticket: WarmUpTicket) {
    ticket.complete();
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent<P> {
  pub id: EventId,
  pub due: TicksTime,
  pub payload: P,
}

struct Entry<P>(ScheduledEvent<P>);

impl<P> PartialEq for Entry<P> {
  fn eq(&self, other: &Self) -> bool {
    self.0.due == other.0.due && self.0.id == other.0.id
  }
}

impl<P> Eq for Entry<P> {}

impl<P> PartialOrd for Entry<P> {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl<P> Ord for Entry<P> {
  fn cmp(&self, other: &Self) -> Ordering {
    (self.0.due, self.0.id).cmp(&(other.0.due, other.0.id))
  }
}

/// Where the transport is when the scheduler advances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
  pub now: ClockTime,
  pub tick: TicksTime,
}

impl Cursor {
  pub fn new(now: ClockTime, tick: TicksTime) -> Cursor {
    Cursor { now, tick }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SchedulerStats {
  pub fired: u64,
  pub dropped: u64,
  pub overruns: u64,
  pub jitter_max_ms: f64,
}

/// Queue of future triggers, fired once their due time enters the lookahead window.
pub struct LookaheadScheduler<P> {
  name: &'static str,
  lookahead_ms: f64,
  queue: BinaryHeap<Reverse<Entry<P>>>,
  next_id: u64,
  stats: SchedulerStats,
}

impl<P> LookaheadScheduler<P> {
  pub fn new(name: &'static str, lookahead_ms: f64) -> LookaheadScheduler<P> {
    LookaheadScheduler {
      name,
      lookahead_ms: lookahead_ms.max(0.0),
      queue: BinaryHeap::new(),
      next_id: 0,
      stats: SchedulerStats::default(),
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn lookahead_ms(&self) -> f64 {
    self.lookahead_ms
  }

  pub fn len(&self) -> usize {
    self.queue.len()
  }

  pub fn is_empty(&self) -> bool {
    self.queue.is_empty()
  }

  pub fn stats(&self) -> SchedulerStats {
    self.stats
  }

  pub fn reset_stats(&mut self) {
    self.stats = SchedulerStats::default();
  }

  pub fn schedule(&mut self, due: TicksTime, payload: P) -> EventId {
    let id = EventId(self.next_id);
    self.next_id += 1;
    self.queue.push(Reverse(Entry(ScheduledEvent { id, due, payload })));
    id
  }

  pub fn cancel(&mut self, id: EventId) -> bool {
    let before = self.queue.len();
    self.queue.retain(|Reverse(entry)| entry.0.id != id);
    self.queue.len() != before
  }

  /// Empties the queue and resets the jitter measurement.
  pub fn flush(&mut self) {
    if !self.queue.is_empty() {
      debug!("Flushing {} {} events", self.queue.len(), self.name);
    }
    self.queue.clear();
    self.stats.jitter_max_ms = 0.0;
  }

  pub fn next_due(&self) -> Option<TicksTime> {
    self.queue.peek().map(|Reverse(entry)| entry.0.due)
  }

  /// Fires every event due before `cursor + lookahead`. Returns how many were triggered.
  pub fn advance<B>(&mut self, cursor: Cursor, lattice: &TimeLattice, backend: &mut B) -> usize
  where
    B: TriggerBackend<P> + ?Sized,
  {
    let now_millis = lattice.tick_to_millis(cursor.tick);
    let window_end = now_millis + self.lookahead_ms;
    let mut triggered = 0;

    loop {
      let due_millis = match self.queue.peek() {
        Some(Reverse(entry)) => lattice.tick_to_millis(entry.0.due),
        None => break,
      };
      if due_millis > window_end {
        break;
      }

      let event = match self.queue.pop() {
        Some(Reverse(entry)) => entry.0,
        None => break,
      };

      if !backend.is_ready() {
        self.stats.dropped += 1;
        continue;
      }

      let offset_millis = due_millis - now_millis;
      if offset_millis < -OVERRUN_TOLERANCE_MS {
        let overrun = SchedulingOverrun {
          id: event.id.get_value(),
          late_ms: -offset_millis,
        };
        debug!("{} {}", self.name, overrun);
        self.stats.overruns += 1;
        self.stats.jitter_max_ms = self.stats.jitter_max_ms.max(overrun.late_ms);
      }

      let due = cursor.now.offset_millis(offset_millis.max(0.0));
      let result = panic::catch_unwind(AssertUnwindSafe(|| backend.trigger(due, &event.payload)));
      match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("Trigger for {} event {} failed: {}", self.name, event.id.get_value(), err),
        Err(_) => warn!("Trigger for {} event {} panicked", self.name, event.id.get_value()),
      }
      self.stats.fired += 1;
      triggered += 1;
    }

    triggered
  }
}
