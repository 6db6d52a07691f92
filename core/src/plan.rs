use crate::config::Metronome as MetronomeConfig;
use crate::time::{MeterType, TicksTime, TimeLattice, PPQ};

/// What the trigger backend is asked to sound.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
  Click {
    accent: bool,
  },
  Note {
    key: u8,
    velocity: u8,
    duration: TicksTime,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
  Notes,
  Clicks,
}

impl Trigger {
  /// Clicks go through the short lookahead lane.
  pub fn lane(&self) -> Lane {
    match self {
      Trigger::Click { .. } => Lane::Clicks,
      Trigger::Note { .. } => Lane::Notes,
    }
  }
}

/// Source of the events to schedule while playing.
pub trait PlaybackPlan: Send {
  /// Events with a due tick in `[from, to)`, sorted by tick.
  fn events_between(
    &self,
    lattice: &TimeLattice,
    from: TicksTime,
    to: TicksTime,
  ) -> Vec<(TicksTime, Trigger)>;
}

/// A click per counted beat. Downbeats, and group starts of asymmetric meters, are accented.
pub struct MetronomePlan {
  config: MetronomeConfig,
}

impl MetronomePlan {
  pub fn new(config: MetronomeConfig) -> MetronomePlan {
    MetronomePlan { config }
  }

  pub fn set_enabled(&mut self, enabled: bool) {
    self.config.enabled = enabled;
  }

  pub fn is_enabled(&self) -> bool {
    self.config.enabled
  }

  fn ceil_beat(offset: TicksTime) -> u64 {
    let ppq = u64::from(PPQ);
    (offset.get_ticks() + ppq - 1) / ppq
  }
}

impl PlaybackPlan for MetronomePlan {
  fn events_between(
    &self,
    lattice: &TimeLattice,
    from: TicksTime,
    to: TicksTime,
  ) -> Vec<(TicksTime, Trigger)> {
    let mut events = Vec::new();
    if !self.config.enabled || from >= to {
      return events;
    }

    let first = match lattice.measure_at_tick(from) {
      Some(index) => index,
      None => return events,
    };

    for measure in lattice.measures()[first..].iter() {
      if measure.tick_start >= to {
        break;
      }

      let group_starts = match measure.meter.meter_type {
        MeterType::Asymmetric => measure.meter.group_starts(),
        MeterType::Simple | MeterType::Compound => Vec::new(),
      };

      let first_beat = if from > measure.tick_start {
        Self::ceil_beat(from - measure.tick_start)
      } else {
        0
      };

      for beat in first_beat..u64::from(measure.beats()) {
        let tick = measure.tick_start + TicksTime::from_beats(beat);
        if tick >= to {
          break;
        }
        let downbeat = beat == 0 && self.config.accent_downbeat;
        let group_start = self.config.accent_groups && group_starts.contains(&(beat as u32));
        events.push((
          tick,
          Trigger::Click {
            accent: downbeat || group_start,
          },
        ));
      }
    }

    events
  }
}

/// A fixed sequence of notes, already resolved into absolute ticks.
pub struct SequencePlan {
  notes: Vec<(TicksTime, Trigger)>,
}

impl SequencePlan {
  pub fn new(mut notes: Vec<(TicksTime, Trigger)>) -> SequencePlan {
    notes.sort_by_key(|(tick, _)| *tick);
    SequencePlan { notes }
  }

  pub fn len(&self) -> usize {
    self.notes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.notes.is_empty()
  }
}

impl PlaybackPlan for SequencePlan {
  fn events_between(
    &self,
    _lattice: &TimeLattice,
    from: TicksTime,
    to: TicksTime,
  ) -> Vec<(TicksTime, Trigger)> {
    let start = self.notes.partition_point(|(tick, _)| *tick < from);
    self.notes[start..]
      .iter()
      .take_while(|(tick, _)| *tick < to)
      .cloned()
      .collect()
  }
}
