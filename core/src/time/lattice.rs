use std::sync::Arc;

use crate::error::DataError;

use super::{
  meter::{classify_meter, MeterClassification},
  Position, Tempo, TempoChange, TicksTime, TimeSignature, PPQ,
};

// Absorbs floating point noise when going from millis back to ticks.
const TICK_EPSILON: f64 = 1e-6;

/// Score input for a single measure. Without a tempo it inherits the previous one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasureSpec {
  pub signature: TimeSignature,
  pub bpm: Option<Tempo>,
}

impl MeasureSpec {
  pub fn new(signature: TimeSignature) -> MeasureSpec {
    MeasureSpec {
      signature,
      bpm: None,
    }
  }

  pub fn with_tempo(signature: TimeSignature, bpm: Tempo) -> MeasureSpec {
    MeasureSpec {
      signature,
      bpm: Some(bpm),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasureTimingInfo {
  pub measure_index: u32,
  pub signature: TimeSignature,
  pub meter: MeterClassification,
  pub bpm: Tempo,
  pub millis_start: f64,
  pub millis_end: f64,
  pub tick_start: TicksTime,
  pub tick_end: TicksTime,
  pub divider: u32,
}

impl MeasureTimingInfo {
  pub fn beats(&self) -> u32 {
    self.meter.beats_per_measure
  }

  pub fn duration_ticks(&self) -> TicksTime {
    self.tick_end - self.tick_start
  }

  pub fn millis_per_tick(&self) -> f64 {
    self.bpm.millis_per_beat() / f64::from(PPQ)
  }

  fn contains_tick(&self, tick: TicksTime) -> bool {
    self.tick_start <= tick && tick < self.tick_end
  }
}

pub fn build_measure_timing_array(
  measures: &[MeasureSpec],
  default_bpm: Tempo,
) -> Vec<MeasureTimingInfo> {
  let mut timing = Vec::with_capacity(measures.len());
  let mut bpm = default_bpm;
  let mut tick_start = TicksTime::zero();
  let mut millis_start = 0.0;

  for (index, spec) in measures.iter().enumerate() {
    bpm = spec.bpm.unwrap_or(bpm);
    let meter = classify_meter(spec.signature);
    let ticks_per_measure = TicksTime::from_beats(u64::from(meter.beats_per_measure));
    let millis_duration = ticks_per_measure.to_beats() * bpm.millis_per_beat();
    let tick_end = tick_start + ticks_per_measure;
    let millis_end = millis_start + millis_duration;

    timing.push(MeasureTimingInfo {
      measure_index: index as u32,
      signature: spec.signature,
      divider: meter.divider,
      meter,
      bpm,
      millis_start,
      millis_end,
      tick_start,
      tick_end,
    });

    tick_start = tick_end;
    millis_start = millis_end;
  }

  timing
}

/// Meter and tempo aware conversions between positions, absolute ticks and time.
///
/// The measure array is immutable and shared. Anything that changes it, like a
/// tempo change, builds a whole new lattice.
#[derive(Debug, Clone)]
pub struct TimeLattice {
  measures: Arc<[MeasureTimingInfo]>,
}

impl TimeLattice {
  pub fn new(measures: Vec<MeasureTimingInfo>) -> TimeLattice {
    TimeLattice {
      measures: measures.into(),
    }
  }

  pub fn build(measures: &[MeasureSpec], default_bpm: Tempo) -> TimeLattice {
    TimeLattice::new(build_measure_timing_array(measures, default_bpm))
  }

  pub fn empty() -> TimeLattice {
    TimeLattice::new(Vec::new())
  }

  pub fn measures(&self) -> &[MeasureTimingInfo] {
    &self.measures
  }

  pub fn measure(&self, index: u32) -> Option<&MeasureTimingInfo> {
    self.measures.get(index as usize)
  }

  pub fn len(&self) -> usize {
    self.measures.len()
  }

  pub fn is_empty(&self) -> bool {
    self.measures.is_empty()
  }

  pub fn total_ticks(&self) -> TicksTime {
    self
      .measures
      .last()
      .map_or(TicksTime::zero(), |measure| measure.tick_end)
  }

  pub fn total_millis(&self) -> f64 {
    self
      .measures
      .last()
      .map_or(0.0, |measure| measure.millis_end)
  }

  /// The position right after the last measure, where a tick past the score clamps to.
  pub fn end_of_score(&self) -> Position {
    Position::from_measure(self.measures.len() as u32)
  }

  pub fn is_end_of_score(&self, position: Position) -> bool {
    position >= self.end_of_score()
  }

  /// Index of the measure containing the tick, `None` past the score.
  pub fn measure_at_tick(&self, tick: TicksTime) -> Option<usize> {
    let index = self
      .measures
      .partition_point(|measure| measure.tick_end <= tick);
    self
      .measures
      .get(index)
      .filter(|measure| measure.contains_tick(tick))
      .map(|_| index)
  }

  pub fn measure_at_millis(&self, millis: f64) -> Option<usize> {
    let millis = millis.max(0.0);
    let index = self
      .measures
      .partition_point(|measure| measure.millis_end <= millis);
    if index < self.measures.len() {
      Some(index)
    } else {
      None
    }
  }

  pub fn tick_to_position(&self, tick: TicksTime) -> Position {
    if self.measures.is_empty() {
      return Position::default();
    }

    match self.measure_at_tick(tick) {
      Some(index) => {
        let measure = &self.measures[index];
        let offset = (tick - measure.tick_start).get_ticks();
        let ppq = u64::from(PPQ);
        Position::new(
          measure.measure_index,
          (offset / ppq) as u32,
          (offset % ppq) as u32,
        )
      }
      None => self.end_of_score(),
    }
  }

  pub fn position_to_tick(&self, position: Position) -> Result<TicksTime, DataError> {
    if position == self.end_of_score() {
      return Ok(self.total_ticks());
    }

    let measure = self
      .measure(position.get_measure())
      .filter(|measure| position.get_beat() < measure.beats())
      .ok_or_else(|| DataError::OutOfBounds {
        position,
        measures: self.measures.len(),
      })?;

    Ok(
      measure.tick_start
        + TicksTime::from_beats(u64::from(position.get_beat()))
        + TicksTime::new(u64::from(position.get_tick())),
    )
  }

  pub fn tick_to_millis(&self, tick: TicksTime) -> f64 {
    match self.measure_at_tick(tick) {
      Some(index) => {
        let measure = &self.measures[index];
        let offset = (tick - measure.tick_start).get_ticks() as f64;
        measure.millis_start + offset * measure.millis_per_tick()
      }
      None => self.total_millis(),
    }
  }

  pub fn millis_to_tick(&self, millis: f64) -> TicksTime {
    match self.measure_at_millis(millis) {
      Some(index) => {
        let measure = &self.measures[index];
        let offset = (millis.max(0.0) - measure.millis_start) / measure.millis_per_tick();
        let offset = ((offset + TICK_EPSILON).floor().max(0.0) as u64)
          .min(measure.duration_ticks().get_ticks() - 1);
        measure.tick_start + TicksTime::new(offset)
      }
      None => self.total_ticks(),
    }
  }

  pub fn millis_to_position(&self, millis: f64) -> Position {
    self.tick_to_position(self.millis_to_tick(millis))
  }

  pub fn position_to_millis(&self, position: Position) -> Result<f64, DataError> {
    self
      .position_to_tick(position)
      .map(|tick| self.tick_to_millis(tick))
  }

  pub fn subdivision_labels(&self, measure_index: u32) -> Option<Vec<String>> {
    self
      .measure(measure_index)
      .map(|measure| measure.meter.subdivision_labels())
  }

  pub fn tempo_changes(&self) -> Vec<TempoChange> {
    let mut changes: Vec<TempoChange> = Vec::new();
    for measure in self.measures.iter() {
      let changed = changes
        .last()
        .map_or(true, |change| change.bpm != measure.bpm);
      if changed {
        changes.push(TempoChange {
          at_tick: measure.tick_start,
          bpm: measure.bpm,
        });
      }
    }
    changes
  }

  /// A new lattice where every measure from `measure_index` on runs at `bpm`.
  pub fn with_tempo_from(&self, measure_index: u32, bpm: Tempo) -> TimeLattice {
    let specs = self
      .measures
      .iter()
      .map(|measure| {
        let bpm = if measure.measure_index >= measure_index {
          bpm
        } else {
          measure.bpm
        };
        MeasureSpec::with_tempo(measure.signature, bpm)
      })
      .collect::<Vec<MeasureSpec>>();
    TimeLattice::build(&specs, bpm)
  }
}

impl Default for TimeLattice {
  fn default() -> TimeLattice {
    TimeLattice::empty()
  }
}

#[cfg(test)]
mod test {

  use super::{build_measure_timing_array, MeasureSpec, TimeLattice};
  use crate::error::DataError;
  use crate::time::{Position, Tempo, TicksTime, TimeSignature, PPQ};

  fn signature(numerator: i64, denominator: i64) -> TimeSignature {
    TimeSignature::new(numerator, denominator).unwrap()
  }

  fn tempo(bpm: f64) -> Tempo {
    Tempo::new(bpm).unwrap()
  }

  fn mixed_lattice() -> TimeLattice {
    TimeLattice::build(
      &[
        MeasureSpec::new(signature(4, 4)),
        MeasureSpec::new(signature(3, 4)),
        MeasureSpec::with_tempo(signature(6, 8), tempo(90.0)),
        MeasureSpec::new(signature(7, 8)),
        MeasureSpec::with_tempo(signature(5, 4), tempo(150.0)),
      ],
      tempo(120.0),
    )
  }

  #[test]
  pub fn build_timing_array() {
    let timing = build_measure_timing_array(
      &[
        MeasureSpec::new(signature(4, 4)),
        MeasureSpec::with_tempo(signature(6, 8), tempo(60.0)),
        MeasureSpec::new(signature(3, 4)),
      ],
      tempo(120.0),
    );

    assert_eq!(timing.len(), 3);

    assert_eq!(timing[0].tick_start, TicksTime::zero());
    assert_eq!(timing[0].tick_end, TicksTime::new(4 * 960));
    assert_eq!(timing[0].millis_start, 0.0);
    assert_eq!(timing[0].millis_end, 2000.0);
    assert_eq!(timing[0].bpm, tempo(120.0));

    assert_eq!(timing[1].tick_start, TicksTime::new(4 * 960));
    assert_eq!(timing[1].tick_end, TicksTime::new(6 * 960));
    assert_eq!(timing[1].millis_end, 4000.0);
    assert_eq!(timing[1].divider, 2);

    // inherits 60 bpm
    assert_eq!(timing[2].bpm, tempo(60.0));
    assert_eq!(timing[2].millis_end, 7000.0);
    assert_eq!(timing[2].measure_index, 2);
  }

  #[test]
  pub fn tick_position_round_trip() {
    let lattice = mixed_lattice();
    for measure in lattice.measures() {
      for beat in 0..measure.beats() {
        for tick in &[0, 1, 479, 480, PPQ - 1] {
          let position = Position::new(measure.measure_index, beat, *tick);
          let absolute = lattice.position_to_tick(position).unwrap();
          assert_eq!(lattice.tick_to_position(absolute), position);
        }
      }
    }
  }

  #[test]
  pub fn every_tick_round_trips() {
    let lattice = mixed_lattice();
    for tick in (0..lattice.total_ticks().get_ticks()).step_by(37) {
      let tick = TicksTime::new(tick);
      let position = lattice.tick_to_position(tick);
      assert!(position.get_tick() < PPQ);
      assert_eq!(lattice.position_to_tick(position).unwrap(), tick);
    }
  }

  #[test]
  pub fn tick_to_position_decomposes_beats() {
    let lattice = mixed_lattice();
    let position = lattice.tick_to_position(TicksTime::new(4 * 960 + 2 * 960 + 15));
    assert_eq!(position, Position::new(1, 2, 15));
  }

  #[test]
  pub fn empty_lattice_returns_default_position() {
    let lattice = TimeLattice::empty();
    assert_eq!(lattice.tick_to_position(TicksTime::new(5000)), Position::default());
    assert_eq!(lattice.millis_to_position(100.0), Position::default());
  }

  #[test]
  pub fn past_the_end_clamps_to_sentinel() {
    let lattice = mixed_lattice();
    let end = lattice.tick_to_position(TicksTime::new(1_000_000));
    assert_eq!(end, Position::from_measure(5));
    assert!(lattice.is_end_of_score(end));
    assert_eq!(lattice.position_to_tick(end).unwrap(), lattice.total_ticks());
  }

  #[test]
  pub fn position_out_of_bounds() {
    let lattice = mixed_lattice();
    match lattice.position_to_tick(Position::new(1, 3, 0)) {
      Err(DataError::OutOfBounds { measures, .. }) => assert_eq!(measures, 5),
      other => panic!("unexpected {:?}", other),
    }
    assert!(lattice.position_to_tick(Position::new(9, 0, 0)).is_err());
    assert!(lattice.position_to_tick(Position::new(5, 0, 1)).is_err());
  }

  #[test]
  pub fn millis_conversions() {
    let lattice = mixed_lattice();
    // 4/4 + 3/4 at 120 bpm = 3500ms, then 6/8 (two beats) at 90 bpm
    assert_eq!(
      lattice.position_to_millis(Position::from_measure(2)).unwrap(),
      3500.0
    );
    let position = lattice.millis_to_position(3500.0 + 1000.0);
    assert_eq!(position, Position::new(2, 1, 480));
    assert_eq!(lattice.millis_to_position(250.0), Position::new(0, 0, 480));
    assert_eq!(lattice.millis_to_position(1.0e9), lattice.end_of_score());
  }

  #[test]
  pub fn millis_tick_round_trip() {
    let lattice = mixed_lattice();
    for tick in (0..lattice.total_ticks().get_ticks()).step_by(101) {
      let tick = TicksTime::new(tick);
      assert_eq!(lattice.millis_to_tick(lattice.tick_to_millis(tick)), tick);
    }
  }

  #[test]
  pub fn subdivision_labels() {
    let lattice = TimeLattice::build(&[MeasureSpec::new(signature(6, 8))], tempo(120.0));
    assert_eq!(
      lattice.subdivision_labels(0).unwrap(),
      vec!["1", "&", "a", "2", "&", "a"]
    );
    assert_eq!(lattice.subdivision_labels(1), None);
  }

  #[test]
  pub fn tempo_changes() {
    let changes = mixed_lattice().tempo_changes();
    let bpms = changes
      .iter()
      .map(|change| change.bpm.get_value())
      .collect::<Vec<f64>>();
    assert_eq!(bpms, vec![120.0, 90.0, 150.0]);
    assert_eq!(changes[1].at_tick, TicksTime::new(7 * 960));
  }

  #[test]
  pub fn with_tempo_from_rebuilds() {
    let lattice = mixed_lattice();
    let faster = lattice.with_tempo_from(1, tempo(240.0));
    assert_eq!(faster.measure(0).unwrap().bpm, tempo(120.0));
    assert!(faster
      .measures()
      .iter()
      .skip(1)
      .all(|measure| measure.bpm == tempo(240.0)));
    assert_eq!(faster.total_ticks(), lattice.total_ticks());
    assert_eq!(faster.measure(1).unwrap().millis_end, 2000.0 + 750.0);
    // the original is untouched
    assert_eq!(lattice.measure(1).unwrap().bpm, tempo(120.0));
  }
}
