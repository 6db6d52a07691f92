use super::TimeSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterType {
  Simple,
  Compound,
  Asymmetric,
}

/// How a time signature is felt: counted beats, their subdivision and grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterClassification {
  pub meter_type: MeterType,
  pub beats_per_measure: u32,
  pub subdivisions_per_beat: u32,
  pub beat_grouping: Vec<u32>,
  pub divider: u32,
}

impl MeterClassification {
  /// Beats (in measure) where a group starts. Every beat for simple and compound meters.
  pub fn group_starts(&self) -> Vec<u32> {
    match self.meter_type {
      MeterType::Asymmetric => self
        .beat_grouping
        .iter()
        .scan(0, |start, size| {
          let group_start = *start;
          *start += size;
          Some(group_start)
        })
        .collect(),
      MeterType::Simple | MeterType::Compound => (0..self.beats_per_measure).collect(),
    }
  }

  pub fn subdivision_labels(&self) -> Vec<String> {
    match self.meter_type {
      MeterType::Simple => Self::cycle_labels(self.beats_per_measure, &["i", "&", "a"]),
      MeterType::Compound => Self::cycle_labels(self.beats_per_measure, &["&", "a"]),
      MeterType::Asymmetric => {
        let mut labels = Vec::new();
        for (group, size) in self.beat_grouping.iter().enumerate() {
          labels.push((group + 1).to_string());
          labels.extend(
            ["&", "a"]
              .iter()
              .cycle()
              .take(*size as usize - 1)
              .map(|label| label.to_string()),
          );
        }
        labels
      }
    }
  }

  fn cycle_labels(beats: u32, fillers: &[&str]) -> Vec<String> {
    let mut labels = Vec::with_capacity(beats as usize * (fillers.len() + 1));
    for beat in 1..=beats {
      labels.push(beat.to_string());
      labels.extend(fillers.iter().map(|label| label.to_string()));
    }
    labels
  }
}

pub fn classify_meter(signature: TimeSignature) -> MeterClassification {
  let numerator = signature.get_numerator();
  let denominator = signature.get_denominator();

  if denominator == 8 && numerator % 3 == 0 && numerator >= 6 {
    let beats = numerator / 3;
    MeterClassification {
      meter_type: MeterType::Compound,
      beats_per_measure: beats,
      subdivisions_per_beat: 3,
      beat_grouping: vec![3; beats as usize],
      divider: 2,
    }
  } else if numerator > 4 && numerator % 2 == 1 {
    MeterClassification {
      meter_type: MeterType::Asymmetric,
      beats_per_measure: numerator,
      subdivisions_per_beat: 1,
      beat_grouping: asymmetric_grouping(numerator),
      divider: if denominator == 8 { 2 } else { 1 },
    }
  } else {
    MeterClassification {
      meter_type: MeterType::Simple,
      beats_per_measure: numerator,
      subdivisions_per_beat: 2,
      beat_grouping: vec![1; numerator as usize],
      divider: 1,
    }
  }
}

fn asymmetric_grouping(numerator: u32) -> Vec<u32> {
  match numerator {
    5 => vec![3, 2],
    7 => vec![2, 2, 3],
    11 => vec![3, 3, 3, 2],
    13 => vec![3, 3, 3, 2, 2],
    _ => {
      let mut grouping = Vec::new();
      let mut remaining = numerator;
      while remaining > 4 || remaining == 3 {
        grouping.push(3);
        remaining -= 3;
      }
      match remaining {
        4 => grouping.extend_from_slice(&[2, 2]),
        0 => {}
        rest => grouping.push(rest),
      }
      grouping
    }
  }
}
