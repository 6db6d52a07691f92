//! Score descriptions in TOML.
//!
//! ```toml
//! default_bpm = 120
//!
//! [[measures]]
//! signature = "4/4"
//! repeat = 2
//!
//! [[measures]]
//! signature = "7/8"
//! bpm = 140
//!
//! [[notes]]
//! at = "1:1"
//! key = 60
//! ```

use std::fs::File;
use std::io::Read;

use failure::Error;
use serde_derive::Deserialize;

use crate::error::DataError;
use crate::plan::{SequencePlan, Trigger};
use crate::time::{MeasureSpec, Position, Tempo, TicksTime, TimeLattice, TimeSignature, PPQ};

fn default_repeat() -> u32 {
  1
}

fn default_velocity() -> u8 {
  100
}

fn default_beats() -> f64 {
  1.0
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MeasureDefinition {
  pub signature: TimeSignature,
  pub bpm: Option<f64>,
  #[serde(default = "default_repeat")]
  pub repeat: u32,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct NoteDefinition {
  /// One based `measure:beat:tick`
  pub at: String,
  pub key: u8,
  #[serde(default = "default_velocity")]
  pub velocity: u8,
  #[serde(default = "default_beats")]
  pub beats: f64,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ScoreDefinition {
  pub default_bpm: Option<f64>,
  pub measures: Vec<MeasureDefinition>,
  pub notes: Vec<NoteDefinition>,
}

impl ScoreDefinition {
  pub fn from_file<'a, T>(path: T) -> Result<ScoreDefinition, Error>
  where
    T: Into<&'a str>,
  {
    let mut content = String::new();
    let path_str = path.into();
    let mut file = File::open(path_str)?;
    file.read_to_string(&mut content)?;
    let score: ScoreDefinition = toml::from_str(&content)?;
    Ok(score)
  }

  pub fn from_str<'a, T>(content: T) -> Result<ScoreDefinition, Error>
  where
    T: Into<&'a str>,
  {
    let score: ScoreDefinition = toml::from_str(content.into())?;
    Ok(score)
  }

  /// Expands repeated measures.
  pub fn measure_specs(&self) -> Result<Vec<MeasureSpec>, DataError> {
    let mut specs = Vec::new();
    for measure in self.measures.iter() {
      if measure.repeat == 0 {
        return Err(DataError::MalformedScore {
          cause: format!("measure {} is repeated zero times", measure.signature),
        });
      }
      let spec = match measure.bpm {
        Some(bpm) => MeasureSpec::with_tempo(measure.signature, Tempo::new(bpm)?),
        None => MeasureSpec::new(measure.signature),
      };
      specs.extend(std::iter::repeat(spec).take(measure.repeat as usize));
    }
    Ok(specs)
  }

  pub fn build_lattice(&self, default_bpm: Tempo) -> Result<TimeLattice, DataError> {
    let default_bpm = match self.default_bpm {
      Some(bpm) => Tempo::new(bpm)?,
      None => default_bpm,
    };
    Ok(TimeLattice::build(&self.measure_specs()?, default_bpm))
  }

  /// Resolves the notes against the lattice they will be played with.
  pub fn notes_plan(&self, lattice: &TimeLattice) -> Result<SequencePlan, DataError> {
    let mut notes = Vec::with_capacity(self.notes.len());
    for note in self.notes.iter() {
      let position = note.at.parse::<Position>()?;
      let tick = lattice.position_to_tick(position)?;
      if !note.beats.is_finite() || note.beats <= 0.0 {
        return Err(DataError::MalformedScore {
          cause: format!("note at {} has a length of {} beats", note.at, note.beats),
        });
      }
      let duration = TicksTime::new((note.beats * f64::from(PPQ)).round() as u64);
      notes.push((
        tick,
        Trigger::Note {
          key: note.key,
          velocity: note.velocity,
          duration,
        },
      ));
    }
    Ok(SequencePlan::new(notes))
  }
}
