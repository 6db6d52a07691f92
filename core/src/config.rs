use failure::Error;

use serde_derive::Deserialize;

use std::fs::File;
use std::io::Read;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Clock {
  pub sample_rate: u32,
  pub frames: u32,
  pub realtime_priority: bool,
  /// Capacity of the channel carrying clock samples to the transport.
  pub channel_capacity: usize,
  pub init_timeout_ms: u64,
}

impl Default for Clock {
  fn default() -> Clock {
    Clock {
      sample_rate: 44100,
      frames: 512,
      realtime_priority: true,
      channel_capacity: 64,
      init_timeout_ms: 1000,
    }
  }
}

impl Clock {
  pub fn init_timeout(&self) -> Duration {
    Duration::from_millis(self.init_timeout_ms)
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Transport {
  /// Consecutive frames without hardware progress before switching to software advance.
  pub stall_threshold_frames: u32,
  pub default_bpm: f64,
}

impl Default for Transport {
  fn default() -> Transport {
    Transport {
      stall_threshold_frames: 20,
      default_bpm: 120.0,
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Scheduler {
  pub lookahead_ms: f64,
  pub click_lookahead_ms: f64,
}

impl Default for Scheduler {
  fn default() -> Scheduler {
    Scheduler {
      lookahead_ms: 100.0,
      click_lookahead_ms: 25.0,
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Metronome {
  pub enabled: bool,
  pub accent_downbeat: bool,
  pub accent_groups: bool,
}

impl Default for Metronome {
  fn default() -> Metronome {
    Metronome {
      enabled: true,
      accent_downbeat: true,
      accent_groups: true,
    }
  }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
  pub clock: Clock,
  pub transport: Transport,
  pub scheduler: Scheduler,
  pub metronome: Metronome,
}

impl Config {
  pub fn from_file<'a, T>(path: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let mut content = String::new();
    let path_str = path.into();
    let mut file = File::open(path_str)?;
    file.read_to_string(&mut content)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
  }

  pub fn from_str<'a, T>(content: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let config: Config = toml::from_str(content.into())?;
    Ok(config)
  }
}
