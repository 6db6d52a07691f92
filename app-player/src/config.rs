use failure::Error;

use serde_derive::Deserialize;

use std::fs::File;
use std::io::Read;
use std::time::Duration;

use tactus_core::config::Config as CoreConfig;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Player {
  /// Period of the transport loop.
  pub frame_ms: u64,
  pub score: Option<String>,
  /// Seconds between telemetry reports, none when zero.
  pub report_secs: u64,
}

impl Default for Player {
  fn default() -> Player {
    Player {
      frame_ms: 5,
      score: None,
      report_secs: 0,
    }
  }
}

impl Player {
  pub fn frame(&self) -> Duration {
    Duration::from_millis(self.frame_ms.max(1))
  }

  pub fn report_period(&self) -> Option<Duration> {
    if self.report_secs == 0 {
      None
    } else {
      Some(Duration::from_secs(self.report_secs))
    }
  }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
  #[serde(flatten)]
  pub core: CoreConfig,
  pub player: Player,
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

  #[allow(dead_code)]
  pub fn from_str<'a, T>(content: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let config: Config = toml::from_str(content.into())?;
    Ok(config)
  }
}

#[cfg(test)]
mod test {

  use super::Config;

  #[test]
  pub fn player_and_core_sections() {
    let config = Config::from_str(
      r#"
      [player]
      frame_ms = 2
      score = "scores/demo.toml"

      [transport]
      default_bpm = 96.0
      "#,
    )
    .unwrap();

    assert_eq!(config.player.frame_ms, 2);
    assert_eq!(config.player.score.as_deref(), Some("scores/demo.toml"));
    assert!(config.player.report_period().is_none());
    assert_eq!(config.core.transport.default_bpm, 96.0);
    assert_eq!(config.core.scheduler.lookahead_ms, 100.0);
  }
}
