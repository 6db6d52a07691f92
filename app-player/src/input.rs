//! Commands typed on the player console.

use failure::Fail;

use tactus_core::error::DataError;
use tactus_core::time::Position;
use tactus_core::transport::{Command, LoopRegion};

#[derive(Debug, Fail, PartialEq)]
pub enum InputError {
  #[fail(display = "Unknown command: {}", word)]
  Unknown { word: String },

  #[fail(display = "Missing {} for {}", what, command)]
  Missing {
    command: &'static str,
    what: &'static str,
  },

  #[fail(display = "Invalid tempo: {}", text)]
  InvalidTempo { text: String },

  #[fail(display = "{}", cause)]
  Position { cause: DataError },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
  Transport(Command),
  Stats,
  Quit,
  Empty,
}

fn position<'a, I>(
  words: &mut I,
  command: &'static str,
  what: &'static str,
) -> Result<Position, InputError>
where
  I: Iterator<Item = &'a str>,
{
  words
    .next()
    .ok_or(InputError::Missing { command, what })?
    .parse::<Position>()
    .map_err(|cause| InputError::Position { cause })
}

pub fn parse_line(line: &str) -> Result<Input, InputError> {
  let mut words = line.split_whitespace();
  let word = match words.next() {
    Some(word) => word.to_lowercase(),
    None => return Ok(Input::Empty),
  };

  let input = match word.as_str() {
    "play" => Input::Transport(Command::Play),
    "pause" => Input::Transport(Command::Pause),
    "stop" => Input::Transport(Command::Stop),
    "seek" => Input::Transport(Command::Seek(position(&mut words, "seek", "position")?)),
    "tempo" => {
      let text = words.next().ok_or(InputError::Missing {
        command: "tempo",
        what: "bpm",
      })?;
      let bpm = text.parse::<f64>().map_err(|_| InputError::InvalidTempo {
        text: text.to_string(),
      })?;
      let immediate = words.next() == Some("now");
      Input::Transport(Command::SetTempo { bpm, immediate })
    }
    "loop" => {
      let start = position(&mut words, "loop", "start")?;
      let end = position(&mut words, "loop", "end")?;
      Input::Transport(Command::SetLoop(LoopRegion::new(start, end)))
    }
    "noloop" => Input::Transport(Command::ClearLoop),
    "stats" => Input::Stats,
    "quit" | "exit" => Input::Quit,
    _ => return Err(InputError::Unknown { word }),
  };

  Ok(input)
}

#[cfg(test)]
mod test {

  use super::{parse_line, Input, InputError};
  use tactus_core::time::Position;
  use tactus_core::transport::{Command, LoopRegion};

  #[test]
  pub fn transport_commands() {
    assert_eq!(parse_line("play").unwrap(), Input::Transport(Command::Play));
    assert_eq!(parse_line("  PAUSE ").unwrap(), Input::Transport(Command::Pause));
    assert_eq!(
      parse_line("seek 3:2").unwrap(),
      Input::Transport(Command::Seek(Position::new(2, 1, 0)))
    );
    assert_eq!(
      parse_line("tempo 96 now").unwrap(),
      Input::Transport(Command::SetTempo {
        bpm: 96.0,
        immediate: true
      })
    );
    assert_eq!(
      parse_line("loop 1 3").unwrap(),
      Input::Transport(Command::SetLoop(LoopRegion::new(
        Position::new(0, 0, 0),
        Position::new(2, 0, 0)
      )))
    );
    assert_eq!(parse_line("noloop").unwrap(), Input::Transport(Command::ClearLoop));
  }

  #[test]
  pub fn console_commands() {
    assert_eq!(parse_line("").unwrap(), Input::Empty);
    assert_eq!(parse_line("stats").unwrap(), Input::Stats);
    assert_eq!(parse_line("quit").unwrap(), Input::Quit);
  }

  #[test]
  pub fn invalid_input() {
    assert_eq!(
      parse_line("rewind"),
      Err(InputError::Unknown {
        word: "rewind".to_string()
      })
    );
    assert_eq!(
      parse_line("tempo"),
      Err(InputError::Missing {
        command: "tempo",
        what: "bpm"
      })
    );
    assert_eq!(
      parse_line("tempo fast"),
      Err(InputError::InvalidTempo {
        text: "fast".to_string()
      })
    );
    assert!(parse_line("seek 0:1").is_err());
    assert!(parse_line("loop 1").is_err());
  }
}
