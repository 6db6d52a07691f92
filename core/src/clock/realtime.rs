//! Real-time scheduling for the clock thread.

#[cfg(any(target_os = "macos", target_os = "windows"))]
use audio_thread_priority::{
  demote_current_thread_from_real_time, promote_current_thread_to_real_time, RtPriorityHandle,
};

use crate::config::Clock as ClockConfig;
use crate::error::TimingFault;

/// Holds the calling thread at real-time priority, sized for one device
/// buffer. The previous priority is restored on drop.
pub struct ClockPriority {
  #[cfg(any(target_os = "macos", target_os = "windows"))]
  handle: Option<RtPriorityHandle>,
}

impl ClockPriority {
  #[cfg(any(target_os = "macos", target_os = "windows"))]
  pub fn acquire(config: &ClockConfig) -> Result<ClockPriority, TimingFault> {
    let handle = promote_current_thread_to_real_time(config.frames, config.sample_rate)
      .map_err(|err| TimingFault::PriorityDenied {
        cause: format!("{:?}", err),
      })?;
    Ok(ClockPriority {
      handle: Some(handle),
    })
  }

  // TODO request the priority through rtkit on linux
  #[cfg(not(any(target_os = "macos", target_os = "windows")))]
  pub fn acquire(_config: &ClockConfig) -> Result<ClockPriority, TimingFault> {
    Ok(ClockPriority {})
  }
}

impl Drop for ClockPriority {
  fn drop(&mut self) {
    #[cfg(any(target_os = "macos", target_os = "windows"))]
    {
      if let Some(handle) = self.handle.take() {
        drop(demote_current_thread_from_real_time(handle));
      }
    }
  }
}
