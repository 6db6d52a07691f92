use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::time::Tempo;

/// Creates a single-writer/single-reader tempo parameter slot.
///
/// Neither end is `Clone`, so there is exactly one writer (the transport) and
/// one reader (the clock thread). Reading never blocks nor allocates.
pub fn tempo_slot(initial: Tempo) -> (TempoWriter, TempoReader) {
  let slot = Arc::new(AtomicU64::new(f64::from(initial).to_bits()));
  (TempoWriter(slot.clone()), TempoReader(slot))
}

pub struct TempoWriter(Arc<AtomicU64>);

impl TempoWriter {
  pub fn write(&self, tempo: Tempo) {
    self.0.store(f64::from(tempo).to_bits(), Ordering::Release);
  }
}

pub struct TempoReader(Arc<AtomicU64>);

impl TempoReader {
  pub fn read(&self) -> f64 {
    f64::from_bits(self.0.load(Ordering::Acquire))
  }
}

#[cfg(test)]
mod test {

  use super::tempo_slot;
  use crate::time::Tempo;

  #[test]
  pub fn write_then_read() {
    let (writer, reader) = tempo_slot(Tempo::default());
    assert_eq!(reader.read(), 120.0);
    writer.write(Tempo::clamped(97.5));
    assert_eq!(reader.read(), 97.5);
  }

  #[test]
  pub fn read_from_another_thread() {
    let (writer, reader) = tempo_slot(Tempo::default());
    writer.write(Tempo::clamped(180.0));
    let value = std::thread::spawn(move || reader.read()).join().unwrap();
    assert_eq!(value, 180.0);
  }
}
