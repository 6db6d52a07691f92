pub mod clock;
pub mod drift_correction;
pub mod lattice;
pub mod meter;
pub mod position;
pub mod signature;
pub mod tempo;
pub mod ticks;

pub use self::clock::ClockTime;
pub use self::lattice::{build_measure_timing_array, MeasureSpec, MeasureTimingInfo, TimeLattice};
pub use self::meter::{classify_meter, MeterClassification, MeterType};
pub use self::position::Position;
pub use self::signature::TimeSignature;
pub use self::tempo::{Tempo, TempoChange};
pub use self::ticks::{TicksTime, PPQ};

pub type SampleRate = u32;
