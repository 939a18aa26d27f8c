//! Wall-clock seam.
//!
//! Components never call `SystemTime::now()` directly; they are handed a
//! `Clock` so tests can pin time with a nullable implementation.

use crate::Timestamp;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The real system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
