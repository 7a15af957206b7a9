use std::fmt::Debug;
use std::time::Instant;

/// Source of the current time
///
/// Only used to age out matched parts, so tests can swap in a manual clock
/// and step it forward explicitly.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
