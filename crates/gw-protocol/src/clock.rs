//! Injectable monotonic millisecond clock (§2.1).

/// A monotonic millisecond time source. Production code drives the Framer
/// with a system clock; tests advance a fake one explicitly so heartbeat and
/// library-timeout bookkeeping is deterministic. No `Send` bound: the
/// Framer owns its collaborators on a single dedicated thread (§5).
pub trait Clock {
    /// Milliseconds since an arbitrary, monotonic epoch. Must never go
    /// backwards between calls.
    fn now_ms(&self) -> u64;
}

/// [`Clock`] backed by [`std::time::Instant`].
#[derive(Debug, Default)]
pub struct SystemClock {
    start: std::sync::OnceLock<std::time::Instant>,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            start: std::sync::OnceLock::new(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let start = self.start.get_or_init(std::time::Instant::now);
        start.elapsed().as_millis() as u64
    }
}
