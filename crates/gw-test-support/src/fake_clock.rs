use std::cell::Cell;

use gw_protocol::Clock;

/// An explicitly-advanceable [`Clock`] for deterministic heartbeat and
/// library-timeout tests.
#[derive(Debug, Default)]
pub struct FakeClock {
    now_ms: Cell<u64>,
}

impl FakeClock {
    pub fn new(start_ms: u64) -> Self {
        FakeClock {
            now_ms: Cell::new(start_ms),
        }
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.set(self.now_ms.get() + delta_ms);
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.set(ms);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }
}
