//! Frame-budget cooperative yielding.
//!
//! An embedding host that multiplexes the engine with interactive work gets
//! the driving task back once per frame; on a plain multi-threaded runtime
//! the yield is effectively free.

use std::time::{Duration, Instant};

/// Default frame budget: one sixtieth of a second.
const FRAME_BUDGET: Duration = Duration::from_micros(16_667);

#[derive(Debug)]
pub struct FramePacer {
    budget: Duration,
    last_yield: Instant,
}

impl FramePacer {
    pub fn new() -> FramePacer {
        FramePacer::with_budget(FRAME_BUDGET)
    }

    pub fn with_budget(budget: Duration) -> FramePacer {
        FramePacer {
            budget,
            last_yield: Instant::now(),
        }
    }

    /// Yield to the runtime if the current frame budget is spent.
    pub async fn yield_if_due(&mut self) {
        if self.last_yield.elapsed() >= self.budget {
            tokio::task::yield_now().await;
            self.last_yield = Instant::now();
        }
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        FramePacer::new()
    }
}
