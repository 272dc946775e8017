//! Time utilities for the fixed-step simulation

use std::time::{Duration, Instant};

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate shared by the server simulator and client prediction
pub const SIMULATION_TPS: u32 = 60;
/// Length of one fixed step in milliseconds (1000 / 60)
pub const FIXED_TIMESTEP_MS: f64 = 1000.0 / SIMULATION_TPS as f64;

/// Accumulator that turns variable wall-clock deltas into discrete fixed steps.
///
/// Feed it whatever the host loop measured with [`FixedTimestep::accumulate`],
/// then call [`FixedTimestep::consume_step`] until it returns `false`; each
/// `true` is exactly one tick. Leftover time carries over to the next frame,
/// so the tick rate does not depend on how often the host calls back.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    step_ms: f64,
    accumulator_ms: f64,
}

impl FixedTimestep {
    pub fn new(step_ms: f64) -> Self {
        Self {
            step_ms,
            accumulator_ms: 0.0,
        }
    }

    pub fn accumulate(&mut self, elapsed: Duration) {
        self.accumulator_ms += elapsed.as_secs_f64() * 1000.0;
    }

    #[cfg(test)]
    fn accumulate_ms(&mut self, elapsed_ms: f64) {
        self.accumulator_ms += elapsed_ms.max(0.0);
    }

    /// Take one step out of the accumulator if a full step is available
    pub fn consume_step(&mut self) -> bool {
        if self.accumulator_ms >= self.step_ms {
            self.accumulator_ms -= self.step_ms;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn step_ms(&self) -> f64 {
        self.step_ms
    }

    #[cfg(test)]
    fn pending_ms(&self) -> f64 {
        self.accumulator_ms
    }
}

impl Default for FixedTimestep {
    fn default() -> Self {
        Self::new(FIXED_TIMESTEP_MS)
    }
}
