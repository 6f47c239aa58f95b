//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::warn;

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

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

/// Default tick rate configuration
pub const DEFAULT_SIMULATION_TPS: u32 = 60;
pub const DEFAULT_SNAPSHOT_TPS: u32 = 20;

/// Highest accepted tick rate; one step per millisecond
pub const MAX_TPS: u32 = 1000;

/// Shortest step the accumulator will run
const MIN_STEP: Duration = Duration::from_millis(1);

/// Upper bound on catch-up steps per wall-clock callback
pub const MAX_CATCH_UP_STEPS: u32 = 5;

/// Fixed step length for a tick rate, clamped to `1..=MAX_TPS`
pub fn step_duration(tps: u32) -> Duration {
    Duration::from_micros(1_000_000 / tps.clamp(1, MAX_TPS) as u64)
}

/// Fixed-timestep accumulator.
///
/// Wall-clock time is pushed in with [`FixedTimestep::accumulate`]; each call
/// to [`FixedTimestep::next_step`] that returns `true` consumes exactly one
/// step. Any number of steps (including zero) may be produced per frame.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    step: Duration,
    accumulator: Duration,
    max_steps: u32,
}

impl FixedTimestep {
    pub fn new(step: Duration) -> Self {
        Self {
            step: step.max(MIN_STEP),
            accumulator: Duration::ZERO,
            max_steps: MAX_CATCH_UP_STEPS,
        }
    }

    pub fn from_tps(tps: u32) -> Self {
        Self::new(step_duration(tps))
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Step length in whole milliseconds (never zero)
    pub fn step_ms(&self) -> u64 {
        (self.step.as_millis() as u64).max(1)
    }

    pub fn accumulated(&self) -> Duration {
        self.accumulator
    }

    /// Add elapsed wall-clock time, dropping anything beyond the catch-up cap
    pub fn accumulate(&mut self, elapsed: Duration) {
        self.accumulator += elapsed;
        let cap = self.step * self.max_steps;
        if self.accumulator > cap {
            warn!(
                dropped_ms = (self.accumulator - cap).as_millis() as u64,
                "Simulation falling behind, dropping accumulated time"
            );
            self.accumulator = cap;
        }
    }

    /// Consume one step if enough time has accumulated
    pub fn next_step(&mut self) -> bool {
        if self.accumulator >= self.step {
            self.accumulator -= self.step;
            true
        } else {
            false
        }
    }
}

/// A simple timer for measuring durations
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Time since the last reset, resetting the timer
    pub fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now - self.start;
        self.start = now;
        elapsed
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
