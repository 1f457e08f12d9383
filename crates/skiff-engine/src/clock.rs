//! Fixed-timestep accumulator.
//!
//! Frame times vary; physics steps do not. [`SimulationClock::advance`] adds
//! the elapsed wall time to an accumulator and runs the step callback once per
//! whole `physics_dt` it holds. The remainder carries over to the next frame.
//!
//! ```
//! use skiff_engine::clock::SimulationClock;
//!
//! let mut clock = SimulationClock::new(120).unwrap();
//! let mut steps = Vec::new();
//! let ran = clock
//!     .advance(0.02, |dt| {
//!         steps.push(dt);
//!         Ok::<_, std::convert::Infallible>(())
//!     })
//!     .unwrap();
//! assert_eq!(ran, 2);
//! assert!(steps.iter().all(|&dt| dt == 1.0 / 120.0));
//! ```

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// ClockDiagnostics
// ---------------------------------------------------------------------------

/// What the last [`SimulationClock::advance`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClockDiagnostics {
    /// Steps run by the last advance.
    pub steps: u32,
    /// Backlog discarded because the step clamp was hit, in seconds.
    pub dropped_time: f64,
}

// ---------------------------------------------------------------------------
// SimulationClock
// ---------------------------------------------------------------------------

/// Fixed-timestep clock.
///
/// Simulation time is `step_count * physics_dt`, computed rather than
/// accumulated so it does not drift.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    physics_dt: f64,
    unapplied_time: f64,
    step_counter: u64,
    max_steps_per_advance: Option<u32>,
    last: ClockDiagnostics,
}

impl SimulationClock {
    /// Clock running `rate` steps per simulated second.
    pub fn new(rate: u32) -> Result<Self, ConfigError> {
        if rate == 0 {
            return Err(ConfigError::InvalidRate {
                field: "physics_rate",
                value: rate,
            });
        }
        Ok(Self {
            physics_dt: 1.0 / rate as f64,
            unapplied_time: 0.0,
            step_counter: 0,
            max_steps_per_advance: None,
            last: ClockDiagnostics::default(),
        })
    }

    /// Cap the number of steps one advance may run. Backlog beyond the cap
    /// is dropped.
    pub fn with_max_steps(mut self, max_steps: Option<u32>) -> Self {
        self.max_steps_per_advance = max_steps.filter(|&n| n > 0);
        self
    }

    /// Add `elapsed` seconds and run `step(physics_dt)` while more than one
    /// full step is pending.
    ///
    /// Returns the number of steps run. Stops at the first error, which
    /// is returned; the time for the failed step stays consumed.
    pub fn advance<E, F>(&mut self, elapsed: f64, mut step: F) -> Result<u32, E>
    where
        F: FnMut(f64) -> Result<(), E>,
    {
        if !self.accumulate(elapsed) {
            return Ok(0);
        }
        while self.next_step() {
            step(self.physics_dt)?;
        }
        Ok(self.last.steps)
    }

    /// Start an advance by adding `elapsed` seconds to the pending time.
    ///
    /// Returns `false`, adding nothing, when `elapsed` is negative or not
    /// finite. Drive the steps with [`next_step`](Self::next_step).
    pub fn accumulate(&mut self, elapsed: f64) -> bool {
        self.last = ClockDiagnostics::default();
        if !elapsed.is_finite() || elapsed < 0.0 {
            tracing::warn!(elapsed, "ignoring invalid elapsed time");
            return false;
        }
        self.unapplied_time += elapsed;
        true
    }

    /// Claim the next fixed step of the current advance.
    ///
    /// Returns `true` when a step is due; the step is counted and its time
    /// consumed before the caller runs it. Returns `false` once at most one
    /// step's worth of time is pending, or when the step clamp is hit, in
    /// which case the remaining backlog is dropped.
    pub fn next_step(&mut self) -> bool {
        if self.unapplied_time <= self.physics_dt {
            return false;
        }
        let steps = self.last.steps;
        if self.max_steps_per_advance.is_some_and(|max| steps >= max) {
            let before = self.unapplied_time;
            self.unapplied_time %= self.physics_dt;
            self.last.dropped_time = before - self.unapplied_time;
            tracing::warn!(
                steps,
                dropped = self.last.dropped_time,
                "step limit reached, dropping simulation backlog"
            );
            return false;
        }
        self.unapplied_time -= self.physics_dt;
        self.step_counter += 1;
        self.last.steps += 1;
        tracing::trace!(step = self.step_counter, "fixed step");
        true
    }

    // -- accessors ----------------------------------------------------------

    pub fn physics_dt(&self) -> f64 {
        self.physics_dt
    }

    /// Time added but not yet simulated.
    pub fn unapplied_time(&self) -> f64 {
        self.unapplied_time
    }

    /// Total steps run so far.
    pub fn step_count(&self) -> u64 {
        self.step_counter
    }

    /// Simulated time in seconds.
    pub fn sim_time(&self) -> f64 {
        self.step_counter as f64 * self.physics_dt
    }

    pub fn max_steps_per_advance(&self) -> Option<u32> {
        self.max_steps_per_advance
    }

    pub fn last_diagnostics(&self) -> ClockDiagnostics {
        self.last
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
