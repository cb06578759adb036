//! Paced simulation clock.
//!
//! The coordinator owns the only [`SimClock`]. Each tick advances simulated
//! time by `step_ms * speed` milliseconds; nodes never advance time on their
//! own and only mirror what the coordinator broadcasts.
//!
//! # Design Principles
//!
//! - All time arithmetic is checked; overflow is an error, never a wrap.
//! - The running flag belongs to the clock, while the barrier that decides
//!   when to set it belongs to the coordinator.

use chrono::{DateTime, Duration, Utc};

use crate::config::ClockConfig;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Simulated time would leave the representable range.
    #[error("simulation time overflow")]
    Overflow,

    /// Speed is negative or not a number.
    #[error("invalid simulation speed {speed}")]
    InvalidSpeed {
        /// The rejected speed.
        speed: f64,
    },

    /// Step is zero.
    #[error("invalid simulation step {step_ms} ms")]
    InvalidStep {
        /// The rejected step.
        step_ms: u64,
    },
}

/// Simulated time, rate and step.
#[derive(Debug, Clone, PartialEq)]
pub struct SimClock {
    time: DateTime<Utc>,
    speed: f64,
    step_ms: u64,
    running: bool,
}

impl SimClock {
    /// Clock from configuration, starting at `start_time` or wall-clock now.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError`] when speed or step are out of range.
    pub fn new(config: &ClockConfig) -> Result<Self, ClockError> {
        Self::from_parts(
            config.start_time.unwrap_or_else(Utc::now),
            config.sim_speed,
            config.sim_step_ms,
        )
    }

    /// Clock from explicit parameters. The clock starts stopped.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError`] when speed or step are out of range.
    pub fn from_parts(time: DateTime<Utc>, speed: f64, step_ms: u64) -> Result<Self, ClockError> {
        validate_speed(speed)?;
        if step_ms == 0 {
            return Err(ClockError::InvalidStep { step_ms });
        }
        Ok(Self {
            time,
            speed,
            step_ms,
            running: false,
        })
    }

    /// Current simulated time.
    pub const fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Current simulated time in epoch milliseconds.
    pub fn time_ms(&self) -> i64 {
        self.time.timestamp_millis()
    }

    /// Current rate.
    pub const fn speed(&self) -> f64 {
        self.speed
    }

    /// Wall-clock interval between ticks.
    pub const fn step_ms(&self) -> u64 {
        self.step_ms
    }

    /// Wall-clock interval between ticks.
    pub const fn step(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.step_ms)
    }

    /// Whether ticks currently advance time.
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Let ticks advance time.
    pub const fn start(&mut self) {
        self.running = true;
    }

    /// Freeze time. Ticks become no-ops.
    pub const fn pause(&mut self) {
        self.running = false;
    }

    /// Jump to an absolute time.
    pub const fn set_time(&mut self, time: DateTime<Utc>) {
        self.time = time;
    }

    /// Change the rate.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidSpeed`] for negative or non-finite speeds.
    pub fn set_speed(&mut self, speed: f64) -> Result<(), ClockError> {
        validate_speed(speed)?;
        self.speed = speed;
        Ok(())
    }

    /// Change the tick interval.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidStep`] for a zero step.
    pub const fn set_step_ms(&mut self, step_ms: u64) -> Result<(), ClockError> {
        if step_ms == 0 {
            return Err(ClockError::InvalidStep { step_ms });
        }
        self.step_ms = step_ms;
        Ok(())
    }

    /// Simulated duration covered by one tick.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Overflow`] when the increment does not fit.
    pub fn increment(&self) -> Result<Duration, ClockError> {
        let millis = (self.step_ms as f64 * self.speed).round();
        if !millis.is_finite() || millis > i64::MAX as f64 {
            return Err(ClockError::Overflow);
        }
        #[allow(clippy::cast_possible_truncation)]
        let millis = millis as i64;
        Ok(Duration::milliseconds(millis))
    }

    /// Advance by one tick. Returns the new time.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Overflow`] if time would leave chrono's range.
    pub fn advance(&mut self) -> Result<DateTime<Utc>, ClockError> {
        let increment = self.increment()?;
        self.time = self
            .time
            .checked_add_signed(increment)
            .ok_or(ClockError::Overflow)?;
        Ok(self.time)
    }
}

fn validate_speed(speed: f64) -> Result<(), ClockError> {
    if speed.is_finite() && speed >= 0.0 {
        Ok(())
    } else {
        Err(ClockError::InvalidSpeed { speed })
    }
}
