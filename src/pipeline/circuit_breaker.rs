//! Commit guard built on the Circuit Breaker pattern.
//!
//! Withholds a snapshot commit when the current collection shrinks sharply
//! compared to the stored one, which usually means the data source broke
//! rather than the listings disappearing. The diff result itself is never
//! altered; only the commit is skipped.
//!
//! Disabled unless `[guard] enabled = true`.

use crate::error::{AppError, Result};
use crate::models::GuardConfig;

/// Circuit breaker for preventing bad snapshot updates.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: GuardConfig,
}

/// Result of circuit breaker check.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerResult {
    /// Safe to proceed with the commit
    Safe {
        current_count: usize,
        previous_count: usize,
    },
    /// Previous snapshot below baseline, nothing to compare against
    ColdStart { current_count: usize },
    /// Circuit breaker triggered - withhold commit
    Triggered {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
    },
    /// Empty collection over a non-empty snapshot
    EmptyResult { previous_count: usize },
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default limits.
    pub fn new() -> Self {
        Self::with_config(GuardConfig::default())
    }

    /// Create a new circuit breaker with custom configuration.
    pub fn with_config(config: GuardConfig) -> Self {
        Self { config }
    }

    /// Build the guard the configuration asks for, if any.
    pub fn from_config(config: &GuardConfig) -> Option<Self> {
        config.enabled.then(|| Self::with_config(config.clone()))
    }

    /// Check if it's safe to replace a snapshot of `previous_count`
    /// entities with one of `current_count`.
    pub fn check(&self, current_count: usize, previous_count: usize) -> CircuitBreakerResult {
        // Case 1: Empty current result
        if current_count == 0 && previous_count > 0 && !self.config.allow_empty {
            return CircuitBreakerResult::EmptyResult { previous_count };
        }

        // Case 2: Cold start (below baseline)
        if previous_count < self.config.min_baseline {
            return CircuitBreakerResult::ColdStart { current_count };
        }

        // Case 3: Check drop percentage
        if current_count < previous_count {
            let drop = previous_count - current_count;
            let drop_percent = (drop as f64 / previous_count as f64) * 100.0;

            if drop_percent > self.config.max_drop_percent as f64 {
                return CircuitBreakerResult::Triggered {
                    current_count,
                    previous_count,
                    drop_percent,
                };
            }
        }

        // Safe to proceed
        CircuitBreakerResult::Safe {
            current_count,
            previous_count,
        }
    }

    /// Validate and return Ok if safe, Err if circuit breaker triggered.
    pub fn validate(&self, current_count: usize, previous_count: usize) -> Result<()> {
        match self.check(current_count, previous_count) {
            CircuitBreakerResult::Safe {
                current_count,
                previous_count,
            } => {
                log::debug!(
                    "Circuit breaker: SAFE ({} entities, was {})",
                    current_count,
                    previous_count
                );
                Ok(())
            }
            CircuitBreakerResult::ColdStart { current_count } => {
                log::debug!(
                    "Circuit breaker: COLD START ({} entities, previous below baseline)",
                    current_count
                );
                Ok(())
            }
            CircuitBreakerResult::Triggered {
                current_count,
                previous_count,
                drop_percent,
            } => {
                log::error!(
                    "Circuit breaker: TRIGGERED! {} → {} entities ({:.1}% drop > {}% threshold)",
                    previous_count,
                    current_count,
                    drop_percent,
                    self.config.max_drop_percent
                );
                Err(AppError::GuardTriggered {
                    current_count,
                    previous_count,
                    drop_percent,
                    threshold_percent: self.config.max_drop_percent,
                })
            }
            CircuitBreakerResult::EmptyResult { previous_count } => {
                log::error!(
                    "Circuit breaker: EMPTY RESULT over {} stored entities",
                    previous_count
                );
                Err(AppError::EmptyCollection { previous_count })
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
