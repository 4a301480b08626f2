//! Retrying executor
//!
//! Generic at-least-once-until-budget primitive used for every external call.
//!
//! # Schedule
//!
//! The delay before attempt `n` (0-indexed) is `n` backoff units, so the
//! first attempt runs immediately and the worst-case wait before giving up
//! is `0 + 1 + ... + (budget - 1)` units. Running out of budget yields
//! [`Timeout`], never the action's own last error.

use crate::cluster::ClusterOps;
use crate::config::RetryConfig;
use crate::error::{RolloverError, RunStep, Timeout};
use crate::types::{ReplacementStep, StepAction};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Linear-backoff retry wrapper
#[derive(Debug, Clone, Copy)]
pub struct RetryingExecutor {
    unit: Duration,
}

impl RetryingExecutor {
    /// Create executor with the given backoff unit
    #[inline]
    #[must_use]
    pub fn new(unit: Duration) -> Self {
        Self { unit }
    }

    /// Create executor from retry configuration
    #[inline]
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.backoff_unit())
    }

    /// Delay before attempt `attempt` (0-indexed)
    #[inline]
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(attempt)
    }

    /// Total sleep if every attempt of `budget` fails
    #[must_use]
    pub fn worst_case_wait(&self, budget: u32) -> Duration {
        (0..budget).fold(Duration::ZERO, |acc, n| {
            acc.saturating_add(self.backoff_delay(n))
        })
    }

    /// Run `action` until it succeeds or `budget` attempts have failed
    ///
    /// # Errors
    /// - `Timeout` once `budget` attempts failed (immediately for a budget of 0)
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: &str,
        budget: u32,
        mut action: F,
    ) -> Result<T, Timeout>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut last_error = None;

        for attempt in 0..budget {
            let delay = self.backoff_delay(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match action().await {
                Ok(output) => {
                    if attempt > 0 {
                        tracing::info!("{} succeeded after {} attempts", operation, attempt + 1);
                    }
                    return Ok(output);
                }
                Err(e) => {
                    tracing::debug!(
                        "{} attempt {}/{} failed: {}",
                        operation,
                        attempt + 1,
                        budget,
                        e
                    );
                    last_error = Some(e.to_string());
                }
            }
        }

        tracing::warn!("{} gave up after {} attempts", operation, budget);
        Err(Timeout {
            operation: operation.to_string(),
            attempts: budget,
            last_error,
        })
    }

    /// Execute a sequencer step against the cluster
    ///
    /// # Errors
    /// - `RolloverError::Step` naming the step when its budget runs out
    pub async fn run_step(
        &self,
        ops: &dyn ClusterOps,
        step: ReplacementStep,
    ) -> Result<(), RolloverError> {
        let label = step.action.to_string();
        tracing::info!("Running step: {}", label);

        let result = match &step.action {
            StepAction::Terminate(node) => {
                self.execute(&label, step.budget, move || ops.terminate_instance(node))
                    .await
            }
            StepAction::Decommission(node) => {
                self.execute(&label, step.budget, move || ops.decommission_agent(node))
                    .await
            }
            StepAction::WaitForRejoin { role, expected } => {
                let (role, expected) = (*role, *expected);
                self.execute(&label, step.budget, move || {
                    ops.wait_for_count(role, expected)
                })
                .await
            }
        };

        result.map_err(|source| RolloverError::step(RunStep::Replace(step.action), source))
    }
}

impl Default for RetryingExecutor {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
