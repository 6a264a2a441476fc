//! Per-run resource budgets.

use std::time::Duration;

use crate::config::RuntimeConfig;
use crate::error::{RelayError, Result};

/// Floor for the tool-call budget derived from configuration.
const MIN_DERIVED_TOOL_CALLS: u32 = 12;

/// Step, tool-call and wall-clock budgets for one `run()`.
///
/// Limits are fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeLimits {
    max_steps: u32,
    max_tool_calls: u32,
    timeout: Duration,
}

impl RuntimeLimits {
    /// Create limits, rejecting zero budgets.
    ///
    /// # Example
    /// ```
    /// use relaybot::agent::RuntimeLimits;
    ///
    /// let limits = RuntimeLimits::new(4, 10, 30).unwrap();
    /// assert_eq!(limits.max_steps(), 4);
    /// assert!(RuntimeLimits::new(0, 10, 30).is_err());
    /// ```
    pub fn new(max_steps: u32, max_tool_calls: u32, timeout_secs: u64) -> Result<Self> {
        if max_steps == 0 {
            return Err(RelayError::Config("max_steps must be at least 1".into()));
        }
        if max_tool_calls == 0 {
            return Err(RelayError::Config(
                "max_tool_calls must be at least 1".into(),
            ));
        }
        if timeout_secs == 0 {
            return Err(RelayError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        Ok(Self {
            max_steps,
            max_tool_calls,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Derive limits from runtime configuration.
    ///
    /// The tool-call budget is twice the iteration budget, never below 12,
    /// and the deadline never drops under `min_timeout_secs`.
    pub fn from_config(cfg: &RuntimeConfig) -> Result<Self> {
        let max_steps = cfg.max_tool_iterations;
        let max_tool_calls = max_steps.saturating_mul(2).max(MIN_DERIVED_TOOL_CALLS);
        let timeout_secs = cfg.timeout_secs.max(cfg.min_timeout_secs);
        Self::new(max_steps, max_tool_calls, timeout_secs)
    }

    /// Provider requests allowed per run.
    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Tool calls allowed per run, summed over all steps.
    pub fn max_tool_calls(&self) -> u32 {
        self.max_tool_calls
    }

    /// Wall-clock deadline for the whole run.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            max_steps: 8,
            max_tool_calls: 12,
            timeout: Duration::from_secs(60),
        }
    }
}
