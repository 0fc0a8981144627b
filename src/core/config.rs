//! Experiment configuration with documented defaults
//!
//! Values here control the scheduler, not the science: how long to run,
//! how often to record, and how process evaluation is spread over threads.

use serde::{Deserialize, Serialize};

use crate::core::error::{EngineError, Result};
use crate::core::types::Time;

/// Configuration for a single simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulated time at which the run stops
    ///
    /// The run ends on the first tick where `time >= total_time`; the last
    /// tick is shortened so time never overshoots.
    pub total_time: Time,

    /// Timestep for processes that do not request their own
    pub timestep: Time,

    /// Interval between recorded snapshots
    ///
    /// A snapshot is taken at time zero and then whenever time crosses the
    /// next multiple of `emit_step`. Setting it equal to the smallest process
    /// timestep records every tick.
    pub emit_step: Time,

    /// Root seed for process-local random number generators
    ///
    /// Experiment files and the command line give each agent without an
    /// explicit seed `seed + index`. Agents staged directly on an
    /// `ExperimentBuilder` carry the seed of their own `AgentConfig`.
    pub seed: u64,

    // === PARALLELIZATION ===
    /// Minimum number of due processes before evaluation uses rayon
    ///
    /// Below this, thread overhead exceeds the benefit. Results are
    /// identical either way since every process sees the pre-tick snapshot.
    pub parallel_threshold: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            total_time: 10.0,
            timestep: 1.0,
            emit_step: 1.0,
            seed: 0,
            parallel_threshold: 64,
        }
    }
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_total_time(mut self, total_time: Time) -> Self {
        self.total_time = total_time;
        self
    }

    pub fn with_timestep(mut self, timestep: Time) -> Self {
        self.timestep = timestep;
        self
    }

    pub fn with_emit_step(mut self, emit_step: Time) -> Self {
        self.emit_step = emit_step;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Parse a `[simulation]`-style TOML table
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if !self.total_time.is_finite() || self.total_time < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "total_time must be a non-negative number, got {}",
                self.total_time
            )));
        }
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "timestep must be positive, got {}",
                self.timestep
            )));
        }
        if !(self.emit_step.is_finite() && self.emit_step > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "emit_step must be positive, got {}",
                self.emit_step
            )));
        }
        Ok(())
    }
}
