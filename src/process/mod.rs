//! The process contract
//!
//! A process declares the ports it reads and writes and maps the current
//! port values to an update. It never sees the tree directly: states are
//! gathered through its topology and its update is routed back the same way.

pub mod topology;

use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::types::Time;
use crate::state::schema::PortsSchema;
use crate::state::update::Update;
use crate::state::value::Value;

pub use topology::Topology;

/// Port name -> current value of the region it points at
pub type States = BTreeMap<String, Value>;

/// Failure raised inside a process
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessError {
    #[error("missing state: {0}")]
    MissingState(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("{0}")]
    Failed(String),
}

/// Unit of behavior
///
/// Processes are `Send` so a tick can evaluate them on a rayon pool. Any
/// memory they keep between calls (a timeline cursor, a seeded rng) is
/// private to the process and never part of the shared tree.
pub trait Process: Send {
    /// Kind name, used in logs and errors
    fn name(&self) -> &str;

    /// Every leaf this process reads or writes, with schema metadata
    fn ports_schema(&self) -> PortsSchema;

    /// Compute the update for one step of length `timestep`
    fn next_update(&mut self, timestep: Time, states: &States) -> Result<Update, ProcessError>;

    /// Preferred fixed timestep; `None` uses the experiment default
    fn timestep(&self) -> Option<Time> {
        None
    }

    /// Adaptive timestep request based on the current state
    fn calculate_timestep(&self, _states: &States) -> Option<Time> {
        self.timestep()
    }

    /// Derivers run after the regular updates of a tick are applied
    fn is_deriver(&self) -> bool {
        false
    }

    /// Ports that only carry writes or structural commands
    ///
    /// They are left out of `states`, so their subtree is never cloned.
    fn write_only_ports(&self) -> &[&str] {
        &[]
    }
}

/// Value at `keys` below `port`
pub fn state_at<'a>(states: &'a States, port: &str, keys: &[&str]) -> Result<&'a Value, ProcessError> {
    let root = states
        .get(port)
        .ok_or_else(|| ProcessError::MissingState(port.to_string()))?;
    root.get_in(keys)
        .ok_or_else(|| ProcessError::MissingState(format!("{}/{}", port, keys.join("/"))))
}

/// Numeric value at `keys` below `port`
pub fn state_f64(states: &States, port: &str, keys: &[&str]) -> Result<f64, ProcessError> {
    let value = state_at(states, port, keys)?;
    value.as_f64().ok_or_else(|| {
        ProcessError::Failed(format!(
            "{}/{} is {}, expected a number",
            port,
            keys.join("/"),
            value.type_name()
        ))
    })
}

/// Flag at `keys` below `port`; numbers count as set when non-zero
pub fn state_flag(states: &States, port: &str, keys: &[&str]) -> Result<bool, ProcessError> {
    let value = state_at(states, port, keys)?;
    match value {
        Value::Bool(flag) => Ok(*flag),
        other => other.as_f64().map(|v| v != 0.0).ok_or_else(|| {
            ProcessError::Failed(format!("{}/{} is {}, expected a flag", port, keys.join("/"), other.type_name()))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states() -> States {
        States::from([(
            "global".to_string(),
            Value::map([("volume", Value::Float(1.5)), ("divide", Value::Int(1)), ("name", Value::from("x"))]),
        )])
    }

    #[test]
    fn test_state_f64() {
        assert_eq!(state_f64(&states(), "global", &["volume"]).unwrap(), 1.5);
        assert!(matches!(state_f64(&states(), "global", &["mass"]), Err(ProcessError::MissingState(_))));
        assert!(matches!(state_f64(&states(), "global", &["name"]), Err(ProcessError::Failed(_))));
    }

    #[test]
    fn test_state_flag_accepts_numbers() {
        assert!(state_flag(&states(), "global", &["divide"]).unwrap());
        assert!(matches!(state_flag(&states(), "internal", &["x"]), Err(ProcessError::MissingState(_))));
    }
}
