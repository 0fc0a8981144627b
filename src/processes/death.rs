//! Threshold death: removes its own agent once a detector fires

use crate::compose::AgentConfig;
use crate::core::error::Result;
use crate::core::types::Time;
use crate::process::{state_f64, Process, ProcessError, States};
use crate::state::schema::{Divider, PortsSchema, Schema, SchemaTree, Updater};
use crate::state::update::{Command, Update};

pub const DEFAULT_DEATH_THRESHOLD: f64 = 0.9;
pub const DEFAULT_DETECTOR_KEY: &str = "antibiotic";

/// Deletes the agent when `internal/<key>` exceeds `threshold`
///
/// The `agents` port points at the node holding the agent; the update also
/// raises `global/dead` so the flag is visible to any process that still
/// runs in the same tick.
pub struct Death {
    agent_id: String,
    detector_key: String,
    threshold: f64,
}

impl Death {
    pub fn new(agent_id: impl Into<String>, detector_key: impl Into<String>, threshold: f64) -> Self {
        Self { agent_id: agent_id.into(), detector_key: detector_key.into(), threshold }
    }

    /// Parameters: `detector_key`, `death_threshold`
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        Ok(Self::new(
            config.agent_id.clone(),
            config.param_str("detector_key", DEFAULT_DETECTOR_KEY)?,
            config.param_f64("death_threshold", DEFAULT_DEATH_THRESHOLD)?,
        ))
    }
}

impl Process for Death {
    fn name(&self) -> &str {
        "death"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([
            (
                "internal".to_string(),
                SchemaTree::node().with(self.detector_key.clone(), Schema::new().with_default(0.0)),
            ),
            (
                "global".to_string(),
                SchemaTree::node().with(
                    "dead",
                    Schema::new()
                        .with_default(false)
                        .with_updater(Updater::Set)
                        .with_divider(Divider::Zero)
                        .with_emit(true),
                ),
            ),
            ("agents".to_string(), SchemaTree::node()),
        ])
    }

    fn next_update(&mut self, _timestep: Time, states: &States) -> std::result::Result<Update, ProcessError> {
        let level = state_f64(states, "internal", &[self.detector_key.as_str()])?;
        if level <= self.threshold {
            return Ok(Update::empty());
        }
        tracing::debug!(agent = %self.agent_id, level, "death detector fired");
        Ok(Update::at(["global", "dead"], true)
            .with("agents", Update::empty().command(Command::Delete(self.agent_id.clone()))))
    }

    fn write_only_ports(&self) -> &[&str] {
        &["agents"]
    }
}
