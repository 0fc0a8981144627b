//! Volume threshold that raises the division flag

use crate::compose::AgentConfig;
use crate::core::error::Result;
use crate::core::types::Time;
use crate::process::{state_f64, Process, ProcessError, States};
use crate::state::schema::{Divider, PortsSchema, Schema, SchemaTree, Updater};
use crate::state::update::Update;

pub const DEFAULT_DIVISION_VOLUME: f64 = 2.0;

/// Sets `global/divide` once `global/volume` exceeds the threshold
pub struct DivisionVolume {
    threshold: f64,
}

impl DivisionVolume {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Parameters: `division_volume`
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        Ok(Self::new(config.param_f64("division_volume", DEFAULT_DIVISION_VOLUME)?))
    }
}

/// Schema of the shared `divide` flag: replaced on write, reset in daughters
pub fn divide_flag_schema() -> Schema {
    Schema::new()
        .with_default(false)
        .with_updater(Updater::Set)
        .with_divider(Divider::Zero)
}

impl Process for DivisionVolume {
    fn name(&self) -> &str {
        "division_volume"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([(
            "global".to_string(),
            SchemaTree::node()
                .with("volume", Schema::new())
                .with("divide", divide_flag_schema()),
        )])
    }

    fn next_update(&mut self, _timestep: Time, states: &States) -> std::result::Result<Update, ProcessError> {
        let volume = state_f64(states, "global", &["volume"])?;
        if volume > self.threshold {
            Ok(Update::at(["global", "divide"], true))
        } else {
            Ok(Update::empty())
        }
    }
}
