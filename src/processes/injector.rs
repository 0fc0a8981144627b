//! Constant-rate substrate injection

use crate::compose::AgentConfig;
use crate::core::error::Result;
use crate::core::types::Time;
use crate::process::{Process, ProcessError, States};
use crate::state::schema::{Divider, PortsSchema, Schema, SchemaTree, Updater};
use crate::state::update::Update;

pub const DEFAULT_INJECTION_RATE: f64 = 0.1;

/// Adds `rate * dt` of `substrate` to the `internal` port
pub struct Injector {
    substrate: String,
    rate: f64,
}

impl Injector {
    pub fn new(substrate: impl Into<String>, rate: f64) -> Self {
        Self { substrate: substrate.into(), rate }
    }

    /// Parameters: `substrate`, `injection_rate`
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        Ok(Self::new(
            config.param_str("substrate", super::death::DEFAULT_DETECTOR_KEY)?,
            config.param_f64("injection_rate", DEFAULT_INJECTION_RATE)?,
        ))
    }
}

impl Process for Injector {
    fn name(&self) -> &str {
        "injector"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([(
            "internal".to_string(),
            SchemaTree::node().with(
                self.substrate.clone(),
                Schema::new()
                    .with_default(0.0)
                    .with_updater(Updater::Accumulate)
                    .with_divider(Divider::Split)
                    .with_emit(true),
            ),
        )])
    }

    fn next_update(&mut self, timestep: Time, _states: &States) -> std::result::Result<Update, ProcessError> {
        Ok(Update::at(["internal", self.substrate.as_str()], self.rate * timestep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Path;
    use crate::state::value::Value;

    #[test]
    fn test_injects_at_rate() {
        let mut injector = Injector::new("glucose", 0.5);
        let update = injector.next_update(2.0, &States::new()).unwrap();
        let mut writes = Vec::new();
        let mut commands = Vec::new();
        update.flatten(&Path::root(), &mut writes, &mut commands);
        assert_eq!(writes[0].path, Path::from(["internal", "glucose"]));
        assert_eq!(writes[0].value, Value::Float(1.0));
    }
}
