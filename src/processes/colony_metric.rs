//! Colony-level aggregate of a per-agent metric

use crate::compose::AgentConfig;
use crate::core::error::{EngineError, Result};
use crate::core::types::{Path, Time};
use crate::process::{Process, ProcessError, States};
use crate::state::schema::{Divider, PortsSchema, Schema, SchemaTree, Updater};
use crate::state::update::Update;
use crate::state::value::Value;

/// Sums `<agent>/<metric>` over every agent into `global/<output>`
///
/// Runs as a deriver so the total reflects the state after the tick's
/// regular updates. The output leaf refuses division: it belongs to the
/// colony, not to any agent.
pub struct ColonyMetric {
    metric: Path,
    output: String,
}

impl ColonyMetric {
    pub fn new(metric: impl Into<Path>, output: impl Into<String>) -> Self {
        Self { metric: metric.into(), output: output.into() }
    }

    /// Parameters: `metric` (default `global/volume`), `output` (default `colony_volume`)
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let metric = Path::parse(config.param_str("metric", "global/volume")?);
        if metric.is_root() {
            return Err(EngineError::InvalidConfig("colony metric path is empty".to_string()));
        }
        Ok(Self::new(metric, config.param_str("output", "colony_volume")?))
    }
}

impl Process for ColonyMetric {
    fn name(&self) -> &str {
        "colony_metric"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([
            ("agents".to_string(), SchemaTree::node()),
            (
                "global".to_string(),
                SchemaTree::node().with(
                    self.output.clone(),
                    Schema::new()
                        .with_default(0.0)
                        .with_updater(Updater::Set)
                        .with_divider(Divider::NoDivide)
                        .with_emit(true),
                ),
            ),
        ])
    }

    fn next_update(&mut self, _timestep: Time, states: &States) -> std::result::Result<Update, ProcessError> {
        let agents = states
            .get("agents")
            .and_then(Value::as_map)
            .ok_or_else(|| ProcessError::MissingState("agents".to_string()))?;
        let total: f64 = agents
            .values()
            .filter_map(|agent| agent.get_in(self.metric.segments()))
            .filter_map(Value::as_f64)
            .sum();
        Ok(Update::at(["global", self.output.as_str()], total))
    }

    fn is_deriver(&self) -> bool {
        true
    }
}
