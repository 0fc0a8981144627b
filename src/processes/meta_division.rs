//! Turns a raised division flag into a `Divide` command

use std::sync::Arc;

use crate::compose::{AgentConfig, Generator};
use crate::core::types::Time;
use crate::process::{state_flag, Process, ProcessError, States};
use crate::state::schema::{PortsSchema, Schema, SchemaTree};
use crate::state::update::{AgentSpec, Command, Division, Update};

/// Watches `global/divide` and replaces its agent with two daughters
///
/// The `agents` port must point at the node holding the agent, so the
/// command can name the mother by key. Daughters are rebuilt with the same
/// generator from configs derived from the mother's.
pub struct MetaDivision {
    generator: Arc<dyn Generator>,
    config: AgentConfig,
}

impl MetaDivision {
    pub fn new(generator: Arc<dyn Generator>, config: AgentConfig) -> Self {
        Self { generator, config }
    }

    fn daughters(&self) -> Vec<AgentSpec> {
        (0..2)
            .map(|index| {
                let config = self.config.daughter(index);
                AgentSpec {
                    id: config.agent_id.clone(),
                    generator: Arc::clone(&self.generator),
                    config,
                    initial_state: None,
                }
            })
            .collect()
    }
}

impl Process for MetaDivision {
    fn name(&self) -> &str {
        "meta_division"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([
            ("global".to_string(), SchemaTree::node().with("divide", Schema::new().with_default(false))),
            ("agents".to_string(), SchemaTree::node()),
        ])
    }

    fn next_update(&mut self, _timestep: Time, states: &States) -> std::result::Result<Update, ProcessError> {
        if !state_flag(states, "global", &["divide"])? {
            return Ok(Update::empty());
        }
        tracing::debug!(agent = %self.config.agent_id, "division triggered");
        let division = Division { mother: self.config.agent_id.clone(), daughters: self.daughters() };
        Ok(Update::empty().with("agents", Update::empty().command(Command::Divide(division))))
    }

    fn write_only_ports(&self) -> &[&str] {
        &["agents"]
    }
}
