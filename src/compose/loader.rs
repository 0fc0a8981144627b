//! Experiment description files (TOML)
//!
//! ```toml
//! [simulation]
//! total_time = 10.0
//!
//! [[agents]]
//! id = "0"
//! generator = "growth_division"
//! params = { growth_rate = 1.2 }
//!
//! [[processes]]
//! name = "colony"
//! type = "colony_metric"
//! topology = { agents = "agents", global = "colony" }
//!
//! [initial_state.environment]
//! glucose = 10.0
//!
//! [schemas."environment/glucose"]
//! updater = "set"
//! emit = true
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path as FsPath;

use crate::compose::{AgentConfig, Composite, Registry};
use crate::core::config::SimulationConfig;
use crate::core::error::Result;
use crate::core::types::Path;
use crate::process::Topology;
use crate::simulation::ExperimentBuilder;
use crate::state::schema::Schema;
use crate::state::update::AgentSpec;
use crate::state::value::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    pub generator: String,
    /// Defaults to the simulation seed offset by the entry index
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub params: Option<toml::Value>,
    #[serde(default)]
    pub initial_state: Option<toml::Value>,
}

impl AgentEntry {
    /// Explicit seed, or `root + index`
    pub fn seed_for(&self, index: usize, root: u64) -> u64 {
        self.seed.unwrap_or_else(|| root.wrapping_add(index as u64))
    }
}

/// Leaf declaration by name; updater and divider names go through the registry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaEntry {
    #[serde(default)]
    pub default: Option<toml::Value>,
    #[serde(default)]
    pub updater: Option<String>,
    #[serde(default)]
    pub divider: Option<String>,
    #[serde(default)]
    pub emit: Option<bool>,
}

impl SchemaEntry {
    pub fn resolve(&self, registry: &Registry) -> Result<Schema> {
        let mut schema = Schema::new();
        if let Some(default) = &self.default {
            schema = schema.with_default(Value::from(default.clone()));
        }
        if let Some(name) = &self.updater {
            schema = schema.with_updater(registry.updater(name)?);
        }
        if let Some(name) = &self.divider {
            schema = schema.with_divider(registry.divider(name)?);
        }
        if let Some(emit) = self.emit {
            schema = schema.with_emit(emit);
        }
        Ok(schema)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Option<toml::Value>,
    #[serde(default)]
    pub topology: Topology,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExperimentFile {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
    #[serde(default)]
    pub processes: Vec<ProcessEntry>,
    #[serde(default)]
    pub initial_state: Option<toml::Value>,
    /// Extra leaf declarations keyed by absolute path
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaEntry>,
}

fn params_value(params: &Option<toml::Value>) -> Value {
    params.clone().map(Value::from).unwrap_or_else(Value::empty_map)
}

impl ExperimentFile {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ExperimentFile = toml::from_str(content)?;
        file.simulation.validate()?;
        Ok(file)
    }

    pub fn load_file(path: impl AsRef<FsPath>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve every name against `registry` and stage the experiment
    pub fn into_builder(self, registry: &Registry) -> Result<ExperimentBuilder> {
        let mut top_level = Composite::new();
        for entry in &self.processes {
            let config = AgentConfig::new("", self.simulation.seed).with_params(params_value(&entry.params));
            let process = registry.build_process(&entry.kind, &config)?;
            top_level.add_process(entry.name.clone(), process, entry.topology.clone())?;
        }

        let mut builder = ExperimentBuilder::new(self.simulation.clone()).composite(top_level);
        for (index, entry) in self.agents.iter().enumerate() {
            let seed = entry.seed_for(index, self.simulation.seed);
            let config = AgentConfig::new(entry.id.clone(), seed).with_params(params_value(&entry.params));
            builder = builder.agent(AgentSpec {
                id: entry.id.clone(),
                generator: registry.generator(&entry.generator)?,
                config,
                initial_state: entry.initial_state.clone().map(Value::from),
            });
        }
        for (path, entry) in &self.schemas {
            builder = builder.declare(Path::parse(path), entry.resolve(registry)?);
        }
        if let Some(state) = self.initial_state {
            builder = builder.initial_state(Value::from(state));
        }
        Ok(builder)
    }
}
