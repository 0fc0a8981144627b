//! Composition: generators build process sets for agents
//!
//! A generator turns an `AgentConfig` into a `Composite`, a named set of
//! processes plus their topologies. Composites nest: a generator may build
//! sub-composites and graft them under a relative prefix with `merge_at`.

pub mod loader;
pub mod registry;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::error::{EngineError, Result};
use crate::core::types::Path;
use crate::process::{Process, Topology};
use crate::state::value::Value;

pub use loader::ExperimentFile;
pub use registry::Registry;

/// Builds the processes of one agent
///
/// Generators are shared between agents (division hands the mother's
/// generator to both daughters), so they are `Send + Sync` and stateless.
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    fn generate(&self, config: &AgentConfig) -> Result<Composite>;
}

/// Parameter bundle handed to a generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "Value::empty_map")]
    pub params: Value,
}

impl AgentConfig {
    pub fn new(agent_id: impl Into<String>, seed: u64) -> Self {
        Self { agent_id: agent_id.into(), seed, params: Value::empty_map() }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Builder-style single parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        match &mut self.params {
            Value::Map(entries) => {
                entries.insert(key.into(), value.into());
            }
            other => *other = Value::map([(key.into(), value.into())]),
        }
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Numeric parameter, `default` when absent
    pub fn param_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.param(key) {
            None => Ok(default),
            Some(value) => value.as_f64().ok_or_else(|| {
                EngineError::InvalidConfig(format!(
                    "parameter '{}' of agent '{}' must be a number, got {}",
                    key,
                    self.agent_id,
                    value.type_name()
                ))
            }),
        }
    }

    pub fn param_str<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str> {
        match self.param(key) {
            None => Ok(default),
            Some(value) => value.as_str().ok_or_else(|| {
                EngineError::InvalidConfig(format!("parameter '{}' must be text, got {}", key, value.type_name()))
            }),
        }
    }

    /// Config of daughter `index`: id `<mother><index>`, seed derived from
    /// the mother's, same parameters
    pub fn daughter(&self, index: usize) -> AgentConfig {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let seed = (0..=index).map(|_| rng.gen::<u64>()).last().unwrap_or(self.seed);
        AgentConfig {
            agent_id: format!("{}{}", self.agent_id, index),
            seed,
            params: self.params.clone(),
        }
    }
}

/// Processes and their wiring, keyed by process name
#[derive(Default)]
pub struct Composite {
    pub processes: BTreeMap<String, Box<dyn Process>>,
    pub topology: BTreeMap<String, Topology>,
}

impl fmt::Debug for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composite")
            .field("processes", &self.processes.keys().collect::<Vec<_>>())
            .field("topology", &self.topology)
            .finish()
    }
}

impl Composite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_process(&mut self, name: impl Into<String>, process: Box<dyn Process>, topology: Topology) -> Result<()> {
        let name = name.into();
        if self.processes.contains_key(&name) {
            return Err(EngineError::DuplicateProcess(name));
        }
        self.topology.insert(name.clone(), topology);
        self.processes.insert(name, process);
        Ok(())
    }

    pub fn with_process<P: Process + 'static>(mut self, name: impl Into<String>, process: P, topology: Topology) -> Result<Self> {
        self.add_process(name, Box::new(process), topology)?;
        Ok(self)
    }

    /// Fold `other` in, its topology rebased under `prefix`
    pub fn merge_at(&mut self, prefix: &Path, other: Composite) -> Result<()> {
        let Composite { processes, mut topology } = other;
        for (name, process) in processes {
            let wiring = topology.remove(&name).unwrap_or_default().prefixed(prefix);
            self.add_process(name, process, wiring)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.processes.keys().map(String::as_str)
    }
}
