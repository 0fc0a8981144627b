//! Name-keyed lookup of process constructors and generators
//!
//! Config files refer to processes and generators by string; the registry
//! resolves those names once, at experiment construction.

use ahash::AHashMap;
use std::sync::Arc;

use crate::compartments::{DeathCell, GrowthDivision};
use crate::compose::{AgentConfig, Generator};
use crate::core::error::{EngineError, Result};
use crate::process::Process;
use crate::processes::{ColonyMetric, Death, DivisionVolume, Growth, Injector, Timeline};
use crate::state::schema::{Divider, Updater};

/// Builds a process from a parameter bundle
pub type ProcessFactory = Arc<dyn Fn(&AgentConfig) -> Result<Box<dyn Process>> + Send + Sync>;

pub struct Registry {
    processes: AHashMap<String, ProcessFactory>,
    generators: AHashMap<String, Arc<dyn Generator>>,
    updaters: AHashMap<String, Updater>,
    dividers: AHashMap<String, Divider>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn boxed<P: Process + 'static>(process: Result<P>) -> Result<Box<dyn Process>> {
    Ok(Box::new(process?))
}

impl Registry {
    /// A registry with nothing in it
    pub fn empty() -> Self {
        Self {
            processes: AHashMap::new(),
            generators: AHashMap::new(),
            updaters: AHashMap::new(),
            dividers: AHashMap::new(),
        }
    }

    /// Every built-in process and generator
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register_process("growth", |config| boxed(Growth::from_config(config)));
        registry.register_process("division_volume", |config| boxed(DivisionVolume::from_config(config)));
        registry.register_process("death", |config| boxed(Death::from_config(config)));
        registry.register_process("injector", |config| boxed(Injector::from_config(config)));
        registry.register_process("timeline", |config| boxed(Timeline::from_config(config)));
        registry.register_process("colony_metric", |config| boxed(ColonyMetric::from_config(config)));
        registry.register_generator(GrowthDivision);
        registry.register_generator(DeathCell);
        registry
    }

    pub fn register_process<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&AgentConfig) -> Result<Box<dyn Process>> + Send + Sync + 'static,
    {
        self.processes.insert(name.into(), Arc::new(factory));
    }

    pub fn register_generator<G: Generator + 'static>(&mut self, generator: G) {
        self.generators.insert(generator.name().to_string(), Arc::new(generator));
    }

    /// Make a custom updater available by name
    pub fn register_updater(&mut self, updater: Updater) {
        self.updaters.insert(updater.name().to_string(), updater);
    }

    pub fn register_divider(&mut self, divider: Divider) {
        self.dividers.insert(divider.name().to_string(), divider);
    }

    pub fn build_process(&self, name: &str, config: &AgentConfig) -> Result<Box<dyn Process>> {
        let factory = self
            .processes
            .get(name)
            .ok_or_else(|| EngineError::UnknownProcess(name.to_string()))?;
        factory(config)
    }

    pub fn generator(&self, name: &str) -> Result<Arc<dyn Generator>> {
        self.generators
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownGenerator(name.to_string()))
    }

    /// Registered updaters shadow the built-in names
    pub fn updater(&self, name: &str) -> Result<Updater> {
        match self.updaters.get(name) {
            Some(updater) => Ok(updater.clone()),
            None => Updater::from_name(name),
        }
    }

    pub fn divider(&self, name: &str) -> Result<Divider> {
        match self.dividers.get(name) {
            Some(divider) => Ok(divider.clone()),
            None => Divider::from_name(name),
        }
    }

    /// Sorted process kind names
    pub fn process_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.processes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn generator_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.generators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::value::Value;

    #[test]
    fn test_builtins_are_registered() {
        let registry = Registry::with_builtins();
        assert_eq!(
            registry.process_names(),
            vec!["colony_metric", "death", "division_volume", "growth", "injector", "timeline"]
        );
        assert_eq!(registry.generator_names(), vec!["death_cell", "growth_division"]);
    }

    #[test]
    fn test_build_process() {
        let registry = Registry::default();
        let process = registry.build_process("growth", &AgentConfig::new("", 0)).unwrap();
        assert_eq!(process.name(), "growth");
    }

    #[test]
    fn test_unknown_names() {
        let registry = Registry::default();
        assert!(matches!(
            registry.build_process("photosynthesis", &AgentConfig::new("", 0)),
            Err(EngineError::UnknownProcess(_))
        ));
        assert!(matches!(registry.generator("plant"), Err(EngineError::UnknownGenerator(_))));
        assert!(matches!(registry.updater("multiply"), Err(EngineError::UnknownUpdater(_))));
        assert!(matches!(registry.divider("thirds"), Err(EngineError::UnknownDivider(_))));
    }

    #[test]
    fn test_custom_updater_by_name() {
        let mut registry = Registry::default();
        registry.register_updater(Updater::custom("max", |current: &Value, update: &Value| {
            let a = current.as_f64().unwrap_or(f64::MIN);
            let b = update.as_f64().ok_or("not a number")?;
            Ok(Value::Float(a.max(b)))
        }));
        let updater = registry.updater("max").unwrap();
        assert_eq!(updater.apply(&Value::Float(2.0), &Value::Float(1.0)).unwrap(), Value::Float(2.0));
        assert_eq!(registry.updater("set").unwrap(), Updater::Set);
    }
}
