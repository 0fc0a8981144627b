//! The experiment: one run of a composed model
//!
//! An `Experiment` owns the state tree, the agent arena, the clock and the
//! emitter. It is assembled by `ExperimentBuilder`, which registers every
//! process (declaring all ports) before the first tick.

use serde::Serialize;
use uuid::Uuid;

use super::agents::{AgentArena, AgentRecord, AGENTS_ROOT};
use super::tick::{run_simulation_tick, TickReport};
use crate::compose::Composite;
use crate::core::config::SimulationConfig;
use crate::core::error::{EngineError, Result};
use crate::core::types::{AgentKey, Path, Time, TIME_EPSILON};
use crate::emit::{Emitter, NullEmitter, Snapshot};
use crate::process::{Process, Topology};
use crate::state::schema::{Schema, SchemaTree};
use crate::state::store::Store;
use crate::state::update::AgentSpec;
use crate::state::value::Value;

/// Lifecycle of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// Built, no tick taken yet
    Idle,
    Running,
    /// Finished or failed; no further ticks
    Finalized,
}

/// Totals for a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub ticks: u64,
    pub final_time: Time,
    pub agents: usize,
    pub processes: usize,
    pub snapshots: usize,
}

impl RunSummary {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        format!(
            "run {}: {} ticks to t={}, {} agents, {} processes, {} snapshots",
            self.run_id, self.ticks, self.final_time, self.agents, self.processes, self.snapshots
        )
    }
}

pub struct Experiment {
    pub(super) config: SimulationConfig,
    pub(super) run_id: Uuid,
    pub(super) store: Store,
    pub(super) agents: AgentArena,
    pub(super) time: Time,
    pub(super) next_emit: Time,
    pub(super) last_emit: Option<Time>,
    pub(super) state: RunState,
    pub(super) emitter: Box<dyn Emitter>,
    pub(super) ticks: u64,
    pub(super) snapshots: usize,
}

impl Experiment {
    pub fn builder(config: SimulationConfig) -> ExperimentBuilder {
        ExperimentBuilder::new(config)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Value view of the subtree at `path`
    pub fn value(&self, path: impl Into<Path>) -> Result<Value> {
        self.store.value(&path.into())
    }

    /// Ids of every registered agent, in registration order
    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.ids()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.ids().len()
    }

    pub fn process_count(&self) -> usize {
        self.agents.process_count()
    }

    /// Process names of one agent, `None` if it is not registered
    pub fn process_names(&self, agent_id: &str) -> Option<Vec<String>> {
        self.agents
            .find(agent_id)
            .map(|record| record.slots.iter().map(|slot| slot.name.clone()).collect())
    }

    pub fn is_complete(&self) -> bool {
        self.time + TIME_EPSILON >= self.config.total_time
    }

    /// The emitted leaves at the current time
    pub fn snapshot(&self) -> Snapshot {
        Snapshot { run_id: self.run_id, time: self.time, data: self.store.emit_view() }
    }

    pub(super) fn emit_snapshot(&mut self) -> Result<()> {
        let snapshot = self.snapshot();
        self.emitter.emit(&snapshot)?;
        self.snapshots += 1;
        self.last_emit = Some(self.time);
        let step = self.config.emit_step;
        self.next_emit = (((self.time + TIME_EPSILON) / step).floor() + 1.0) * step;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        tracing::info!(
            run_id = %self.run_id,
            agents = self.agent_count(),
            processes = self.process_count(),
            total_time = self.config.total_time,
            "experiment started"
        );
        self.state = RunState::Running;
        self.emit_snapshot()
    }

    /// Take one tick
    ///
    /// The first call records the initial snapshot. Once simulated time is
    /// exhausted the experiment is finalized and further calls fail with
    /// `Finalized`; so does any call after an error.
    pub fn step(&mut self) -> Result<TickReport> {
        if self.state == RunState::Finalized {
            return Err(EngineError::Finalized);
        }
        if self.state == RunState::Idle {
            if let Err(error) = self.start() {
                self.abort(&error);
                return Err(error);
            }
        }
        if self.is_complete() {
            self.finish()?;
            return Err(EngineError::Finalized);
        }
        match run_simulation_tick(self) {
            Ok(report) => {
                self.ticks += 1;
                Ok(report)
            }
            Err(error) => {
                self.abort(&error);
                Err(error)
            }
        }
    }

    /// Run until `total_time`, then finalize
    pub fn run(&mut self) -> Result<RunSummary> {
        if self.state == RunState::Idle {
            if let Err(error) = self.start() {
                self.abort(&error);
                return Err(error);
            }
        }
        while !self.is_complete() {
            self.step()?;
        }
        self.finish()
    }

    /// Take whole ticks until at least `duration` more time has passed or
    /// the run is complete; the experiment stays open
    pub fn run_for(&mut self, duration: Time) -> Result<Vec<TickReport>> {
        let until = self.time + duration;
        let mut reports = Vec::new();
        while self.time + TIME_EPSILON < until && !self.is_complete() {
            reports.push(self.step()?);
        }
        Ok(reports)
    }

    /// Record the final state if it fell between emit boundaries, then
    /// flush the emitter and close the run
    pub fn finish(&mut self) -> Result<RunSummary> {
        if self.state == RunState::Finalized {
            return Err(EngineError::Finalized);
        }
        if self.state == RunState::Running && self.last_emit != Some(self.time) {
            if let Err(error) = self.emit_snapshot() {
                self.abort(&error);
                return Err(error);
            }
        }
        self.state = RunState::Finalized;
        self.emitter.finalize()?;
        let summary = self.summary();
        tracing::info!(run_id = %self.run_id, ticks = summary.ticks, time = summary.final_time, "experiment finished");
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            ticks: self.ticks,
            final_time: self.time,
            agents: self.agent_count(),
            processes: self.process_count(),
            snapshots: self.snapshots,
        }
    }

    fn abort(&mut self, error: &EngineError) {
        self.state = RunState::Finalized;
        tracing::error!(run_id = %self.run_id, time = self.time, %error, "experiment aborted");
        if let Err(flush) = self.emitter.finalize() {
            tracing::warn!(error = %flush, "emitter failed to finalize after abort");
        }
    }

    /// Graft a generated agent at `path`, starting from `subtree`
    pub(super) fn graft_agent(&mut self, path: Path, spec: AgentSpec, subtree: Store, start: Time) -> Result<AgentKey> {
        let AgentSpec { id, generator, config, initial_state } = spec;
        self.store.insert_subtree(&path, subtree)?;
        let composite = generator.generate(&config)?;
        let record = AgentRecord::register(&mut self.store, id, path.clone(), composite, start)?;
        if let Some(state) = initial_state {
            self.store.set_state(&path, &state)?;
        }
        tracing::debug!(agent = %record.id, generator = generator.name(), path = %path, "agent registered");
        Ok(self.agents.insert(record))
    }
}

/// Stages processes, agents and initial state for an experiment
pub struct ExperimentBuilder {
    config: SimulationConfig,
    composites: Vec<Composite>,
    processes: Vec<(String, Box<dyn Process>, Topology)>,
    agents: Vec<AgentSpec>,
    declarations: Vec<(Path, Schema)>,
    initial_state: Option<Value>,
    emitter: Option<Box<dyn Emitter>>,
}

impl ExperimentBuilder {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            composites: Vec::new(),
            processes: Vec::new(),
            agents: Vec::new(),
            declarations: Vec::new(),
            initial_state: None,
            emitter: None,
        }
    }

    /// A top-level process, wired relative to the root
    pub fn process<P: Process + 'static>(mut self, name: impl Into<String>, process: P, topology: Topology) -> Self {
        self.processes.push((name.into(), Box::new(process), topology));
        self
    }

    /// A top-level composite, wired relative to the root
    pub fn composite(mut self, composite: Composite) -> Self {
        self.composites.push(composite);
        self
    }

    /// An agent grafted at `agents/<id>`
    pub fn agent(mut self, spec: AgentSpec) -> Self {
        self.agents.push(spec);
        self
    }

    /// Declare one leaf outside any process, merged with what processes declare
    pub fn declare(mut self, path: impl Into<Path>, schema: Schema) -> Self {
        self.declarations.push((path.into(), schema));
        self
    }

    /// Nested values written over the declared defaults
    pub fn initial_state(mut self, state: Value) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn emitter<E: Emitter + 'static>(mut self, emitter: E) -> Self {
        self.emitter = Some(Box::new(emitter));
        self
    }

    /// Register everything and declare every port
    ///
    /// Schema conflicts, missing topology and unknown ports all surface here.
    pub fn build(self) -> Result<Experiment> {
        self.config.validate()?;

        let mut top_level = Composite::new();
        for composite in self.composites {
            top_level.merge_at(&Path::root(), composite)?;
        }
        for (name, process, topology) in self.processes {
            top_level.add_process(name, process, topology)?;
        }

        let emitter: Box<dyn Emitter> = match self.emitter {
            Some(emitter) => emitter,
            None => Box::new(NullEmitter),
        };
        let mut experiment = Experiment {
            run_id: Uuid::new_v4(),
            store: Store::new(),
            agents: AgentArena::new(),
            time: 0.0,
            next_emit: 0.0,
            last_emit: None,
            state: RunState::Idle,
            emitter,
            ticks: 0,
            snapshots: 0,
            config: self.config,
        };

        let record = AgentRecord::register(&mut experiment.store, "", Path::root(), top_level, 0.0)?;
        experiment.agents.insert(record);
        for spec in self.agents {
            let path = Path::new([AGENTS_ROOT.to_string(), spec.id.clone()]);
            experiment.graft_agent(path, spec, Store::new(), 0.0)?;
        }
        for (path, schema) in &self.declarations {
            experiment.store.declare(path, &SchemaTree::Leaf(schema.clone()))?;
        }
        if let Some(state) = &self.initial_state {
            experiment.store.set_state(&Path::root(), state)?;
        }

        tracing::debug!(
            run_id = %experiment.run_id,
            leaves = experiment.store.leaf_count(),
            processes = experiment.process_count(),
            "experiment built"
        );
        Ok(experiment)
    }
}
