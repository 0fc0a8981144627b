//! Agent arena: registered processes grouped by the agent that owns them

use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, BTreeSet};

use crate::compose::Composite;
use crate::core::error::{EngineError, Result};
use crate::core::types::{AgentKey, Path, Time, TIME_EPSILON};
use crate::process::{Process, States};
use crate::state::store::Store;

/// Child of the root under which generated agents live
pub const AGENTS_ROOT: &str = "agents";

/// One registered process with its resolved wiring
pub struct ProcessSlot {
    pub name: String,
    pub process: Box<dyn Process>,
    /// Absolute port paths
    pub ports: BTreeMap<String, Path>,
    /// Ports routed for writes but never gathered
    pub write_only: BTreeSet<String>,
    pub next_run: Time,
    pub deriver: bool,
}

impl ProcessSlot {
    pub fn is_due(&self, time: Time) -> bool {
        !self.deriver && self.next_run <= time + TIME_EPSILON
    }

    /// Current values of every readable port
    pub fn gather(&self, store: &Store) -> Result<States> {
        self.ports
            .iter()
            .filter(|(port, _)| !self.write_only.contains(*port))
            .map(|(port, path)| Ok((port.clone(), store.value(path)?)))
            .collect()
    }
}

/// Processes grafted together at one point of the tree
pub struct AgentRecord {
    /// Agent id; empty for the top-level composite
    pub id: String,
    pub root: Path,
    pub slots: Vec<ProcessSlot>,
}

impl AgentRecord {
    /// Resolve and declare every process of `composite` grafted at `root`
    ///
    /// All ports are declared before anything runs, so schema conflicts
    /// surface here rather than mid-tick.
    pub fn register(
        store: &mut Store,
        id: impl Into<String>,
        root: Path,
        composite: Composite,
        next_run: Time,
    ) -> Result<Self> {
        let Composite { processes, mut topology } = composite;
        let mut slots = Vec::with_capacity(processes.len());
        for (name, process) in processes {
            let schema = process.ports_schema();
            let wiring = topology.remove(&name).unwrap_or_default();
            let ports = wiring.resolve(&name, &schema, &root)?;
            for (port, tree) in &schema {
                let path = ports.get(port).ok_or_else(|| EngineError::MissingTopology {
                    process: name.clone(),
                    port: port.clone(),
                })?;
                store.declare(path, tree)?;
            }
            let deriver = process.is_deriver();
            let write_only = process.write_only_ports().iter().map(|port| port.to_string()).collect();
            slots.push(ProcessSlot { name, process, ports, write_only, next_run, deriver });
        }
        Ok(Self { id: id.into(), root, slots })
    }
}

/// `agent/process` label used in logs and conflict reports
pub fn process_label(agent_id: &str, process: &str) -> String {
    if agent_id.is_empty() {
        process.to_string()
    } else {
        format!("{}/{}", agent_id, process)
    }
}

/// Records keyed by a monotonically increasing `AgentKey`
///
/// Iteration follows key order, which is registration order, so every pass
/// over the arena is deterministic.
#[derive(Default)]
pub struct AgentArena {
    records: BTreeMap<AgentKey, AgentRecord>,
    next_key: u64,
}

impl AgentArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: AgentRecord) -> AgentKey {
        let key = AgentKey(self.next_key);
        self.next_key += 1;
        self.records.insert(key, record);
        key
    }

    /// Drop every record grafted at or below `path`
    pub fn remove_under(&mut self, path: &Path) -> Vec<AgentRecord> {
        let keys: Vec<AgentKey> = self
            .records
            .iter()
            .filter(|(_, record)| record.root.starts_with(path))
            .map(|(key, _)| *key)
            .collect();
        keys.into_iter().filter_map(|key| self.records.remove(&key)).collect()
    }

    pub fn get(&self, key: AgentKey) -> Option<&AgentRecord> {
        self.records.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AgentKey, &AgentRecord)> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&AgentKey, &mut AgentRecord)> {
        self.records.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids of generated agents, top-level composite excluded
    pub fn ids(&self) -> Vec<String> {
        self.records
            .values()
            .filter(|record| !record.id.is_empty())
            .map(|record| record.id.clone())
            .collect()
    }

    pub fn find(&self, id: &str) -> Option<&AgentRecord> {
        self.records.values().find(|record| record.id == id)
    }

    pub fn process_count(&self) -> usize {
        self.records.values().map(|record| record.slots.len()).sum()
    }

    /// Earliest pending run over all regular processes
    pub fn next_run(&self) -> Option<Time> {
        self.records
            .values()
            .flat_map(|record| record.slots.iter())
            .filter(|slot| !slot.deriver)
            .map(|slot| OrderedFloat(slot.next_run))
            .min()
            .map(|t| t.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcessError, Topology};
    use crate::state::schema::{PortsSchema, Schema, SchemaTree};
    use crate::state::update::Update;

    struct Counter;

    impl Process for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn ports_schema(&self) -> PortsSchema {
            PortsSchema::from([("internal".to_string(), SchemaTree::node().with("count", Schema::new().with_default(0)))])
        }

        fn next_update(&mut self, _timestep: Time, _states: &States) -> std::result::Result<Update, ProcessError> {
            Ok(Update::at(["internal", "count"], 1))
        }
    }

    /// Counts into `internal` and attaches nothing to `agents`
    struct Tagger;

    impl Process for Tagger {
        fn name(&self) -> &str {
            "tagger"
        }

        fn ports_schema(&self) -> PortsSchema {
            PortsSchema::from([
                ("internal".to_string(), SchemaTree::node().with("count", Schema::new().with_default(0))),
                ("agents".to_string(), SchemaTree::node()),
            ])
        }

        fn next_update(&mut self, _timestep: Time, _states: &States) -> std::result::Result<Update, ProcessError> {
            Ok(Update::empty())
        }

        fn write_only_ports(&self) -> &[&str] {
            &["agents"]
        }
    }

    fn counter_composite() -> Composite {
        Composite::new().with_process("counter", Counter, Topology::new().with("internal", "cell")).unwrap()
    }

    #[test]
    fn test_register_declares_ports() {
        let mut store = Store::new();
        let record = AgentRecord::register(&mut store, "a", Path::parse("agents/a"), counter_composite(), 0.0).unwrap();
        assert_eq!(record.slots.len(), 1);
        assert_eq!(record.slots[0].ports["internal"], Path::parse("agents/a/cell"));
        assert_eq!(process_label(&record.id, &record.slots[0].name), "a/counter");
        let states = record.slots[0].gather(&store).unwrap();
        assert_eq!(states["internal"].get("count").and_then(|v| v.as_i64()), Some(0));
    }

    #[test]
    fn test_write_only_ports_are_not_gathered() {
        let mut store = Store::new();
        let composite = Composite::new()
            .with_process("tagger", Tagger, Topology::new().with("internal", "internal").with("agents", ".."))
            .unwrap();
        let record = AgentRecord::register(&mut store, "a", Path::parse("agents/a"), composite, 0.0).unwrap();
        let slot = &record.slots[0];
        assert_eq!(slot.ports["agents"], Path::parse("agents"));
        let states = slot.gather(&store).unwrap();
        assert_eq!(states.keys().map(String::as_str).collect::<Vec<_>>(), vec!["internal"]);
    }

    #[test]
    fn test_register_missing_topology() {
        let mut store = Store::new();
        let composite = Composite::new().with_process("counter", Counter, Topology::new()).unwrap();
        let err = AgentRecord::register(&mut store, "a", Path::root(), composite, 0.0).err().unwrap();
        assert!(matches!(err, EngineError::MissingTopology { .. }));
    }

    #[test]
    fn test_remove_under_takes_nested_agents() {
        let mut store = Store::new();
        let mut arena = AgentArena::new();
        for (id, root) in [("a", "agents/a"), ("a-inner", "agents/a/agents/x"), ("b", "agents/b")] {
            let record = AgentRecord::register(&mut store, id, Path::parse(root), counter_composite(), 0.0).unwrap();
            arena.insert(record);
        }
        let removed = arena.remove_under(&Path::parse("agents/a"));
        assert_eq!(removed.len(), 2);
        assert_eq!(arena.ids(), vec!["b".to_string()]);
    }

    #[test]
    fn test_keys_are_never_reused() {
        let mut store = Store::new();
        let mut arena = AgentArena::new();
        let first = arena.insert(AgentRecord::register(&mut store, "a", Path::parse("agents/a"), Composite::new(), 0.0).unwrap());
        arena.remove_under(&Path::parse("agents/a"));
        let second = arena.insert(AgentRecord::register(&mut store, "a", Path::parse("agents/a"), Composite::new(), 0.0).unwrap());
        assert!(second > first);
        assert!(arena.get(first).is_none());
    }
}
