//! Scheduled overrides: write fixed values at fixed times

use std::collections::BTreeMap;

use crate::compose::AgentConfig;
use crate::core::error::{EngineError, Result};
use crate::core::types::{Path, Time, TIME_EPSILON};
use crate::process::{Process, ProcessError, States};
use crate::state::schema::{PortsSchema, Schema, SchemaTree};
use crate::state::update::Update;
use crate::state::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEvent {
    pub time: Time,
    /// `port/key/...`; the first segment names the port
    pub path: Path,
    pub value: Value,
}

/// Replays a list of events against its ports
///
/// Every event whose time has been reached is written with a `Set`
/// override, whatever the target leaf's own updater. The clock is private
/// to the process and advances by the timestep it is called with.
pub struct Timeline {
    events: Vec<TimelineEvent>,
    cursor: usize,
    clock: Time,
}

impl Timeline {
    pub fn new(mut events: Vec<TimelineEvent>) -> Result<Self> {
        for event in &events {
            if event.path.len() < 2 {
                return Err(EngineError::InvalidConfig(format!(
                    "timeline path '{}' needs a port and a key",
                    event.path
                )));
            }
        }
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(Self { events, cursor: 0, clock: 0.0 })
    }

    /// Parameters: `timeline`, a list of `{time, path, value}` tables
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let entries = config.param("timeline").and_then(Value::as_list).unwrap_or(&[]);
        let events = entries
            .iter()
            .map(|entry| {
                let time = entry.f64_at("time").ok_or_else(|| {
                    EngineError::InvalidConfig("timeline event needs a numeric 'time'".to_string())
                })?;
                let path = entry.get("path").and_then(Value::as_str).ok_or_else(|| {
                    EngineError::InvalidConfig("timeline event needs a 'path'".to_string())
                })?;
                Ok(TimelineEvent {
                    time,
                    path: Path::parse(path),
                    value: entry.get("value").cloned().unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(events)
    }

    pub fn remaining(&self) -> usize {
        self.events.len() - self.cursor
    }
}

fn insert_leaf(tree: &mut SchemaTree, keys: &[String]) {
    let Some((first, rest)) = keys.split_first() else {
        return;
    };
    if let SchemaTree::Node(children) = tree {
        let child = children.entry(first.clone()).or_insert_with(|| {
            if rest.is_empty() {
                SchemaTree::Leaf(Schema::new())
            } else {
                SchemaTree::node()
            }
        });
        insert_leaf(child, rest);
    }
}

impl Process for Timeline {
    fn name(&self) -> &str {
        "timeline"
    }

    fn ports_schema(&self) -> PortsSchema {
        let mut ports = PortsSchema::new();
        for event in &self.events {
            let segments = event.path.segments();
            let tree = ports.entry(segments[0].clone()).or_insert_with(SchemaTree::node);
            insert_leaf(tree, &segments[1..]);
        }
        ports
    }

    fn next_update(&mut self, timestep: Time, _states: &States) -> std::result::Result<Update, ProcessError> {
        let mut due: BTreeMap<&Path, &Value> = BTreeMap::new();
        while let Some(event) = self.events.get(self.cursor) {
            if event.time > self.clock + TIME_EPSILON {
                break;
            }
            due.insert(&event.path, &event.value);
            self.cursor += 1;
        }
        self.clock += timestep;

        let mut update = Update::empty();
        for (path, value) in due {
            update
                .merge(Update::at(path.clone(), Update::set(value.clone())))
                .map_err(ProcessError::Failed)?;
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(time: Time, path: &str, value: impl Into<Value>) -> TimelineEvent {
        TimelineEvent { time, path: Path::parse(path), value: value.into() }
    }

    #[test]
    fn test_ports_follow_event_paths() {
        let timeline = Timeline::new(vec![
            event(2.0, "environment/glucose", 5.0),
            event(1.0, "global/divide", true),
        ])
        .unwrap();
        let ports = timeline.ports_schema();
        let names: Vec<&str> = ports.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["environment", "global"]);
    }

    #[test]
    fn test_events_fire_once_in_order() {
        let mut timeline = Timeline::new(vec![event(1.0, "env/glucose", 5.0), event(0.0, "env/glucose", 1.0)]).unwrap();
        let first = timeline.next_update(1.0, &States::new()).unwrap();
        assert!(!first.is_empty());
        assert_eq!(timeline.remaining(), 1);

        let second = timeline.next_update(1.0, &States::new()).unwrap();
        let mut writes = Vec::new();
        let mut commands = Vec::new();
        second.flatten(&Path::root(), &mut writes, &mut commands);
        assert_eq!(writes[0].value, Value::Float(5.0));
        assert!(writes[0].updater.as_ref().map(|u| u.is_set()).unwrap_or(false));

        assert!(timeline.next_update(1.0, &States::new()).unwrap().is_empty());
    }

    #[test]
    fn test_same_leaf_later_event_wins() {
        let mut timeline = Timeline::new(vec![event(0.0, "env/x", 1.0), event(0.0, "env/x", 2.0)]).unwrap();
        let update = timeline.next_update(1.0, &States::new()).unwrap();
        let mut writes = Vec::new();
        let mut commands = Vec::new();
        update.flatten(&Path::root(), &mut writes, &mut commands);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].value, Value::Float(2.0));
    }

    #[test]
    fn test_rejects_bare_port_path() {
        assert!(Timeline::new(vec![event(0.0, "env", 1.0)]).is_err());
    }

    #[test]
    fn test_from_config() {
        let entry = Value::map([
            ("time", Value::Float(3.0)),
            ("path", Value::from("global/volume")),
            ("value", Value::Float(1.0)),
        ]);
        let config = AgentConfig::new("", 0).with_param("timeline", Value::List(vec![entry]));
        let timeline = Timeline::from_config(&config).unwrap();
        assert_eq!(timeline.remaining(), 1);
    }
}
