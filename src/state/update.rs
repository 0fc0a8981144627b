//! Typed updates returned by processes
//!
//! Plain data and structural control are separate variants: a leaf write is
//! a `Value` or an `Override`, while deletion, addition and division are
//! `Command`s attached to the branch node they act on.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::compose::{AgentConfig, Generator};
use crate::core::types::Path;
use crate::state::schema::Updater;
use crate::state::value::Value;

/// A new agent to graft into the tree
#[derive(Clone)]
pub struct AgentSpec {
    /// Child key under the node the command is attached to
    pub id: String,
    pub generator: Arc<dyn Generator>,
    pub config: AgentConfig,
    /// Values written over the generated defaults, or over the divided
    /// mother state for daughters
    pub initial_state: Option<Value>,
}

impl fmt::Debug for AgentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSpec")
            .field("id", &self.id)
            .field("generator", &self.generator.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Replace the child `mother` with the given daughters
#[derive(Debug, Clone)]
pub struct Division {
    pub mother: String,
    pub daughters: Vec<AgentSpec>,
}

/// Structural change to the tree, relative to the node it is attached to
#[derive(Debug, Clone)]
pub enum Command {
    /// Remove the named child subtree
    Delete(String),
    /// Graft a new agent
    Add(AgentSpec),
    /// Split a child subtree into daughters
    Divide(Division),
}

impl Command {
    /// Key of the child this command consumes or creates
    pub fn target(&self) -> &str {
        match self {
            Command::Delete(key) => key,
            Command::Add(spec) => &spec.id,
            Command::Divide(division) => &division.mother,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Command::Delete(_) => "delete",
            Command::Add(_) => "add",
            Command::Divide(_) => "divide",
        }
    }
}

/// One node of an update tree
#[derive(Debug, Clone)]
pub enum Update {
    /// Combine with the leaf's declared updater
    Value(Value),
    /// Combine with an explicit updater for this write only
    Override { value: Value, updater: Updater },
    Branch {
        children: BTreeMap<String, Update>,
        commands: Vec<Command>,
    },
}

/// A single leaf write after flattening
#[derive(Debug, Clone)]
pub struct LeafWrite {
    pub path: Path,
    pub value: Value,
    pub updater: Option<Updater>,
}

/// A structural command with the absolute path of its node
#[derive(Debug, Clone)]
pub struct LocatedCommand {
    pub node: Path,
    pub command: Command,
}

impl LocatedCommand {
    /// Absolute path of the child the command targets
    pub fn target_path(&self) -> Path {
        self.node.child(self.command.target())
    }
}

impl Default for Update {
    fn default() -> Self {
        Update::empty()
    }
}

impl Update {
    pub fn empty() -> Self {
        Update::Branch { children: BTreeMap::new(), commands: Vec::new() }
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Update::Value(value.into())
    }

    /// A replacement write regardless of the leaf's updater
    pub fn set(value: impl Into<Value>) -> Self {
        Update::Override { value: value.into(), updater: Updater::Set }
    }

    /// A leaf update nested under `path`
    pub fn at(path: impl Into<Path>, leaf: impl Into<Update>) -> Self {
        let path = path.into();
        path.segments()
            .iter()
            .rev()
            .fold(leaf.into(), |inner, key| Update::empty().with(key.clone(), inner))
    }

    /// Add a child; a leaf update becomes a branch
    pub fn with(self, key: impl Into<String>, child: impl Into<Update>) -> Self {
        let (mut children, commands) = match self {
            Update::Branch { children, commands } => (children, commands),
            _ => (BTreeMap::new(), Vec::new()),
        };
        children.insert(key.into(), child.into());
        Update::Branch { children, commands }
    }

    /// Attach a structural command to this branch
    pub fn command(self, command: Command) -> Self {
        let (children, mut commands) = match self {
            Update::Branch { children, commands } => (children, commands),
            _ => (BTreeMap::new(), Vec::new()),
        };
        commands.push(command);
        Update::Branch { children, commands }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Update::Branch { children, commands } => {
                commands.is_empty() && children.values().all(Update::is_empty)
            }
            _ => false,
        }
    }

    /// Top-level keys (port names for a process update)
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Update::Branch { children, .. } => children.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Deep-merge another update into this one
    ///
    /// Two leaf writes to the same key cannot be combined here since their
    /// updater is only known to the store.
    pub fn merge(&mut self, other: Update) -> Result<(), String> {
        match (self, other) {
            (
                Update::Branch { children, commands },
                Update::Branch { children: other_children, commands: other_commands },
            ) => {
                commands.extend(other_commands);
                for (key, child) in other_children {
                    match children.get_mut(&key) {
                        Some(existing) => existing
                            .merge(child)
                            .map_err(|reason| format!("{}/{}", key, reason))?,
                        None => {
                            children.insert(key, child);
                        }
                    }
                }
                Ok(())
            }
            (this, other) => {
                if this.is_empty() {
                    *this = other;
                    Ok(())
                } else if other.is_empty() {
                    Ok(())
                } else {
                    Err("two writes to the same leaf".to_string())
                }
            }
        }
    }

    /// Flatten into leaf writes and located commands, rooted at `base`
    pub fn flatten(self, base: &Path, writes: &mut Vec<LeafWrite>, commands: &mut Vec<LocatedCommand>) {
        match self {
            Update::Value(value) => writes.push(LeafWrite { path: base.clone(), value, updater: None }),
            Update::Override { value, updater } => {
                writes.push(LeafWrite { path: base.clone(), value, updater: Some(updater) })
            }
            Update::Branch { children, commands: own } => {
                commands.extend(own.into_iter().map(|command| LocatedCommand { node: base.clone(), command }));
                for (key, child) in children {
                    child.flatten(&base.child(key), writes, commands);
                }
            }
        }
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Update::Value(value)
    }
}

impl From<f64> for Update {
    fn from(value: f64) -> Self {
        Update::Value(Value::Float(value))
    }
}

impl From<i64> for Update {
    fn from(value: i64) -> Self {
        Update::Value(Value::Int(value))
    }
}

impl From<i32> for Update {
    fn from(value: i32) -> Self {
        Update::Value(Value::from(value))
    }
}

impl From<bool> for Update {
    fn from(value: bool) -> Self {
        Update::Value(Value::Bool(value))
    }
}
