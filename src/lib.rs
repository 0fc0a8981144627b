//! Vivarium Core - compositional multi-scale agent simulation
//!
//! Processes declare ports over a shared hierarchical store; an experiment
//! evaluates them tick by tick, merges their updates through per-leaf
//! updaters and splits or removes agent subtrees on division and death.

pub mod compartments;
pub mod compose;
pub mod core;
pub mod emit;
pub mod process;
pub mod processes;
pub mod simulation;
pub mod state;

pub use crate::compose::{AgentConfig, Composite, Generator, Registry};
pub use crate::core::{EngineError, Path, Result, SimulationConfig};
pub use crate::process::{Process, ProcessError, States, Topology};
pub use crate::simulation::{Experiment, ExperimentBuilder};
pub use crate::state::{Divider, Schema, SchemaTree, Store, Update, Updater, Value};
