//! Scheduling: the experiment, its tick loop and structural changes

pub mod agents;
pub mod division;
pub mod experiment;
pub mod tick;

pub use agents::{AgentArena, AgentRecord, ProcessSlot, AGENTS_ROOT};
pub use experiment::{Experiment, ExperimentBuilder, RunState, RunSummary};
pub use tick::TickReport;
