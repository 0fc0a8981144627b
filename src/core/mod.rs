pub mod config;
pub mod error;
pub mod types;

pub use config::SimulationConfig;
pub use error::{EngineError, ErrorKind, Result};
pub use types::{AgentKey, Path, Time, TIME_EPSILON};
