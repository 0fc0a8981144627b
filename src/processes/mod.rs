//! Built-in processes
//!
//! Small, self-contained models used by the stock compartments and the
//! test suite. None of them is meant to be biologically accurate.

pub mod colony_metric;
pub mod death;
pub mod division_volume;
pub mod growth;
pub mod injector;
pub mod meta_division;
pub mod timeline;

pub use colony_metric::ColonyMetric;
pub use death::Death;
pub use division_volume::DivisionVolume;
pub use growth::Growth;
pub use injector::Injector;
pub use meta_division::MetaDivision;
pub use timeline::{Timeline, TimelineEvent};
