//! Stock generators

pub mod death_cell;
pub mod growth_division;

pub use death_cell::DeathCell;
pub use growth_division::GrowthDivision;
