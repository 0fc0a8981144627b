//! A growing cell that divides past a volume threshold

use std::sync::Arc;

use crate::compartments::DeathCell;
use crate::compose::{AgentConfig, Composite, Generator};
use crate::core::error::Result;
use crate::core::types::Path;
use crate::process::Topology;
use crate::processes::{DivisionVolume, Growth, MetaDivision};

/// growth + division_volume + meta_division
///
/// With a positive `injection_rate` parameter the death compartment is
/// folded in as well, so the cell can also be killed.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrowthDivision;

impl Generator for GrowthDivision {
    fn name(&self) -> &str {
        "growth_division"
    }

    fn generate(&self, config: &AgentConfig) -> Result<Composite> {
        let global = Topology::new().with("global", "global");
        let mut composite = Composite::new()
            .with_process("growth", Growth::from_config(config)?, global.clone())?
            .with_process("division_volume", DivisionVolume::from_config(config)?, global.clone())?
            .with_process(
                "meta_division",
                MetaDivision::new(Arc::new(*self), config.clone()),
                global.with("agents", ".."),
            )?;

        if config.param_f64("injection_rate", 0.0)? > 0.0 {
            composite.merge_at(&Path::root(), DeathCell.generate(config)?)?;
        }
        Ok(composite)
    }
}
