//! A cell that accumulates a toxin and dies past a threshold

use crate::compose::{AgentConfig, Composite, Generator};
use crate::core::error::Result;
use crate::process::Topology;
use crate::processes::{Death, Injector};

/// injector + death, wired to the same `internal` substrate
#[derive(Debug, Clone, Copy, Default)]
pub struct DeathCell;

impl Generator for DeathCell {
    fn name(&self) -> &str {
        "death_cell"
    }

    fn generate(&self, config: &AgentConfig) -> Result<Composite> {
        let death = Death::from_config(config)?;
        let injector = Injector::from_config(config)?;
        Composite::new()
            .with_process("injector", injector, Topology::new().with("internal", "internal"))?
            .with_process(
                "death",
                death,
                Topology::new()
                    .with("internal", "internal")
                    .with("global", "global")
                    .with("agents", ".."),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Process;

    #[test]
    fn test_injector_and_death_share_substrate() {
        let config = AgentConfig::new("7", 0).with_param("substrate", "toxin").with_param("detector_key", "toxin");
        let composite = DeathCell.generate(&config).unwrap();
        let injector_ports = composite.processes["injector"].ports_schema();
        let death_ports = composite.processes["death"].ports_schema();
        assert!(injector_ports.contains_key("internal"));
        assert!(death_ports.contains_key("agents"));
        assert_eq!(composite.topology["death"].get("agents").map(|p| p.to_string()), Some("..".to_string()));
    }
}
