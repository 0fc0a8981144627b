//! Linear volume growth with optional seeded noise

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::compose::AgentConfig;
use crate::core::error::{EngineError, Result};
use crate::core::types::Time;
use crate::process::{Process, ProcessError, States};
use crate::state::schema::{Divider, PortsSchema, Schema, SchemaTree, Updater};
use crate::state::update::Update;

pub const DEFAULT_GROWTH_RATE: f64 = 1.2;
pub const DEFAULT_INITIAL_VOLUME: f64 = 1.0;

/// Adds `rate * dt` to `global/volume` each step
///
/// With `noise > 0` each increment is perturbed by a uniform draw in
/// `[-noise, noise] * dt` from a rng seeded by the agent seed.
pub struct Growth {
    rate: f64,
    noise: f64,
    initial_volume: f64,
    timestep: Option<Time>,
    rng: ChaCha8Rng,
}

impl Growth {
    pub fn new(rate: f64, seed: u64) -> Self {
        Self {
            rate,
            noise: 0.0,
            initial_volume: DEFAULT_INITIAL_VOLUME,
            timestep: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_timestep(mut self, timestep: Time) -> Self {
        self.timestep = Some(timestep);
        self
    }

    /// Parameters: `growth_rate`, `growth_noise`, `initial_volume`, `growth_timestep`
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let noise = config.param_f64("growth_noise", 0.0)?;
        if noise < 0.0 {
            return Err(EngineError::InvalidConfig(format!("growth_noise must be >= 0, got {}", noise)));
        }
        let mut growth = Growth::new(config.param_f64("growth_rate", DEFAULT_GROWTH_RATE)?, config.seed).with_noise(noise);
        growth.initial_volume = config.param_f64("initial_volume", DEFAULT_INITIAL_VOLUME)?;
        if config.param("growth_timestep").is_some() {
            growth.timestep = Some(config.param_f64("growth_timestep", 0.0)?);
        }
        Ok(growth)
    }
}

impl Process for Growth {
    fn name(&self) -> &str {
        "growth"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([(
            "global".to_string(),
            SchemaTree::node().with(
                "volume",
                Schema::new()
                    .with_default(self.initial_volume)
                    .with_updater(Updater::Accumulate)
                    .with_divider(Divider::Split)
                    .with_emit(true),
            ),
        )])
    }

    fn next_update(&mut self, timestep: Time, _states: &States) -> std::result::Result<Update, ProcessError> {
        let mut delta = self.rate * timestep;
        if self.noise > 0.0 {
            delta += self.rng.gen_range(-self.noise..=self.noise) * timestep;
        }
        Ok(Update::at(["global", "volume"], delta))
    }

    fn timestep(&self) -> Option<Time> {
        self.timestep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::update::LeafWrite;
    use crate::core::types::Path;
    use crate::state::value::Value;

    fn delta(update: Update) -> f64 {
        let mut writes: Vec<LeafWrite> = Vec::new();
        let mut commands = Vec::new();
        update.flatten(&Path::root(), &mut writes, &mut commands);
        writes[0].value.as_f64().unwrap()
    }

    #[test]
    fn test_linear_growth() {
        let mut growth = Growth::new(1.2, 0);
        let update = growth.next_update(0.5, &States::new()).unwrap();
        assert!((delta(update) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_noise_is_seeded() {
        let mut a = Growth::new(1.0, 7).with_noise(0.1);
        let mut b = Growth::new(1.0, 7).with_noise(0.1);
        for _ in 0..5 {
            let da = delta(a.next_update(1.0, &States::new()).unwrap());
            let db = delta(b.next_update(1.0, &States::new()).unwrap());
            assert_eq!(da, db);
            assert!((0.9..=1.1).contains(&da));
        }
    }

    #[test]
    fn test_from_config() {
        let config = AgentConfig::new("0", 1)
            .with_param("growth_rate", 2.0)
            .with_param("initial_volume", 0.5);
        let growth = Growth::from_config(&config).unwrap();
        let ports = growth.ports_schema();
        match &ports["global"] {
            SchemaTree::Node(children) => match &children["volume"] {
                SchemaTree::Leaf(schema) => assert_eq!(schema.default_value(), &Value::Float(0.5)),
                other => panic!("unexpected schema {:?}", other),
            },
            other => panic!("unexpected schema {:?}", other),
        }

        let bad = AgentConfig::new("0", 1).with_param("growth_noise", -1.0);
        assert!(Growth::from_config(&bad).is_err());
    }

    #[test]
    fn test_timestep_parameter_must_be_numeric() {
        let config = AgentConfig::new("0", 1).with_param("growth_timestep", 0.25);
        assert_eq!(Growth::from_config(&config).unwrap().timestep(), Some(0.25));

        let config = AgentConfig::new("0", 1).with_param("growth_timestep", "fast");
        assert!(matches!(Growth::from_config(&config), Err(EngineError::InvalidConfig(_))));
    }
}
