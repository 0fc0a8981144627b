//! Vivarium Core - command line runner
//!
//! Runs an experiment described by a TOML file, or a colony of
//! growth_division cells when no file is given, and writes the emitted
//! snapshots as JSON lines.

use clap::Parser;
use std::path::PathBuf;

use vivarium_core::compose::{AgentConfig, ExperimentFile, Registry};
use vivarium_core::core::error::Result;
use vivarium_core::core::SimulationConfig;
use vivarium_core::emit::{JsonLinesEmitter, Timeseries};
use vivarium_core::process::Topology;
use vivarium_core::processes::ColonyMetric;
use vivarium_core::simulation::ExperimentBuilder;
use vivarium_core::state::update::AgentSpec;

#[derive(Parser, Debug)]
#[command(name = "vivarium-core")]
#[command(about = "Run a compositional agent simulation")]
struct Args {
    /// Experiment file (TOML); without one a growth_division colony is run
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the simulated run length
    #[arg(long)]
    total_time: Option<f64>,

    /// Override the interval between snapshots
    #[arg(long)]
    emit_step: Option<f64>,

    /// Override the root random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Write snapshots as JSON lines to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Number of founder cells when no experiment file is given
    #[arg(long, default_value_t = 1)]
    agents: usize,
}

fn default_colony(config: SimulationConfig, agents: usize, registry: &Registry) -> Result<ExperimentBuilder> {
    let generator = registry.generator("growth_division")?;
    let mut builder = ExperimentBuilder::new(config.clone()).process(
        "colony_volume",
        ColonyMetric::new("global/volume", "colony_volume"),
        Topology::new().with("agents", "agents").with("global", "colony"),
    );
    for index in 0..agents {
        let id = index.to_string();
        builder = builder.agent(AgentSpec {
            id: id.clone(),
            generator: generator.clone(),
            config: AgentConfig::new(id, config.seed.wrapping_add(index as u64)),
            initial_state: None,
        });
    }
    Ok(builder)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vivarium_core=info")),
        )
        .init();

    let args = Args::parse();
    let registry = Registry::with_builtins();

    let mut file = match &args.config {
        Some(path) => ExperimentFile::load_file(path)?,
        None => ExperimentFile::default(),
    };
    if let Some(total_time) = args.total_time {
        file.simulation.total_time = total_time;
    }
    if let Some(emit_step) = args.emit_step {
        file.simulation.emit_step = emit_step;
    }
    if let Some(seed) = args.seed {
        file.simulation.seed = seed;
    }
    file.simulation.validate()?;

    let builder = match &args.config {
        Some(_) => file.into_builder(&registry)?,
        None => default_colony(file.simulation.clone(), args.agents, &registry)?,
    };

    let series = Timeseries::new();
    let mut experiment = match &args.output {
        Some(path) => builder.emitter(JsonLinesEmitter::create(path)?).build()?,
        None => builder.emitter(series.clone()).build()?,
    };

    let summary = experiment.run()?;
    println!("{}", summary.summary());
    if args.output.is_none() {
        if let Some(last) = series.snapshots().last() {
            println!("{}", last.to_json()?);
        }
    }
    Ok(())
}
