//! Tick system - one scheduler step
//!
//! due processes -> evaluate against one snapshot -> apply value writes ->
//! derivers -> structural commands -> advance time -> emit
//!
//! Evaluation uses rayon once enough processes are due. Every process reads
//! the same pre-tick state and results are collected in arena order, so the
//! outcome does not depend on the thread count.

use ahash::AHashMap;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

use super::agents::{process_label, ProcessSlot};
use super::division::apply_commands;
use super::experiment::Experiment;
use crate::core::error::{EngineError, Result};
use crate::core::types::{Path, Time, TIME_EPSILON};
use crate::process::States;
use crate::state::store::Store;
use crate::state::update::{LeafWrite, LocatedCommand, Update};

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    /// Time at the start of the tick
    pub time: Time,
    /// How far time advanced
    pub advance: Time,
    pub processes_run: usize,
    pub derivers_run: usize,
    pub leaf_writes: usize,
    pub divisions: usize,
    pub deletions: usize,
    pub additions: usize,
    /// Structural commands dropped because their path already changed
    pub skipped_commands: usize,
    pub emitted: bool,
}

/// Leaves replaced so far this tick, with the process that replaced them
type SetClaims = AHashMap<Path, String>;

/// A due process with its inputs
struct Job<'a> {
    label: String,
    slot: &'a mut ProcessSlot,
    states: States,
}

/// Flattened writes tagged with the index of the process that made them
struct Routed {
    labels: Vec<String>,
    writes: Vec<(usize, LeafWrite)>,
    commands: Vec<LocatedCommand>,
}

impl Routed {
    fn new() -> Self {
        Self { labels: Vec::new(), writes: Vec::new(), commands: Vec::new() }
    }

    /// Map a process update through its ports into absolute writes
    fn push(&mut self, label: String, ports: &BTreeMap<String, Path>, update: Update) -> Result<()> {
        let owner = self.labels.len();
        let (children, commands) = match update {
            Update::Branch { children, commands } => (children, commands),
            _ => {
                return Err(EngineError::UpdateShape {
                    path: Path::root(),
                    reason: format!("update from '{}' must be keyed by port", label),
                })
            }
        };
        if !commands.is_empty() {
            return Err(EngineError::UpdateShape {
                path: Path::root(),
                reason: format!("'{}' attached structural commands above its ports", label),
            });
        }
        let mut writes = Vec::new();
        for (port, child) in children {
            let base = ports.get(&port).ok_or_else(|| EngineError::UnknownPort {
                process: label.clone(),
                port: port.clone(),
            })?;
            child.flatten(base, &mut writes, &mut self.commands);
        }
        self.writes.extend(writes.into_iter().map(|write| (owner, write)));
        self.labels.push(label);
        Ok(())
    }

    /// Apply every write, after checking that no two processes replace the
    /// same leaf this tick
    ///
    /// Replacements land before every other write, so the result does not
    /// depend on the order processes were evaluated in.
    fn apply(&self, store: &mut Store, claims: &mut SetClaims) -> Result<usize> {
        let mut sets = Vec::new();
        let mut others = Vec::new();
        for (owner, write) in &self.writes {
            if !store.writes_as_set(write) {
                others.push(write);
                continue;
            }
            let label = &self.labels[*owner];
            match claims.get(&write.path) {
                Some(first) if first != label => {
                    return Err(EngineError::SetConflict {
                        path: write.path.clone(),
                        first: first.clone(),
                        second: label.clone(),
                    })
                }
                Some(_) => {}
                None => {
                    claims.insert(write.path.clone(), label.clone());
                }
            }
            sets.push(write);
        }
        for write in sets.into_iter().chain(others) {
            store.apply_leaf(write)?;
        }
        Ok(self.writes.len())
    }
}

/// Run one tick
///
/// Must only be called while `time < total_time`.
pub(super) fn run_simulation_tick(experiment: &mut Experiment) -> Result<TickReport> {
    let time = experiment.time;
    let remaining = experiment.config.total_time - time;
    let default_step = experiment.config.timestep;
    let mut report = TickReport { time, ..TickReport::default() };

    // 1. due processes and their port values
    let mut jobs: Vec<Job> = Vec::new();
    for (_, record) in experiment.agents.iter_mut() {
        for slot in record.slots.iter_mut().filter(|slot| slot.is_due(time)) {
            let states = slot.gather(&experiment.store)?;
            jobs.push(Job { label: process_label(&record.id, &slot.name), slot, states });
        }
    }

    // 2. evaluate against the pre-tick snapshot
    let evaluate = |job: &mut Job| -> Result<(Time, Update)> {
        let requested = job.slot.process.calculate_timestep(&job.states).unwrap_or(default_step);
        if !(requested.is_finite() && requested > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "process '{}' requested timestep {}",
                job.label, requested
            )));
        }
        let dt = requested.min(remaining);
        let update = job
            .slot
            .process
            .next_update(dt, &job.states)
            .map_err(|source| EngineError::ProcessExecution { process: job.label.clone(), source })?;
        job.slot.next_run = time + dt;
        Ok((dt, update))
    };
    let results: Vec<Result<(Time, Update)>> = if jobs.len() >= experiment.config.parallel_threshold {
        jobs.par_iter_mut().map(evaluate).collect()
    } else {
        jobs.iter_mut().map(evaluate).collect()
    };
    report.processes_run = jobs.len();

    // 3. partition into leaf writes and structural commands
    let mut routed = Routed::new();
    let mut tick_step: Option<Time> = None;
    for (job, result) in jobs.into_iter().zip(results) {
        let (dt, update) = result?;
        tick_step = Some(tick_step.map_or(dt, |step| step.min(dt)));
        routed.push(job.label, &job.slot.ports, update)?;
    }
    let tick_step = tick_step.unwrap_or_else(|| default_step.min(remaining));

    // 4. value writes
    let mut claims = SetClaims::new();
    report.leaf_writes = routed.apply(&mut experiment.store, &mut claims)?;

    // 4b. derivers see the updated state; replacements still claim per tick
    let mut derived = Routed::new();
    for (_, record) in experiment.agents.iter_mut() {
        for slot in record.slots.iter_mut().filter(|slot| slot.deriver) {
            let label = process_label(&record.id, &slot.name);
            let states = slot.gather(&experiment.store)?;
            let update = slot
                .process
                .next_update(tick_step, &states)
                .map_err(|source| EngineError::ProcessExecution { process: label.clone(), source })?;
            derived.push(label, &slot.ports, update)?;
            report.derivers_run += 1;
        }
    }
    report.leaf_writes += derived.apply(&mut experiment.store, &mut claims)?;

    // 5. structural commands, in encounter order
    let mut commands = routed.commands;
    commands.extend(derived.commands);
    apply_commands(experiment, commands, time + tick_step, &mut report)?;

    // 6. advance to the earliest pending run
    let next = experiment.agents.next_run().unwrap_or(time + tick_step);
    let advance = (next - time).clamp(0.0, remaining);
    let mut now = time + advance;
    if (experiment.config.total_time - now).abs() < TIME_EPSILON {
        now = experiment.config.total_time;
    }
    experiment.time = now;
    report.advance = now - time;

    if experiment.time + TIME_EPSILON >= experiment.next_emit {
        experiment.emit_snapshot()?;
        report.emitted = true;
    }

    tracing::debug!(
        time = experiment.time,
        advance = report.advance,
        processes = report.processes_run,
        writes = report.leaf_writes,
        divisions = report.divisions,
        deletions = report.deletions,
        "tick complete"
    );
    Ok(report)
}
