//! Structural commands: division, deletion, addition
//!
//! Commands collected during a tick run here, after every value write. The
//! first command to touch a subtree wins; any later command aimed at the
//! same subtree (or inside it) is skipped with a warning.

use super::experiment::Experiment;
use super::tick::TickReport;
use crate::core::error::{EngineError, Result};
use crate::core::types::{Path, Time};
use crate::state::store::Store;
use crate::state::update::{Command, Division, LocatedCommand};

pub(super) fn apply_commands(
    experiment: &mut Experiment,
    commands: Vec<LocatedCommand>,
    start: Time,
    report: &mut TickReport,
) -> Result<()> {
    let mut consumed: Vec<Path> = Vec::new();
    for located in commands {
        let target = located.target_path();
        if consumed.iter().any(|path| target.starts_with(path)) {
            tracing::warn!(
                command = located.command.label(),
                path = %target,
                "structural command skipped, subtree already changed this tick"
            );
            report.skipped_commands += 1;
            continue;
        }

        let LocatedCommand { node, command } = located;
        match command {
            Command::Divide(division) => {
                let daughters = divide(experiment, &node, division, start)?;
                consumed.extend(daughters);
                report.divisions += 1;
            }
            Command::Delete(key) => {
                delete(experiment, &node.child(key))?;
                report.deletions += 1;
            }
            Command::Add(spec) => {
                let path = node.child(spec.id.clone());
                experiment.graft_agent(path.clone(), spec, Store::new(), start)?;
                tracing::debug!(path = %path, "agent added");
                consumed.push(path);
                report.additions += 1;
            }
        }
        consumed.push(target);
    }
    Ok(())
}

/// Replace the mother subtree with two daughters; returns the daughter paths
fn divide(experiment: &mut Experiment, node: &Path, division: Division, start: Time) -> Result<Vec<Path>> {
    let Division { mother, daughters } = division;
    let mother_path = node.child(mother);
    if daughters.len() != 2 {
        return Err(EngineError::StructuralConflict {
            path: mother_path,
            reason: format!("division needs two daughters, got {}", daughters.len()),
        });
    }

    let (left, right) = experiment.store.divide_subtree(&mother_path)?;
    experiment.store.delete_subtree(&mother_path)?;
    let removed = experiment.agents.remove_under(&mother_path);

    let mut paths = Vec::with_capacity(2);
    for (spec, subtree) in daughters.into_iter().zip([left, right]) {
        let path = node.child(spec.id.clone());
        experiment.graft_agent(path.clone(), spec, subtree, start)?;
        paths.push(path);
    }
    tracing::debug!(
        mother = %mother_path,
        retired = removed.len(),
        daughters = ?paths.iter().map(Path::to_string).collect::<Vec<_>>(),
        "division applied"
    );
    Ok(paths)
}

fn delete(experiment: &mut Experiment, path: &Path) -> Result<()> {
    experiment.store.delete_subtree(path)?;
    let removed = experiment.agents.remove_under(path);
    tracing::debug!(path = %path, retired = removed.len(), "subtree deleted");
    Ok(())
}
