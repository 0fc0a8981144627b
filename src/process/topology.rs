//! Port wiring: process port name -> path in the shared tree

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::error::{EngineError, Result};
use crate::core::types::Path;
use crate::state::schema::PortsSchema;

/// Port map for one process instance
///
/// Paths are relative to the point where the owning composite is grafted
/// and may climb with `..`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topology(BTreeMap<String, Path>);

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, port: impl Into<String>, path: impl Into<Path>) -> Self {
        self.0.insert(port.into(), path.into());
        self
    }

    pub fn insert(&mut self, port: impl Into<String>, path: impl Into<Path>) {
        self.0.insert(port.into(), path.into());
    }

    pub fn get(&self, port: &str) -> Option<&Path> {
        self.0.get(port)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Path)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Prepend `prefix` to every path, for nesting a sub-composite
    pub fn prefixed(&self, prefix: &Path) -> Topology {
        Topology(self.0.iter().map(|(port, path)| (port.clone(), prefix.join(path))).collect())
    }

    /// Absolute port paths for a process grafted at `root`
    ///
    /// Every declared port needs an entry; wiring a port the process does not
    /// declare is also rejected.
    pub fn resolve(&self, process: &str, ports: &PortsSchema, root: &Path) -> Result<BTreeMap<String, Path>> {
        for port in self.0.keys() {
            if !ports.contains_key(port) {
                return Err(EngineError::UnknownPort { process: process.to_string(), port: port.clone() });
            }
        }
        ports
            .keys()
            .map(|port| {
                let relative = self.0.get(port).ok_or_else(|| EngineError::MissingTopology {
                    process: process.to_string(),
                    port: port.clone(),
                })?;
                Ok((port.clone(), Path::resolve(root, relative)?))
            })
            .collect()
    }
}

impl<P: Into<String>, Q: Into<Path>> FromIterator<(P, Q)> for Topology {
    fn from_iter<I: IntoIterator<Item = (P, Q)>>(iter: I) -> Self {
        Topology(iter.into_iter().map(|(port, path)| (port.into(), path.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::schema::{Schema, SchemaTree};

    fn ports() -> PortsSchema {
        PortsSchema::from([
            ("global".to_string(), SchemaTree::node().with("volume", Schema::new())),
            ("agents".to_string(), SchemaTree::node()),
        ])
    }

    #[test]
    fn test_resolve_relative_paths() {
        let topology = Topology::new().with("global", "global").with("agents", "..");
        let resolved = topology.resolve("division", &ports(), &Path::from(["agents", "7"])).unwrap();
        assert_eq!(resolved["global"], Path::from(["agents", "7", "global"]));
        assert_eq!(resolved["agents"], Path::from(["agents"]));
    }

    #[test]
    fn test_missing_port_is_error() {
        let topology = Topology::new().with("global", "global");
        let err = topology.resolve("division", &ports(), &Path::root()).unwrap_err();
        assert!(matches!(err, EngineError::MissingTopology { ref port, .. } if port == "agents"));
    }

    #[test]
    fn test_extra_port_is_error() {
        let topology = Topology::new().with("global", "global").with("agents", "..").with("bogus", "x");
        let err = topology.resolve("division", &ports(), &Path::from(["agents", "0"])).unwrap_err();
        assert!(matches!(err, EngineError::UnknownPort { .. }));
    }

    #[test]
    fn test_prefixed() {
        let topology = Topology::new().with("internal", "cytoplasm");
        let nested = topology.prefixed(&Path::from(["organelle"]));
        assert_eq!(nested.get("internal"), Some(&Path::from(["organelle", "cytoplasm"])));
    }

    #[test]
    fn test_deserialize_from_strings() {
        let topology: Topology = serde_json::from_str(r#"{"agents": "..", "global": "global"}"#).unwrap();
        assert_eq!(topology.get("agents"), Some(&Path::from([".."])));
    }
}
