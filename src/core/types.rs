//! Core type definitions used throughout the codebase

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::{EngineError, Result};

/// Simulation time (arbitrary units, usually seconds)
pub type Time = f64;

/// Tolerance used when comparing simulation times
pub const TIME_EPSILON: f64 = 1e-9;

/// Segment that climbs one level up when a path is normalized
pub const PARENT_SEGMENT: &str = "..";

/// Stable identifier of an agent record in the experiment arena
///
/// Keys are handed out monotonically and never reused, so a key held by a
/// pending structural command can never alias a newer agent.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[display(fmt = "agent#{}", _0)]
pub struct AgentKey(pub u64);

/// A location in the state tree: a sequence of child names
///
/// Topology paths may be relative and contain `..`; `normalize` resolves
/// them against the root. Paths render and parse as `/`-joined strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Path(Vec<String>);

impl Path {
    /// The empty path, addressing the store root
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse a `/`-separated path; empty and `.` segments are dropped
    pub fn parse(text: &str) -> Self {
        Self(
            text.split('/')
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != ".")
                .map(String::from)
                .collect(),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn child(&self, name: impl Into<String>) -> Path {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// Concatenate without normalizing
    pub fn join(&self, other: &Path) -> Path {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Resolve every `..` segment
    ///
    /// Fails with `PathEscapesRoot` when a `..` would climb above the root.
    pub fn normalize(&self) -> Result<Path> {
        let mut resolved: Vec<String> = Vec::with_capacity(self.0.len());
        for segment in &self.0 {
            if segment == PARENT_SEGMENT {
                if resolved.pop().is_none() {
                    return Err(EngineError::PathEscapesRoot { path: self.clone() });
                }
            } else {
                resolved.push(segment.clone());
            }
        }
        Ok(Self(resolved))
    }

    /// Resolve `relative` against `base` and normalize the result
    pub fn resolve(base: &Path, relative: &Path) -> Result<Path> {
        base.join(relative).normalize()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.0.join("/"))
        }
    }
}

impl From<String> for Path {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

impl From<&str> for Path {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.0.join("/")
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Path {
    fn from(segments: [S; N]) -> Self {
        Self::new(segments)
    }
}

impl From<Vec<String>> for Path {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}
