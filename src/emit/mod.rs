//! Observation sinks
//!
//! The experiment hands each emit-boundary snapshot to an `Emitter`. Only
//! leaves declared with `emit = true` appear in a snapshot.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path as FsPath;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::core::error::Result;
use crate::core::types::Time;
use crate::state::value::Value;

/// Emitted leaves at one point in time, keyed by `/`-joined path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub run_id: Uuid,
    pub time: Time,
    pub data: BTreeMap<String, Value>,
}

impl Snapshot {
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.data.get(path)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

pub trait Emitter: Send {
    fn emit(&mut self, snapshot: &Snapshot) -> Result<()>;

    /// Flush anything buffered; called once when the run ends or fails
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullEmitter;

impl Emitter for NullEmitter {
    fn emit(&mut self, _snapshot: &Snapshot) -> Result<()> {
        Ok(())
    }
}

/// In-memory timeseries
///
/// Clones share the same buffer, so a caller can keep one handle while the
/// experiment owns another.
#[derive(Debug, Clone, Default)]
pub struct Timeseries {
    snapshots: Arc<Mutex<Vec<Snapshot>>>,
    finalized: Arc<AtomicBool>,
}

impl Timeseries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn times(&self) -> Vec<Time> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.time)
            .collect()
    }

    /// Values of one path across snapshots, skipping snapshots without it
    pub fn series(&self, path: &str) -> Vec<Value> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|s| s.get(path).cloned())
            .collect()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }
}

impl Emitter for Timeseries {
    fn emit(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snapshot.clone());
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.finalized.store(true, Ordering::Release);
        Ok(())
    }
}

/// One JSON object per snapshot, one snapshot per line
pub struct JsonLinesEmitter<W: Write + Send> {
    writer: W,
    lines: usize,
}

impl JsonLinesEmitter<BufWriter<File>> {
    pub fn create(path: impl AsRef<FsPath>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> JsonLinesEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Emitter for JsonLinesEmitter<W> {
    fn emit(&mut self, snapshot: &Snapshot) -> Result<()> {
        serde_json::to_writer(&mut self.writer, snapshot)?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.writer.flush()?;
        tracing::debug!(lines = self.lines, "json lines emitter flushed");
        Ok(())
    }
}
