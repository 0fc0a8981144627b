//! Per-leaf schema: default, updater, divider, emit flag
//!
//! Updaters and dividers are closed enums. Names are parsed once, when a
//! process or a config file declares them, and every tick dispatches on the
//! enum directly.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::error::{EngineError, Result};
use crate::core::types::Path;
use crate::state::value::Value;

pub type UpdateFn = Arc<dyn Fn(&Value, &Value) -> std::result::Result<Value, String> + Send + Sync>;
pub type DivideFn = Arc<dyn Fn(&Value) -> std::result::Result<(Value, Value), String> + Send + Sync>;

static DEFAULT_UPDATER: Updater = Updater::Accumulate;
static DEFAULT_DIVIDER: Divider = Divider::Set;
static NULL_VALUE: Value = Value::Null;

/// How an incoming update combines with the current leaf value
#[derive(Clone)]
pub enum Updater {
    /// Sum (numbers) or concatenation (lists)
    Accumulate,
    /// Replace
    Set,
    /// Map union, incoming keys win
    Merge,
    Custom { name: String, func: UpdateFn },
}

impl Updater {
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value, &Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Updater::Custom { name: name.into(), func: Arc::new(func) }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "accumulate" => Ok(Updater::Accumulate),
            "set" => Ok(Updater::Set),
            "merge" => Ok(Updater::Merge),
            other => Err(EngineError::UnknownUpdater(other.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Updater::Accumulate => "accumulate",
            Updater::Set => "set",
            Updater::Merge => "merge",
            Updater::Custom { name, .. } => name,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Updater::Set)
    }

    pub fn apply(&self, current: &Value, update: &Value) -> std::result::Result<Value, String> {
        match self {
            Updater::Accumulate => current.add(update),
            Updater::Set => Ok(update.clone()),
            Updater::Merge => current.merge(update),
            Updater::Custom { func, .. } => func(current, update),
        }
    }
}

impl PartialEq for Updater {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl fmt::Debug for Updater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Updater({})", self.name())
    }
}

/// How a leaf value is shared between two daughters
#[derive(Clone)]
pub enum Divider {
    /// Each daughter gets `value / 2`
    Split,
    /// Integer halves, remainder unit to the first daughter
    SplitDiscrete,
    /// Both daughters get a copy
    Set,
    /// Both daughters get the schema default
    Zero,
    /// Dividing this leaf is a configuration error
    NoDivide,
    Custom { name: String, func: DivideFn },
}

impl Divider {
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<(Value, Value), String> + Send + Sync + 'static,
    {
        Divider::Custom { name: name.into(), func: Arc::new(func) }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "split" => Ok(Divider::Split),
            "split_discrete" => Ok(Divider::SplitDiscrete),
            "set" => Ok(Divider::Set),
            "zero" => Ok(Divider::Zero),
            "no_divide" => Ok(Divider::NoDivide),
            other => Err(EngineError::UnknownDivider(other.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Divider::Split => "split",
            Divider::SplitDiscrete => "split_discrete",
            Divider::Set => "set",
            Divider::Zero => "zero",
            Divider::NoDivide => "no_divide",
            Divider::Custom { name, .. } => name,
        }
    }

    pub fn divide(&self, path: &Path, value: &Value, default: &Value) -> Result<(Value, Value)> {
        let invalid = |reason: String| EngineError::InvalidValue { path: path.clone(), reason };
        match self {
            Divider::Split => value.halve().map_err(invalid),
            Divider::SplitDiscrete => value.split_discrete().map_err(invalid),
            Divider::Set => Ok((value.clone(), value.clone())),
            Divider::Zero => Ok((default.clone(), default.clone())),
            Divider::NoDivide => Err(EngineError::NoDivide { path: path.clone() }),
            Divider::Custom { func, .. } => func(value).map_err(invalid),
        }
    }
}

impl PartialEq for Divider {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl fmt::Debug for Divider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Divider({})", self.name())
    }
}

/// Declared metadata for one leaf
///
/// Every field is optional so that several processes can each declare the
/// part they care about. Unset fields fall back to `Null`, `Accumulate`,
/// `Set` and no emission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub default: Option<Value>,
    pub updater: Option<Updater>,
    pub divider: Option<Divider>,
    pub emit: Option<bool>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_updater(mut self, updater: Updater) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn with_divider(mut self, divider: Divider) -> Self {
        self.divider = Some(divider);
        self
    }

    pub fn with_emit(mut self, emit: bool) -> Self {
        self.emit = Some(emit);
        self
    }

    pub fn default_value(&self) -> &Value {
        self.default.as_ref().unwrap_or(&NULL_VALUE)
    }

    pub fn updater(&self) -> &Updater {
        self.updater.as_ref().unwrap_or(&DEFAULT_UPDATER)
    }

    pub fn divider(&self) -> &Divider {
        self.divider.as_ref().unwrap_or(&DEFAULT_DIVIDER)
    }

    pub fn emits(&self) -> bool {
        self.emit.unwrap_or(false)
    }

    /// Extend this declaration with another one for the same leaf
    ///
    /// Unset fields are filled in; two different explicit values for the
    /// same field are a `SchemaConflict`.
    pub fn merge(&mut self, other: &Schema, path: &Path) -> Result<()> {
        merge_field(&mut self.default, &other.default, path, "default", |v| v.to_string())?;
        merge_field(&mut self.updater, &other.updater, path, "updater", |u| u.name().to_string())?;
        merge_field(&mut self.divider, &other.divider, path, "divider", |d| d.name().to_string())?;
        merge_field(&mut self.emit, &other.emit, path, "emit", |e| e.to_string())?;
        Ok(())
    }
}

fn merge_field<T: Clone + PartialEq>(
    current: &mut Option<T>,
    incoming: &Option<T>,
    path: &Path,
    field: &'static str,
    show: impl Fn(&T) -> String,
) -> Result<()> {
    match (current.as_ref(), incoming) {
        (_, None) => Ok(()),
        (None, Some(value)) => {
            *current = Some(value.clone());
            Ok(())
        }
        (Some(existing), Some(value)) if existing == value => Ok(()),
        (Some(existing), Some(value)) => Err(EngineError::SchemaConflict {
            path: path.clone(),
            field,
            existing: show(existing),
            incoming: show(value),
        }),
    }
}

/// Declared shape of one port
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaTree {
    Leaf(Schema),
    Node(BTreeMap<String, SchemaTree>),
    /// Every child of this node, present or future, is a leaf with this schema
    Each(Schema),
}

impl SchemaTree {
    /// An interior node with no declared children
    pub fn node() -> Self {
        SchemaTree::Node(BTreeMap::new())
    }

    /// Add a child to a node; on a leaf or glob this turns it into a node
    pub fn with(self, key: impl Into<String>, child: impl Into<SchemaTree>) -> Self {
        let mut children = match self {
            SchemaTree::Node(children) => children,
            _ => BTreeMap::new(),
        };
        children.insert(key.into(), child.into());
        SchemaTree::Node(children)
    }
}

impl From<Schema> for SchemaTree {
    fn from(schema: Schema) -> Self {
        SchemaTree::Leaf(schema)
    }
}

/// Port name -> declared shape
pub type PortsSchema = BTreeMap<String, SchemaTree>;
