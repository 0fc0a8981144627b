//! The hierarchical state tree
//!
//! A `Store` is either a leaf holding a value and its schema, or an interior
//! node holding named children. The experiment owns the single root store;
//! everything else refers to regions of it by `Path`.

use std::collections::BTreeMap;

use crate::core::error::{EngineError, Result};
use crate::core::types::Path;
use crate::state::schema::{Schema, SchemaTree, Updater};
use crate::state::update::{LeafWrite, LocatedCommand, Update};
use crate::state::value::Value;

#[derive(Debug, Clone)]
pub enum Store {
    Leaf {
        value: Value,
        schema: Schema,
    },
    Node {
        children: BTreeMap<String, Store>,
        /// Schema for children created without an explicit declaration
        each: Option<Schema>,
    },
}

impl Default for Store {
    fn default() -> Self {
        Store::new()
    }
}

impl Store {
    /// An empty interior node
    pub fn new() -> Self {
        Store::Node { children: BTreeMap::new(), each: None }
    }

    /// A leaf initialised to its schema default
    pub fn leaf(schema: Schema) -> Self {
        Store::Leaf { value: schema.default_value().clone(), schema }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Store::Leaf { .. })
    }

    pub fn children(&self) -> Option<&BTreeMap<String, Store>> {
        match self {
            Store::Node { children, .. } => Some(children),
            Store::Leaf { .. } => None,
        }
    }

    pub fn schema(&self) -> Option<&Schema> {
        match self {
            Store::Leaf { schema, .. } => Some(schema),
            Store::Node { .. } => None,
        }
    }

    pub fn get(&self, path: &Path) -> Result<&Store> {
        let mut node = self;
        for segment in path.segments() {
            node = match node {
                Store::Node { children, .. } => children.get(segment),
                Store::Leaf { .. } => None,
            }
            .ok_or_else(|| EngineError::PathNotFound { path: path.clone() })?;
        }
        Ok(node)
    }

    pub fn get_mut(&mut self, path: &Path) -> Result<&mut Store> {
        let mut node = self;
        for segment in path.segments() {
            node = match node {
                Store::Node { children, .. } => children.get_mut(segment),
                Store::Leaf { .. } => None,
            }
            .ok_or_else(|| EngineError::PathNotFound { path: path.clone() })?;
        }
        Ok(node)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.get(path).is_ok()
    }

    /// Plain value view of the subtree at `path`
    pub fn value(&self, path: &Path) -> Result<Value> {
        Ok(self.get(path)?.to_value())
    }

    pub fn to_value(&self) -> Value {
        match self {
            Store::Leaf { value, .. } => value.clone(),
            Store::Node { children, .. } => {
                Value::Map(children.iter().map(|(k, c)| (k.clone(), c.to_value())).collect())
            }
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            Store::Leaf { .. } => 1,
            Store::Node { children, .. } => children.values().map(Store::leaf_count).sum(),
        }
    }

    /// Interior node at `path`, creating missing nodes on the way
    fn node_mut_or_create(&mut self, path: &Path) -> Result<&mut Store> {
        let mut node = self;
        for (depth, segment) in path.segments().iter().enumerate() {
            node = match node {
                Store::Node { children, .. } => children.entry(segment.clone()).or_insert_with(Store::new),
                Store::Leaf { .. } => {
                    return Err(EngineError::UpdateShape {
                        path: Path::new(path.segments()[..depth].iter().cloned()),
                        reason: "expected an interior node, found a leaf".to_string(),
                    })
                }
            };
        }
        if node.is_leaf() {
            return Err(EngineError::UpdateShape {
                path: path.clone(),
                reason: "expected an interior node, found a leaf".to_string(),
            });
        }
        Ok(node)
    }

    /// Split `path` into (parent node, child key), creating the parent
    fn parent_and_key<'a>(&'a mut self, path: &Path) -> Result<(&'a mut BTreeMap<String, Store>, Option<&'a Schema>, String)> {
        let key = path
            .last()
            .ok_or_else(|| EngineError::UpdateShape {
                path: path.clone(),
                reason: "the root cannot be a leaf".to_string(),
            })?
            .to_string();
        let parent = path.parent().unwrap_or_default();
        match self.node_mut_or_create(&parent)? {
            Store::Node { children, each } => Ok((children, each.as_ref(), key)),
            Store::Leaf { .. } => Err(EngineError::PathNotFound { path: parent }),
        }
    }

    /// Register a declared schema tree at `path`, merging with what exists
    pub fn declare(&mut self, path: &Path, tree: &SchemaTree) -> Result<()> {
        match tree {
            SchemaTree::Leaf(schema) => {
                let (children, _, key) = self.parent_and_key(path)?;
                match children.get_mut(&key) {
                    None => {
                        children.insert(key, Store::leaf(schema.clone()));
                    }
                    Some(Store::Leaf { value, schema: existing }) => {
                        let had_default = existing.default.is_some();
                        existing.merge(schema, path)?;
                        if !had_default && value.is_null() {
                            *value = existing.default_value().clone();
                        }
                    }
                    Some(Store::Node { .. }) => {
                        return Err(EngineError::SchemaConflict {
                            path: path.clone(),
                            field: "shape",
                            existing: "node".to_string(),
                            incoming: "leaf".to_string(),
                        })
                    }
                }
            }
            SchemaTree::Node(declared) => {
                self.node_mut_or_create(path).map_err(|_| EngineError::SchemaConflict {
                    path: path.clone(),
                    field: "shape",
                    existing: "leaf".to_string(),
                    incoming: "node".to_string(),
                })?;
                for (key, child) in declared {
                    self.declare(&path.child(key.clone()), child)?;
                }
            }
            SchemaTree::Each(schema) => {
                let node = self.node_mut_or_create(path)?;
                if let Store::Node { children, each } = node {
                    match each {
                        Some(existing) => existing.merge(schema, path)?,
                        None => *each = Some(schema.clone()),
                    }
                    for (key, child) in children.iter_mut() {
                        if let Store::Leaf { schema: existing, .. } = child {
                            existing.merge(schema, &path.child(key.clone()))?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Overwrite a leaf value, bypassing its updater
    pub fn set_value(&mut self, path: &Path, new_value: Value) -> Result<()> {
        let (children, each, key) = self.parent_and_key(path)?;
        let schema = each.cloned().unwrap_or_default();
        match children.entry(key).or_insert_with(|| Store::leaf(schema)) {
            Store::Leaf { value, .. } => {
                *value = new_value;
                Ok(())
            }
            Store::Node { .. } => Err(EngineError::UpdateShape {
                path: path.clone(),
                reason: "cannot overwrite an interior node with a value".to_string(),
            }),
        }
    }

    /// Load a nested initial state: maps recurse into nodes, anything else
    /// overwrites a leaf
    pub fn set_state(&mut self, path: &Path, state: &Value) -> Result<()> {
        let target_is_leaf = self.get(path).map(Store::is_leaf).unwrap_or(false);
        match state {
            Value::Map(entries) if !target_is_leaf => {
                self.node_mut_or_create(path)?;
                for (key, child) in entries {
                    self.set_state(&path.child(key.clone()), child)?;
                }
                Ok(())
            }
            other => self.set_value(path, other.clone()),
        }
    }

    /// Whether a write would replace the leaf value
    pub fn writes_as_set(&self, write: &LeafWrite) -> bool {
        if let Some(updater) = &write.updater {
            return updater.is_set();
        }
        match self.get(&write.path) {
            Ok(Store::Leaf { schema, .. }) => schema.updater().is_set(),
            _ => write
                .path
                .parent()
                .and_then(|parent| match self.get(&parent) {
                    Ok(Store::Node { each: Some(schema), .. }) => Some(schema.updater().is_set()),
                    _ => None,
                })
                .unwrap_or(false),
        }
    }

    /// Combine one flattened write into its leaf
    pub fn apply_leaf(&mut self, write: &LeafWrite) -> Result<()> {
        let (children, each, key) = self.parent_and_key(&write.path)?;
        let schema = each.cloned().unwrap_or_default();
        match children.entry(key).or_insert_with(|| Store::leaf(schema)) {
            Store::Leaf { value, schema } => {
                let updater: &Updater = write.updater.as_ref().unwrap_or_else(|| schema.updater());
                *value = updater.apply(value, &write.value).map_err(|reason| EngineError::InvalidValue {
                    path: write.path.clone(),
                    reason,
                })?;
                Ok(())
            }
            Store::Node { .. } => Err(EngineError::UpdateShape {
                path: write.path.clone(),
                reason: "a value update cannot target an interior node".to_string(),
            }),
        }
    }

    /// Apply an update rooted at `path`
    ///
    /// Leaf values combine through their updaters and missing keys become new
    /// leaves. Structural commands are not executed; they are returned with
    /// their absolute location for the caller to schedule.
    pub fn apply_update(&mut self, path: &Path, update: Update) -> Result<Vec<LocatedCommand>> {
        let mut writes = Vec::new();
        let mut commands = Vec::new();
        update.flatten(path, &mut writes, &mut commands);
        for write in &writes {
            self.apply_leaf(write)?;
        }
        Ok(commands)
    }

    /// Flattened `path -> value` map of every emitted leaf
    pub fn emit_view(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        self.collect_emitted(&Path::root(), &mut out);
        out
    }

    fn collect_emitted(&self, at: &Path, out: &mut BTreeMap<String, Value>) {
        match self {
            Store::Leaf { value, schema } => {
                if schema.emits() {
                    out.insert(at.to_string(), value.clone());
                }
            }
            Store::Node { children, .. } => {
                for (key, child) in children {
                    child.collect_emitted(&at.child(key.clone()), out);
                }
            }
        }
    }

    /// Nested view of emitted leaves; `None` when nothing below emits
    pub fn emit_tree(&self) -> Option<Value> {
        match self {
            Store::Leaf { value, schema } => schema.emits().then(|| value.clone()),
            Store::Node { children, .. } => {
                let emitted: BTreeMap<String, Value> = children
                    .iter()
                    .filter_map(|(k, c)| c.emit_tree().map(|v| (k.clone(), v)))
                    .collect();
                (!emitted.is_empty()).then_some(Value::Map(emitted))
            }
        }
    }

    /// Two independent copies of the subtree at `path`, leaves divided
    pub fn divide_subtree(&self, path: &Path) -> Result<(Store, Store)> {
        self.get(path)?.divide(path)
    }

    fn divide(&self, at: &Path) -> Result<(Store, Store)> {
        match self {
            Store::Leaf { value, schema } => {
                let (left, right) = schema.divider().divide(at, value, schema.default_value())?;
                Ok((
                    Store::Leaf { value: left, schema: schema.clone() },
                    Store::Leaf { value: right, schema: schema.clone() },
                ))
            }
            Store::Node { children, each } => {
                let mut left = BTreeMap::new();
                let mut right = BTreeMap::new();
                for (key, child) in children {
                    let (l, r) = child.divide(&at.child(key.clone()))?;
                    left.insert(key.clone(), l);
                    right.insert(key.clone(), r);
                }
                Ok((
                    Store::Node { children: left, each: each.clone() },
                    Store::Node { children: right, each: each.clone() },
                ))
            }
        }
    }

    /// Unlink and return the subtree at `path`
    pub fn delete_subtree(&mut self, path: &Path) -> Result<Store> {
        let key = path.last().ok_or_else(|| EngineError::StructuralConflict {
            path: path.clone(),
            reason: "the root cannot be deleted".to_string(),
        })?;
        let parent = path.parent().unwrap_or_default();
        match self.get_mut(&parent)? {
            Store::Node { children, .. } => {
                children.remove(key).ok_or_else(|| EngineError::PathNotFound { path: path.clone() })
            }
            Store::Leaf { .. } => Err(EngineError::PathNotFound { path: path.clone() }),
        }
    }

    /// Graft a subtree at `path`; the key must be free
    pub fn insert_subtree(&mut self, path: &Path, subtree: Store) -> Result<()> {
        let (children, _, key) = self.parent_and_key(path)?;
        if children.contains_key(&key) {
            return Err(EngineError::StructuralConflict {
                path: path.clone(),
                reason: "a subtree already exists here".to_string(),
            });
        }
        children.insert(key, subtree);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::schema::Divider;

    fn volume_schema() -> Schema {
        Schema::new()
            .with_default(1.0)
            .with_updater(Updater::Accumulate)
            .with_divider(Divider::Split)
            .with_emit(true)
    }

    fn cell_store() -> Store {
        let mut store = Store::new();
        let tree = SchemaTree::node()
            .with("volume", volume_schema())
            .with("divide", Schema::new().with_default(false).with_updater(Updater::Set).with_divider(Divider::Zero));
        store.declare(&Path::from(["agents", "0", "global"]), &tree).unwrap();
        store
    }

    #[test]
    fn test_declare_creates_defaults() {
        let store = cell_store();
        let path = Path::from(["agents", "0", "global", "volume"]);
        assert_eq!(store.value(&path).unwrap(), Value::Float(1.0));
        assert_eq!(store.leaf_count(), 2);
    }

    #[test]
    fn test_get_missing_path() {
        let store = cell_store();
        let err = store.get(&Path::from(["agents", "1"])).unwrap_err();
        assert!(matches!(err, EngineError::PathNotFound { .. }));
        // walking through a leaf is also a missing path
        assert!(store.get(&Path::from(["agents", "0", "global", "volume", "x"])).is_err());
    }

    #[test]
    fn test_declare_conflict() {
        let mut store = cell_store();
        let conflicting = SchemaTree::node().with("volume", Schema::new().with_updater(Updater::Set));
        let err = store.declare(&Path::from(["agents", "0", "global"]), &conflicting).unwrap_err();
        assert!(matches!(err, EngineError::SchemaConflict { field: "updater", .. }));
    }

    #[test]
    fn test_late_default_fills_null_value() {
        let mut store = Store::new();
        let path = Path::from(["x"]);
        store.declare(&path, &SchemaTree::Leaf(Schema::new().with_emit(true))).unwrap();
        assert!(store.value(&path).unwrap().is_null());
        store.declare(&path, &SchemaTree::Leaf(Schema::new().with_default(3))).unwrap();
        assert_eq!(store.value(&path).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_apply_update_uses_updaters() {
        let mut store = cell_store();
        let base = Path::from(["agents", "0"]);
        let update = Update::empty().with(
            "global",
            Update::empty().with("volume", 0.5).with("divide", true),
        );
        let commands = store.apply_update(&base, update).unwrap();
        assert!(commands.is_empty());
        assert_eq!(store.value(&base.join(&Path::parse("global/volume"))).unwrap(), Value::Float(1.5));
        assert_eq!(store.value(&base.join(&Path::parse("global/divide"))).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_apply_update_creates_new_leaves() {
        let mut store = Store::new();
        store.declare(&Path::from(["fields"]), &SchemaTree::Each(Schema::new().with_updater(Updater::Set))).unwrap();
        store.apply_update(&Path::root(), Update::at(["fields", "glucose"], 2.0)).unwrap();
        store.apply_update(&Path::root(), Update::at(["fields", "glucose"], 5.0)).unwrap();
        // inherited `set` updater replaces instead of summing
        assert_eq!(store.value(&Path::parse("fields/glucose")).unwrap(), Value::Float(5.0));

        store.apply_update(&Path::root(), Update::at(["misc", "count"], 2)).unwrap();
        store.apply_update(&Path::root(), Update::at(["misc", "count"], 3)).unwrap();
        assert_eq!(store.value(&Path::parse("misc/count")).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_apply_update_shape_mismatch() {
        let mut store = cell_store();
        let err = store
            .apply_update(&Path::from(["agents", "0"]), Update::at(["global"], 1.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::UpdateShape { .. }));

        let err = store
            .apply_update(&Path::root(), Update::at(["agents", "0", "global", "volume", "deep"], 1.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::UpdateShape { .. }));
    }

    #[test]
    fn test_emit_view_filters_at_any_depth() {
        let mut store = cell_store();
        store
            .declare(
                &Path::from(["environment", "fields", "deep"]),
                &SchemaTree::node().with("glucose", Schema::new().with_default(10.0).with_emit(true)),
            )
            .unwrap();
        let view = store.emit_view();
        let keys: Vec<&str> = view.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["agents/0/global/volume", "environment/fields/deep/glucose"]);

        let tree = store.emit_tree().unwrap();
        assert_eq!(tree.get_in(&["agents", "0", "global", "volume"]), Some(&Value::Float(1.0)));
        assert_eq!(tree.get_in(&["agents", "0", "global", "divide"]), None);
    }

    #[test]
    fn test_divide_subtree() {
        let mut store = cell_store();
        store.set_value(&Path::parse("agents/0/global/volume"), Value::Float(2.4)).unwrap();
        store.set_value(&Path::parse("agents/0/global/divide"), Value::Bool(true)).unwrap();
        let (left, right) = store.divide_subtree(&Path::from(["agents", "0"])).unwrap();
        let volume = Path::parse("global/volume");
        let divide = Path::parse("global/divide");
        assert_eq!(left.value(&volume).unwrap(), Value::Float(1.2));
        assert_eq!(right.value(&volume).unwrap(), Value::Float(1.2));
        assert_eq!(left.value(&divide).unwrap(), Value::Bool(false));
        // the mother is untouched until the caller removes it
        assert!(store.contains(&Path::from(["agents", "0"])));
    }

    #[test]
    fn test_delete_and_insert_subtree() {
        let mut store = cell_store();
        let removed = store.delete_subtree(&Path::from(["agents", "0"])).unwrap();
        assert_eq!(removed.leaf_count(), 2);
        assert!(!store.contains(&Path::from(["agents", "0"])));
        assert!(store.delete_subtree(&Path::from(["agents", "0"])).is_err());

        store.insert_subtree(&Path::from(["agents", "1"]), removed.clone()).unwrap();
        let err = store.insert_subtree(&Path::from(["agents", "1"]), removed).unwrap_err();
        assert!(matches!(err, EngineError::StructuralConflict { .. }));
    }

    #[test]
    fn test_set_state_merges_nested_values() {
        let mut store = cell_store();
        let state = Value::map([(
            "agents",
            Value::map([("0", Value::map([("global", Value::map([("volume", 1.7)])), ("extra", Value::from("tag"))]))]),
        )]);
        store.set_state(&Path::root(), &state).unwrap();
        assert_eq!(store.value(&Path::parse("agents/0/global/volume")).unwrap(), Value::Float(1.7));
        assert_eq!(store.value(&Path::parse("agents/0/extra")).unwrap(), Value::from("tag"));
        // declared siblings keep their defaults
        assert_eq!(store.value(&Path::parse("agents/0/global/divide")).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_writes_as_set() {
        let store = cell_store();
        let divide = LeafWrite { path: Path::parse("agents/0/global/divide"), value: Value::Bool(true), updater: None };
        let volume = LeafWrite { path: Path::parse("agents/0/global/volume"), value: Value::Float(1.0), updater: None };
        let forced = LeafWrite { updater: Some(Updater::Set), ..volume.clone() };
        assert!(store.writes_as_set(&divide));
        assert!(!store.writes_as_set(&volume));
        assert!(store.writes_as_set(&forced));
    }
}
