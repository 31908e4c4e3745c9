//! Layers: data-source bookkeeping, mappings and renderers
//!
//! Declaring data on a layer only records intent (pending hints). Render nodes
//! are touched exclusively by the reconciliation pass driven from the scene.

use ahash::AHashSet;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use vz_render::Canvas;

use crate::change::ChangeSet;
use crate::data::{truthy, DataSource, Datum, Hints, IdFn, IdSpec, IdState};
use crate::error::{Result, VizError};
use crate::event::Handler;
use crate::list::NodeList;
use crate::mapping::Mapping;
use crate::node::{NodeId, NodeStore, RenderNode};

/// Layer identifier, unique within a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u32);

impl LayerId {
    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn from_raw(raw: u32) -> Self {
        LayerId(raw)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Structural role of a layer in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerKind {
    /// Holds child layers and fans change sets out to them
    Plot { children: Vec<LayerId> },
    /// Draws its nodes
    Leaf,
}

/// Context handed to a renderer for one layer pass
pub struct RenderContext<'a> {
    pub layer: &'a Layer,
    pub nodes: &'a mut NodeStore,
    pub canvas: &'a mut dyn Canvas,
}

impl RenderContext<'_> {
    /// Mapped value of `property` for a node, or `default`
    pub fn value_for(&self, property: &str, node: NodeId, default: Value) -> Value {
        match self.nodes.get(node) {
            Some(n) => self.layer.value_for(property, n.data(), default, n.index()),
            None => default,
        }
    }

    pub fn node(&self, node: NodeId) -> Option<&RenderNode> {
        self.nodes.get(node)
    }

    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut RenderNode> {
        self.nodes.get_mut(node)
    }
}

/// Drawing behaviour attached to a layer
///
/// Leaf layers get their own change set after reconciliation; plot layers get
/// theirs before it is fanned out to their children.
pub trait LayerRenderer: Send {
    fn render(&mut self, cx: &mut RenderContext<'_>, changes: &ChangeSet);
}

/// A node in the layer tree
pub struct Layer {
    id: LayerId,
    name: String,
    parent: Option<LayerId>,
    pub(crate) kind: LayerKind,
    mappings: IndexMap<String, Mapping>,
    source: DataSource,
    identity: IdState,
    hints: Option<Hints>,
    pub(crate) rendered_local: bool,
    pub(crate) list: NodeList,
    revision: u64,
    pub(crate) handlers: IndexMap<String, Handler>,
    pub(crate) renderer: Option<Box<dyn LayerRenderer>>,
    pub(crate) appearing: Vec<NodeId>,
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("hints", &self.hints)
            .field("nodes", &self.list.len())
            .finish()
    }
}

impl Layer {
    pub(crate) fn new(
        id: LayerId,
        name: String,
        parent: Option<LayerId>,
        kind: LayerKind,
        mappings: IndexMap<String, Mapping>,
    ) -> Self {
        Self {
            id,
            name,
            parent,
            kind,
            mappings,
            source: DataSource::Inherit,
            identity: IdState::Unset,
            hints: None,
            rendered_local: false,
            list: NodeList::default(),
            revision: 0,
            handlers: IndexMap::new(),
            renderer: None,
            appearing: Vec::new(),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<LayerId> {
        self.parent
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn children(&self) -> &[LayerId] {
        match &self.kind {
            LayerKind::Plot { children } => children,
            LayerKind::Leaf => &[],
        }
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// Hints recorded since the last pass over this layer
    pub fn hints(&self) -> Option<Hints> {
        self.hints
    }

    /// The layer's node list
    pub fn nodes(&self) -> &NodeList {
        &self.list
    }

    /// Bumped on every data declaration and every pass that changed nodes
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }

    pub(crate) fn take_hints(&mut self) -> Option<Hints> {
        self.hints.take()
    }

    /// Replace the layer's data source
    ///
    /// Conservatively marks both membership and item data as changed.
    pub fn all(&mut self, source: impl Into<DataSource>, id: impl Into<IdSpec>) -> &mut Self {
        let source = source.into();

        match id.into() {
            IdSpec::Keep => {
                if matches!(self.identity, IdState::Unset) {
                    if let Some(guess) = guess_id_fn(&source) {
                        tracing::debug!("Layer {} matching items by their 'id' field", self.id);
                        self.identity = IdState::Set(guess);
                    }
                }
            }
            IdSpec::Clear => self.identity = IdState::Cleared,
            IdSpec::Use(id_fn) => self.identity = IdState::Set(id_fn),
        }

        self.source = source;
        self.hints = Some(Hints {
            delta: true,
            changed: true,
        });
        self.revision += 1;
        self
    }

    /// Same as [`Layer::all`]
    pub fn join(&mut self, source: impl Into<DataSource>, id: impl Into<IdSpec>) -> &mut Self {
        self.all(source, id)
    }

    /// Append items to a locally owned array
    ///
    /// A layer that never owned data simply takes `data` as its items. Fails
    /// for layers deriving data from their parent.
    pub fn add(&mut self, data: Value) -> Result<&mut Self> {
        let items: Vec<Datum> = match data {
            Value::Null => Vec::new(),
            Value::Array(items) => items.into_iter().map(Arc::new).collect(),
            other => vec![Arc::new(other)],
        };

        if let DataSource::Derived(_) = self.source {
            return Err(VizError::DerivedDataSource(self.id));
        }
        if !self.source.is_local() {
            return Ok(self.all(DataSource::Fixed(items), IdSpec::Keep));
        }

        if let DataSource::Fixed(existing) = &mut self.source {
            existing.extend(items);
        }
        let changed = self.hints.map(|h| h.changed).unwrap_or(false);
        self.hints = Some(Hints { delta: true, changed });
        self.revision += 1;
        Ok(self)
    }

    /// Drop the given items from a locally owned array
    pub(crate) fn remove_items(&mut self, doomed: &[Datum]) -> Result<usize> {
        let doomed: AHashSet<usize> = doomed.iter().map(|d| Arc::as_ptr(d) as usize).collect();

        match &mut self.source {
            DataSource::Fixed(items) => {
                let before = items.len();
                items.retain(|item| !doomed.contains(&(Arc::as_ptr(item) as usize)));
                let removed = before - items.len();
                let changed = self.hints.map(|h| h.changed).unwrap_or(false);
                self.hints = Some(Hints { delta: true, changed });
                self.revision += 1;
                Ok(removed)
            }
            DataSource::Derived(_) => Err(VizError::DerivedDataSource(self.id)),
            DataSource::Inherit => Err(VizError::NotLocalArray(self.id)),
        }
    }

    /// Map a visual property, overriding any inherited mapping
    pub fn map(&mut self, property: impl Into<String>, mapping: Mapping) -> &mut Self {
        self.mappings.insert(property.into(), mapping);
        self
    }

    /// Map a visual property from a JSON declaration
    pub fn map_declared(&mut self, property: &str, declaration: &Value) -> Result<&mut Self> {
        let mapping = Mapping::from_declaration(property, declaration)?;
        Ok(self.map(property, mapping))
    }

    pub fn mapping(&self, property: &str) -> Option<&Mapping> {
        self.mappings.get(property)
    }

    pub(crate) fn mappings(&self) -> &IndexMap<String, Mapping> {
        &self.mappings
    }

    /// Mapped value of `property` for an item, or `default` if unmapped
    pub fn value_for(&self, property: &str, item: &Value, default: Value, index: usize) -> Value {
        match self.mappings.get(property) {
            Some(mapping) => mapping.value_for(item, default, index),
            None => default,
        }
    }

    /// Whether an item should be shown; shown unless `visible` maps to falsy
    pub fn shows(&self, item: &Value, index: usize) -> bool {
        self.mappings
            .get("visible")
            .and_then(|m| m.value(item, index))
            .map(|v| truthy(&v))
            .unwrap_or(true)
    }

    /// Attach a renderer
    pub fn set_renderer(&mut self, renderer: impl LayerRenderer + 'static) -> &mut Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// Identity function to use for items evaluated this pass
    pub(crate) fn effective_id_fn(&self, sample: Option<&Datum>) -> Option<IdFn> {
        if let Some(id_fn) = self.identity.id_fn() {
            return Some(id_fn.clone());
        }
        match (&self.source, &self.identity) {
            // derived items are rebuilt on every evaluation, so compare structurally
            (DataSource::Derived(_), IdState::Unset) => {
                Some(if sample.is_some_and(|s| s.get("id").is_some()) {
                    IdFn::Id
                } else {
                    IdFn::Whole
                })
            }
            (DataSource::Derived(_), _) => Some(IdFn::Whole),
            _ => None,
        }
    }

    pub(crate) fn add_child(&mut self, child: LayerId) -> Result<()> {
        match &mut self.kind {
            LayerKind::Plot { children } => {
                children.push(child);
                Ok(())
            }
            LayerKind::Leaf => Err(VizError::NotAPlotLayer(self.id)),
        }
    }
}

fn guess_id_fn(source: &DataSource) -> Option<IdFn> {
    match source {
        DataSource::Fixed(items) => items.first().filter(|i| i.get("id").is_some()).map(|_| IdFn::Id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layer() -> Layer {
        Layer::new(LayerId(0), "test".to_string(), None, LayerKind::Leaf, IndexMap::new())
    }

    #[test]
    fn test_all_sets_hints() {
        let mut layer = layer();
        assert_eq!(layer.hints(), None);
        layer.all(json!([{"id": 1}]), IdSpec::Keep);
        assert_eq!(layer.hints(), Some(Hints { delta: true, changed: true }));
        assert!(layer.source().is_local());
    }

    #[test]
    fn test_id_guess() {
        let mut layer = layer();
        layer.all(json!([{"id": 1}]), IdSpec::Keep);
        assert!(matches!(layer.effective_id_fn(None), Some(IdFn::Id)));

        let mut layer = self::layer();
        layer.all(json!([{"name": "a"}]), IdSpec::Keep);
        assert!(layer.effective_id_fn(None).is_none());
    }

    #[test]
    fn test_id_keep_and_clear() {
        let mut layer = layer();
        layer.all(json!([1]), "key");
        layer.all(json!([2]), IdSpec::Keep);
        assert!(matches!(layer.effective_id_fn(None), Some(IdFn::Field(f)) if f == "key"));

        layer.all(json!([{"id": 3}]), IdSpec::Clear);
        layer.all(json!([{"id": 3}]), IdSpec::Keep);
        assert!(layer.effective_id_fn(None).is_none());
    }

    #[test]
    fn test_add() {
        let mut layer = layer();
        // never given data: behaves as all()
        layer.add(json!([1, 2])).unwrap();
        layer.take_hints();

        layer.add(json!(3)).unwrap();
        assert_eq!(layer.hints(), Some(Hints { delta: true, changed: false }));
        match layer.source() {
            DataSource::Fixed(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_add_to_derived_fails() {
        let mut layer = layer();
        layer.all(DataSource::derived(|v| vec![v.clone()]), IdSpec::Keep);
        assert!(matches!(layer.add(json!(1)), Err(VizError::DerivedDataSource(_))));
    }

    #[test]
    fn test_remove_items() {
        let mut layer = layer();
        layer.all(json!([1, 2, 3]), IdSpec::Keep);
        let doomed = match layer.source() {
            DataSource::Fixed(items) => vec![Arc::clone(&items[1])],
            _ => unreachable!(),
        };
        assert_eq!(layer.remove_items(&doomed).unwrap(), 1);

        let mut inherit = self::layer();
        assert!(matches!(inherit.remove_items(&doomed), Err(VizError::NotLocalArray(_))));
    }

    #[test]
    fn test_visibility_mapping() {
        let mut layer = layer();
        assert!(layer.shows(&json!({}), 0));
        layer.map("visible", Mapping::field("on"));
        assert!(layer.shows(&json!({"on": true}), 0));
        assert!(!layer.shows(&json!({"on": false}), 0));
        // unmapped field falls back to shown
        assert!(layer.shows(&json!({}), 0));
    }
}
