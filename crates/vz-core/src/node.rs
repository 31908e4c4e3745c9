//! Render nodes and the arena that owns them

use ahash::AHashMap;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vz_render::GraphicsId;

use crate::data::{Datum, IdFn};
use crate::layer::LayerId;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique render node identifier, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        NodeId(raw)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Layer-private scratch storage on a node
#[derive(Default)]
pub struct UserData {
    entries: AHashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl UserData {
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(|v| v.downcast_ref())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.entries.get_mut(key).and_then(|v| v.downcast_mut())
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: &'static str, value: T) {
        self.entries.insert(key, Box::new(value));
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Persistent rendered state for one (layer, data item) pair
#[derive(Debug)]
pub struct RenderNode {
    pub(crate) id: NodeId,
    pub(crate) layer: Option<LayerId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) data: Datum,
    pub(crate) id_fn: Option<IdFn>,
    pub(crate) index: usize,
    pub(crate) kids: AHashMap<LayerId, Vec<NodeId>>,
    pub(crate) graphics: Option<GraphicsId>,
    pub(crate) visible: bool,
    pub(crate) appearing: bool,
    pub user_data: UserData,
}

impl RenderNode {
    fn new(layer: Option<LayerId>, parent: Option<NodeId>, data: Datum) -> Self {
        Self {
            id: NodeId::next(),
            layer,
            parent,
            prev: None,
            next: None,
            data,
            id_fn: None,
            index: 0,
            kids: AHashMap::new(),
            graphics: None,
            visible: false,
            appearing: false,
            user_data: UserData::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Owning layer; `None` once the node was destroyed
    pub fn layer(&self) -> Option<LayerId> {
        self.layer
    }

    pub fn is_live(&self) -> bool {
        self.layer.is_some()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn prev(&self) -> Option<NodeId> {
        self.prev
    }

    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    pub fn data(&self) -> &Datum {
        &self.data
    }

    pub fn id_fn(&self) -> Option<&IdFn> {
        self.id_fn.as_ref()
    }

    /// Position of this node's item within its parent's items
    pub fn index(&self) -> usize {
        self.index
    }

    /// Nodes of a child layer whose parent is this node, in order
    pub fn kids(&self, layer: LayerId) -> &[NodeId] {
        self.kids.get(&layer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn graphics(&self) -> Option<GraphicsId> {
        self.graphics
    }

    pub fn is_visible(&self) -> bool {
        self.visible && self.graphics.is_some()
    }

    /// True only on the pass in which this node's graphics were created
    pub fn is_appearing(&self) -> bool {
        self.appearing
    }

    pub(crate) fn shares_data_with(&self, other: &Datum) -> bool {
        Arc::ptr_eq(&self.data, other)
    }
}

/// Arena owning every render node of a scene
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: AHashMap<NodeId, RenderNode>,
    graveyard: Vec<NodeId>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn create(&mut self, layer: Option<LayerId>, parent: Option<NodeId>, data: Datum) -> NodeId {
        let node = RenderNode::new(layer, parent, data);
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&RenderNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut RenderNode> {
        self.nodes.get_mut(&id)
    }

    /// Number of nodes held, including ones destroyed during the last pass
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Detach a destroyed node; it stays readable until the next purge
    pub(crate) fn bury(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.layer = None;
            node.prev = None;
            node.next = None;
            node.graphics = None;
            node.visible = false;
            // kids stay until child layers have processed the removal
            self.graveyard.push(id);
        }
    }

    /// Drop every node destroyed since the previous purge
    pub(crate) fn purge(&mut self) -> usize {
        let count = self.graveyard.len();
        for id in self.graveyard.drain(..) {
            self.nodes.remove(&id);
        }
        count
    }

    /// Remove and return a parent's kid list for one layer
    pub(crate) fn take_kids(&mut self, parent: NodeId, layer: LayerId) -> Vec<NodeId> {
        self.nodes
            .get_mut(&parent)
            .and_then(|p| p.kids.remove(&layer))
            .unwrap_or_default()
    }

    pub(crate) fn set_kids(&mut self, parent: NodeId, layer: LayerId, kids: Vec<NodeId>) {
        if let Some(p) = self.nodes.get_mut(&parent) {
            if kids.is_empty() {
                p.kids.remove(&layer);
            } else {
                p.kids.insert(layer, kids);
            }
        }
    }

    pub(crate) fn kids_of(&self, parent: NodeId, layer: LayerId) -> Vec<NodeId> {
        self.get(parent).map(|p| p.kids(layer).to_vec()).unwrap_or_default()
    }
}
