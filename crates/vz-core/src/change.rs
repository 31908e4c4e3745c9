//! Per-pass change sets threaded down the layer tree

use ahash::AHashSet;

use crate::layer::LayerId;
use crate::node::NodeId;
use crate::node_set::{NodeSet, Nodes};
use crate::scene::Scene;

/// What one layer's reconciliation produced during a redraw
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Nodes created this pass
    pub added: Vec<NodeId>,
    /// Existing nodes whose data or selection requires a redraw
    pub changed: Vec<NodeId>,
    /// Nodes destroyed this pass
    pub removed: Vec<NodeId>,
    /// What a drawing layer should redraw: `changed` plus visible `added`
    pub updates: Vec<NodeId>,
    /// Item data (not just membership) changed upstream
    pub data_changed: bool,
    /// Descendants treat all of their nodes as selected
    pub update_all: bool,
    /// The node list was relinked; descendant lists follow the new order
    pub relinked: bool,
    root_set: NodeSet,
}

impl ChangeSet {
    pub(crate) fn new(root_set: NodeSet) -> Self {
        Self {
            added: Vec::new(),
            changed: Vec::new(),
            removed: Vec::new(),
            updates: Vec::new(),
            data_changed: false,
            update_all: false,
            relinked: false,
            root_set,
        }
    }

    /// The node set the redraw was invoked on
    pub fn root_set(&self) -> &NodeSet {
        &self.root_set
    }

    /// Whether the redraw explicitly targets `layer`
    pub fn has_layer(&self, layer: LayerId) -> bool {
        self.root_set.has_layer(layer)
    }

    /// Nodes of `layer` the redraw explicitly targets
    pub fn nodes<'a>(&'a self, scene: &'a Scene, layer: LayerId) -> Nodes<'a> {
        self.root_set.nodes(scene, layer)
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Mark nodes changed unless already added or changed
    pub(crate) fn union_changed(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        let mut seen: AHashSet<NodeId> = self.changed.iter().chain(&self.added).copied().collect();
        for id in nodes {
            if seen.insert(id) {
                self.changed.push(id);
            }
        }
    }
}
