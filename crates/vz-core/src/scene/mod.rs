//! The layer tree root
//!
//! A scene owns the layers, the render node arena, the canvas backend and the
//! logging context. Every redraw walks the tree from the root layers down,
//! threading one change set per layer through exactly one pass.

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use vz_render::{Canvas, NativeEvent};

use crate::change::ChangeSet;
use crate::config::VizConfig;
use crate::data::Datum;
use crate::error::{Result, VizError};
use crate::event::Event;
use crate::layer::{Layer, LayerId, LayerKind, RenderContext};
use crate::logging::LogContext;
use crate::node::{NodeId, NodeStore, RenderNode};
use crate::node_set::NodeSet;
use crate::reconcile::{self, Pass};


/// Change sets produced by one redraw, keyed by layer in visiting order
#[derive(Debug, Default)]
pub struct RenderReport {
    changes: IndexMap<LayerId, ChangeSet>,
    purged: usize,
}

impl RenderReport {
    /// The change set a layer produced, if it was visited
    pub fn changes(&self, layer: LayerId) -> Option<&ChangeSet> {
        self.changes.get(&layer)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LayerId, &ChangeSet)> {
        self.changes.iter().map(|(id, cs)| (*id, cs))
    }

    /// Nodes destroyed by the previous redraw and dropped before this one
    pub fn purged(&self) -> usize {
        self.purged
    }
}

/// A tree of layers bound to one canvas
pub struct Scene {
    layers: Vec<Layer>,
    roots: Vec<LayerId>,
    nodes: NodeStore,
    root_node: NodeId,
    root_dirty: bool,
    canvas: Box<dyn Canvas>,
    config: VizConfig,
    log: Option<LogContext>,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("layers", &self.layers)
            .field("roots", &self.roots)
            .field("nodes", &self.nodes.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Scene {
    /// Create a scene that logs through whatever dispatcher is ambient
    pub fn new(canvas: impl Canvas + 'static) -> Self {
        let canvas: Box<dyn Canvas> = Box::new(canvas);
        let mut nodes = NodeStore::new();
        let root_node = nodes.create(None, None, Arc::new(Value::Null));
        if let Some(root) = nodes.get_mut(root_node) {
            root.graphics = Some(canvas.root());
            root.visible = true;
        }

        Self {
            layers: Vec::new(),
            roots: Vec::new(),
            nodes,
            root_node,
            root_dirty: false,
            canvas,
            config: VizConfig::default(),
            log: None,
        }
    }

    /// Create a scene that logs through its own configured context
    pub fn with_config(canvas: impl Canvas + 'static, config: VizConfig) -> Self {
        let mut scene = Self::new(canvas);
        scene.log = Some(LogContext::from_config(&config.log));
        scene.config = config;
        scene
    }

    pub fn config(&self) -> &VizConfig {
        &self.config
    }

    /// Add a layer that can hold children
    pub fn add_plot(&mut self, parent: Option<LayerId>, name: impl Into<String>) -> Result<LayerId> {
        self.add_layer(parent, name.into(), LayerKind::Plot { children: Vec::new() })
    }

    /// Add a drawing layer
    pub fn add_leaf(&mut self, parent: Option<LayerId>, name: impl Into<String>) -> Result<LayerId> {
        self.add_layer(parent, name.into(), LayerKind::Leaf)
    }

    fn add_layer(&mut self, parent: Option<LayerId>, name: String, kind: LayerKind) -> Result<LayerId> {
        let id = LayerId::from_raw(self.layers.len() as u32);

        // mappings are inherited by copy
        let mappings = match parent {
            Some(p) => {
                let parent_layer = self.layer_mut(p)?;
                parent_layer.add_child(id)?;
                parent_layer.mappings().clone()
            }
            None => {
                self.roots.push(id);
                IndexMap::new()
            }
        };

        tracing::debug!("Added layer {} '{}' under {:?}", id, name, parent);
        self.layers.push(Layer::new(id, name, parent, kind, mappings));
        Ok(id)
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id.index())
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        self.layers.get_mut(id.index()).ok_or(VizError::UnknownLayer(id))
    }

    pub fn roots(&self) -> &[LayerId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Option<&RenderNode> {
        self.nodes.get(id)
    }

    pub fn node_store(&self) -> &NodeStore {
        &self.nodes
    }

    /// Synthetic parent of every root layer's nodes
    pub fn root_node(&self) -> NodeId {
        self.root_node
    }

    /// Replace the item root layers without local data inherit
    pub fn set_root_data(&mut self, data: Value) {
        if let Some(root) = self.nodes.get_mut(self.root_node) {
            root.data = Arc::new(data);
            self.root_dirty = true;
        }
    }

    pub fn canvas(&self) -> &dyn Canvas {
        self.canvas.as_ref()
    }

    pub fn canvas_mut(&mut self) -> &mut dyn Canvas {
        self.canvas.as_mut()
    }

    /// Every node of a layer
    pub fn select(&self, layer: LayerId) -> NodeSet {
        NodeSet::layer(layer)
    }

    /// Nodes of a layer in list order
    pub fn nodes_of(&self, layer: LayerId) -> Vec<NodeId> {
        self.layer(layer)
            .map(|l| l.nodes().iter(&self.nodes).collect())
            .unwrap_or_default()
    }

    /// Redraw the whole tree, targeting every root layer
    pub fn redraw_all(&mut self) -> RenderReport {
        let target = self
            .roots
            .iter()
            .map(|r| NodeSet::layer(*r))
            .reduce(|a, b| a.and(&b));
        match target {
            Some(target) => self.redraw(&target),
            None => RenderReport::default(),
        }
    }

    /// Run one reconciliation pass over the tree, targeting `target`
    pub fn redraw(&mut self, target: &NodeSet) -> RenderReport {
        match self.log.clone() {
            Some(log) => log.scope(|| self.run_pass(target)),
            None => self.run_pass(target),
        }
    }

    fn run_pass(&mut self, target: &NodeSet) -> RenderReport {
        let span = tracing::debug_span!("redraw", targets = ?target.layers());
        let _enter = span.enter();

        let mut report = RenderReport {
            purged: self.nodes.purge(),
            ..Default::default()
        };

        let mut root_changes = ChangeSet::new(target.clone());
        if std::mem::take(&mut self.root_dirty) {
            root_changes.changed.push(self.root_node);
            root_changes.data_changed = true;
        }

        for root in self.roots.clone() {
            self.render_layer(root, &root_changes, target, &mut report);
        }

        let (added, changed, removed) = report.iter().fold((0, 0, 0), |acc, (_, cs)| {
            (acc.0 + cs.added.len(), acc.1 + cs.changed.len(), acc.2 + cs.removed.len())
        });
        tracing::info!(
            "Redraw complete: {} layers, {} added, {} changed, {} removed",
            report.changes.len(),
            added,
            changed,
            removed
        );
        report
    }

    fn upstream(&self, id: LayerId) -> Vec<NodeId> {
        match self.layer(id).and_then(Layer::parent) {
            Some(parent) => self.nodes_of(parent),
            None => vec![self.root_node],
        }
    }

    fn render_layer(&mut self, id: LayerId, parent: &ChangeSet, target: &NodeSet, report: &mut RenderReport) {
        let idx = id.index();
        let upstream = self.upstream(id);

        let mut changes = {
            let mut pass = Pass {
                store: &mut self.nodes,
                canvas: self.canvas.as_mut(),
            };
            reconcile::reconcile(&mut self.layers[idx], &upstream, parent, target, &mut pass)
        };

        // explicitly targeted nodes are redrawn whether or not their data moved
        if target.has_layer(id) {
            let explicit: Vec<NodeId> = target.nodes(self, id).collect();
            let mut pass = Pass {
                store: &mut self.nodes,
                canvas: self.canvas.as_mut(),
            };
            reconcile::mark_changed(&mut self.layers[idx], explicit, &mut pass, &mut changes);
        }

        {
            let mut pass = Pass {
                store: &mut self.nodes,
                canvas: self.canvas.as_mut(),
            };
            reconcile::finalize(&mut changes, &mut pass);
        }

        tracing::debug!(
            "Layer {}: {} added, {} changed, {} removed, {} updates",
            id,
            changes.added.len(),
            changes.changed.len(),
            changes.removed.len(),
            changes.updates.len()
        );

        if let Some(mut renderer) = self.layers[idx].renderer.take() {
            let mut cx = RenderContext {
                layer: &self.layers[idx],
                nodes: &mut self.nodes,
                canvas: self.canvas.as_mut(),
            };
            renderer.render(&mut cx, &changes);
            self.layers[idx].renderer = Some(renderer);
        }

        for child in self.layers[idx].children().to_vec() {
            self.render_layer(child, &changes, target, report);
        }

        report.changes.insert(id, changes);
    }

    /// Register an event handler on a layer
    ///
    /// Nodes that already have graphics start listening immediately; later
    /// nodes pick the handler up when their graphics are created.
    pub fn on<F>(&mut self, layer: LayerId, event: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let event = event.into();
        let fresh = {
            let owner = self.layer_mut(layer)?;
            owner.handlers.insert(event.clone(), Arc::new(handler)).is_none()
        };
        if fresh {
            for g in self.graphics_of(layer) {
                self.canvas.listen(g, &event, u64::from(layer.raw()));
            }
        }
        Ok(())
    }

    /// Remove a layer's handler for an event
    pub fn off(&mut self, layer: LayerId, event: &str) -> Result<bool> {
        let removed = self.layer_mut(layer)?.handlers.shift_remove(event).is_some();
        if removed {
            for g in self.graphics_of(layer) {
                self.canvas.unlisten(g, event, u64::from(layer.raw()));
            }
        }
        Ok(removed)
    }

    fn graphics_of(&self, layer: LayerId) -> Vec<vz_render::GraphicsId> {
        self.nodes_of(layer)
            .into_iter()
            .filter_map(|id| self.nodes.get(id).and_then(|n| n.graphics))
            .collect()
    }

    /// Route a backend event to the handler of the layer that drew the element
    ///
    /// Returns whether a handler consumed it; consumed events stop propagating.
    pub fn dispatch(&self, native: &mut NativeEvent) -> bool {
        let Some(binding) = self.canvas.resolve(native) else {
            return false;
        };
        let node_id = NodeId::from_raw(binding.node);
        let Some(node) = self.nodes.get(node_id) else {
            return false;
        };
        let Some(handler) = node
            .layer()
            .and_then(|l| self.layer(l))
            .and_then(|l| l.handlers.get(&native.kind))
        else {
            return false;
        };

        let event = Event {
            data: Arc::clone(node.data()),
            node: node_id,
            index: binding.index,
            event_type: native.kind.clone(),
            source: native.clone(),
            dx: native.dx,
            dy: native.dy,
        };
        let consumed = handler(&event);
        if consumed {
            native.stop_propagation();
        }
        consumed
    }

    /// Remove the data items behind a node set from their layers
    ///
    /// Every layer involved must own a plain array; nothing is removed
    /// otherwise. Takes effect on the next redraw.
    pub fn remove_node_set(&mut self, set: &NodeSet) -> Result<usize> {
        let layers = set.layers();
        for id in &layers {
            let layer = self.layer(*id).ok_or(VizError::UnknownLayer(*id))?;
            match layer.source() {
                crate::data::DataSource::Fixed(_) => {}
                crate::data::DataSource::Derived(_) => return Err(VizError::DerivedDataSource(*id)),
                crate::data::DataSource::Inherit => return Err(VizError::NotLocalArray(*id)),
            }
        }

        let mut removed = 0;
        for id in layers {
            let doomed: Vec<Datum> = set.data(self, id).cloned().collect();
            removed += self.layer_mut(id)?.remove_items(&doomed)?;
        }
        Ok(removed)
    }
}
