//! Reconciliation of a layer's node list against its parent's change set
//!
//! One call per layer per redraw. The steps, in priority order:
//!
//! 1. a layer that switched between local and inherited data drops every node;
//! 2. an empty list is rebuilt from scratch over the upstream nodes;
//! 3. a layer with local data and pending hints diffs items by identity under
//!    every upstream node;
//! 4. otherwise the parent's removed / changed / added lists are applied and
//!    the list is relinked to follow the parent order;
//!
//! then the scene unions explicitly targeted nodes into `changed` and
//! [`finalize`] releases removed nodes and computes `updates`.

use ahash::AHashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use vz_render::Canvas;

use crate::change::ChangeSet;
use crate::data::{DataSource, Datum, IdFn, Identity};
use crate::layer::Layer;
use crate::node::{NodeId, NodeStore};
use crate::node_set::NodeSet;

/// Mutable scene state a pass works on
pub(crate) struct Pass<'a> {
    pub store: &'a mut NodeStore,
    pub canvas: &'a mut dyn Canvas,
}

/// Recompute a node's visibility and create, show or hide its graphics
///
/// Returns whether the node is visible afterwards.
fn touch(layer: &mut Layer, pass: &mut Pass<'_>, id: NodeId) -> bool {
    let Some(node) = pass.store.get(id) else {
        return false;
    };
    let show = layer.shows(node.data(), node.index());
    let was_visible = node.visible;
    let parent_graphics = node
        .parent
        .and_then(|p| pass.store.get(p))
        .and_then(|p| p.graphics);

    let mut appeared = false;
    let graphics = match (show, node.graphics) {
        (true, None) => {
            // parent without graphics: stay invisible until it has some
            let created = parent_graphics.and_then(|pg| pass.canvas.create_graphics(pg));
            if let Some(g) = created {
                for event in layer.handlers.keys() {
                    pass.canvas.listen(g, event, u64::from(layer.id().raw()));
                }
                appeared = true;
            }
            created
        }
        (true, Some(g)) => {
            if !was_visible {
                pass.canvas.set_visible(g, true);
            }
            Some(g)
        }
        (false, Some(g)) => {
            if was_visible {
                pass.canvas.set_visible(g, false);
            }
            Some(g)
        }
        (false, None) => None,
    };

    let visible = show && graphics.is_some();
    if let Some(node) = pass.store.get_mut(id) {
        node.graphics = graphics;
        node.visible = visible;
        if appeared {
            node.appearing = true;
        }
    }
    if appeared {
        layer.appearing.push(id);
    }
    visible
}

fn create_node(
    layer: &Layer,
    pass: &mut Pass<'_>,
    parent: NodeId,
    item: Datum,
    index: usize,
    id_fn: Option<&IdFn>,
) -> NodeId {
    let id = pass.store.create(Some(layer.id()), Some(parent), item);
    if let Some(node) = pass.store.get_mut(id) {
        node.index = index;
        node.id_fn = id_fn.cloned();
    }
    id
}

fn parent_data(store: &NodeStore, parent: NodeId) -> Option<Datum> {
    store.get(parent).map(|p| Arc::clone(p.data()))
}

/// Reconcile one layer; steps 1 to 4
pub(crate) fn reconcile(
    layer: &mut Layer,
    upstream: &[NodeId],
    parent: &ChangeSet,
    target: &NodeSet,
    pass: &mut Pass<'_>,
) -> ChangeSet {
    let mut changes = ChangeSet::new(target.clone());
    let hints = layer.take_hints();
    let local = layer.source().is_local();

    for id in layer.appearing.drain(..) {
        if let Some(node) = pass.store.get_mut(id) {
            node.appearing = false;
        }
    }

    changes.data_changed = if local {
        hints.is_some_and(|h| h.changed)
    } else {
        parent.data_changed
    };
    changes.update_all = parent.update_all;

    // switching data ownership always costs a full rebuild
    let switched = !layer.list.is_empty() && layer.rendered_local != local;
    if switched {
        let doomed: Vec<NodeId> = layer.list.iter(pass.store).collect();
        for id in &doomed {
            if let Some(p) = pass.store.get(*id).and_then(|n| n.parent) {
                pass.store.take_kids(p, layer.id());
            }
        }
        layer.list.clear();
        changes.removed.extend(doomed);
        tracing::debug!("Layer {} switched data ownership, rebuilding", layer.id());
    }
    layer.rendered_local = local;

    if layer.list.is_empty() {
        rebuild(layer, upstream, pass, &mut changes);
        if layer.list.is_empty() && target.has_layer(layer.id()) {
            changes.update_all = true;
        }
    } else if local && hints.is_some() {
        let data_changed = hints.is_some_and(|h| h.changed);
        diff_local(layer, upstream, parent, data_changed, pass, &mut changes);
    } else {
        apply_parent(layer, upstream, parent, pass, &mut changes);
    }

    // an ancestor asked for everything below it; with inherited data there
    // is nothing structural left to do
    if parent.update_all {
        let all: Vec<NodeId> = layer.list.iter(pass.store).collect();
        mark_changed(layer, all, pass, &mut changes);
    }

    if switched || hints.is_some() || !parent.is_empty() || !changes.is_empty() || changes.relinked {
        layer.bump_revision();
    }

    changes
}

/// Create nodes for every upstream node, in order
fn rebuild(layer: &mut Layer, upstream: &[NodeId], pass: &mut Pass<'_>, changes: &mut ChangeSet) {
    for &p in upstream {
        let Some(data) = parent_data(pass.store, p) else {
            continue;
        };
        let items = layer.source().items(&data);
        let id_fn = layer.effective_id_fn(items.first());

        let mut kids = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let id = create_node(layer, pass, p, item, index, id_fn.as_ref());
            layer.list.push_back(pass.store, id);
            touch(layer, pass, id);
            changes.added.push(id);
            kids.push(id);
        }
        pass.store.set_kids(p, layer.id(), kids);
    }
}

/// Diff new items against existing nodes by identity, per upstream node
fn diff_local(
    layer: &mut Layer,
    upstream: &[NodeId],
    parent: &ChangeSet,
    data_changed: bool,
    pass: &mut Pass<'_>,
    changes: &mut ChangeSet,
) {
    remove_kids_of(layer, &parent.removed, pass, changes);

    let mut order = Vec::with_capacity(layer.list.len());
    for &p in upstream {
        let Some(data) = parent_data(pass.store, p) else {
            continue;
        };
        let kids = diff_kids(layer, p, &data, data_changed, pass, changes);
        order.extend_from_slice(&kids);
        pass.store.set_kids(p, layer.id(), kids);
    }

    relink(layer, pass.store, &order, changes);
}

/// Re-evaluate the items under one parent and match them to its old kids
///
/// Matching is first-match-wins in new-item order. Old nodes are pooled by
/// identity and leave the pool when claimed, so whatever is left over is
/// exactly the removals and the whole diff is O(old + new). Returns the new
/// kids in item order; the caller stores them and relinks the list.
fn diff_kids(
    layer: &mut Layer,
    p: NodeId,
    data: &Datum,
    data_changed: bool,
    pass: &mut Pass<'_>,
    changes: &mut ChangeSet,
) -> Vec<NodeId> {
    let items = layer.source().items(data);
    let id_fn = layer.effective_id_fn(items.first());
    let old = pass.store.take_kids(p, layer.id());

    let mut pool: AHashMap<Identity, VecDeque<usize>> = AHashMap::with_capacity(old.len());
    for (slot, id) in old.iter().enumerate() {
        if let Some(node) = pass.store.get(*id) {
            let identity = Identity::of(node.data(), node.id_fn());
            pool.entry(identity).or_default().push_back(slot);
        }
    }
    let mut claimed = vec![false; old.len()];

    let mut kids = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let identity = Identity::of(&item, id_fn.as_ref());
        match pool.get_mut(&identity).and_then(VecDeque::pop_front) {
            Some(slot) => {
                claimed[slot] = true;
                let id = old[slot];
                if let Some(node) = pass.store.get_mut(id) {
                    node.data = item;
                    node.id_fn = id_fn.clone();
                    node.index = index;
                }
                if touch(layer, pass, id) && data_changed {
                    changes.changed.push(id);
                }
                kids.push(id);
            }
            None => {
                let id = create_node(layer, pass, p, item, index, id_fn.as_ref());
                touch(layer, pass, id);
                kids.push(id);
                changes.added.push(id);
            }
        }
    }

    for (slot, id) in old.into_iter().enumerate() {
        if !claimed[slot] {
            layer.list.unlink(pass.store, id);
            changes.removed.push(id);
        }
    }
    kids
}

/// Apply the parent's structural changes to this layer
///
/// Derived layers re-evaluate their items under every changed parent. The
/// list is relinked in upstream order whenever kids were created or the
/// parent list itself moved.
fn apply_parent(
    layer: &mut Layer,
    upstream: &[NodeId],
    parent: &ChangeSet,
    pass: &mut Pass<'_>,
    changes: &mut ChangeSet,
) {
    let lid = layer.id();
    remove_kids_of(layer, &parent.removed, pass, changes);

    let inherit = !layer.source().is_local();
    let derived = matches!(layer.source(), DataSource::Derived(_));
    let mut restructured = parent.relinked || !parent.added.is_empty();

    for &p in &parent.changed {
        let Some(data) = parent_data(pass.store, p) else {
            continue;
        };
        if derived {
            let kids = diff_kids(layer, p, &data, true, pass, changes);
            pass.store.set_kids(p, lid, kids);
            restructured = true;
            continue;
        }
        for id in pass.store.kids_of(p, lid) {
            if inherit {
                if let Some(node) = pass.store.get_mut(id).filter(|n| !n.shares_data_with(&data)) {
                    node.data = Arc::clone(&data);
                }
            }
            if touch(layer, pass, id) {
                changes.changed.push(id);
            }
        }
    }

    for &p in &parent.added {
        let Some(data) = parent_data(pass.store, p) else {
            continue;
        };
        let items = layer.source().items(&data);
        let id_fn = layer.effective_id_fn(items.first());

        let mut kids = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let id = create_node(layer, pass, p, item, index, id_fn.as_ref());
            touch(layer, pass, id);
            changes.added.push(id);
            kids.push(id);
        }
        pass.store.set_kids(p, lid, kids);
    }

    if restructured {
        let order: Vec<NodeId> = upstream.iter().flat_map(|&p| pass.store.kids_of(p, lid)).collect();
        relink(layer, pass.store, &order, changes);
    }
}

fn remove_kids_of(layer: &mut Layer, parents: &[NodeId], pass: &mut Pass<'_>, changes: &mut ChangeSet) {
    for &p in parents {
        for id in pass.store.take_kids(p, layer.id()) {
            layer.list.unlink(pass.store, id);
            changes.removed.push(id);
        }
    }
}

/// Make the list hold exactly `order`, flagging the change set if it moved
fn relink(layer: &mut Layer, store: &mut NodeStore, order: &[NodeId], changes: &mut ChangeSet) {
    if layer.list.len() == order.len() && layer.list.iter(store).eq(order.iter().copied()) {
        return;
    }
    layer.list.relink(store, order);
    changes.relinked = true;
}

/// Mark live, visible nodes of this layer changed unless already added/changed
pub(crate) fn mark_changed(
    layer: &mut Layer,
    candidates: Vec<NodeId>,
    pass: &mut Pass<'_>,
    changes: &mut ChangeSet,
) {
    let lid = layer.id();
    let mut visible = Vec::with_capacity(candidates.len());
    for id in candidates {
        let owned = pass.store.get(id).is_some_and(|n| n.layer == Some(lid));
        if owned && touch(layer, pass, id) {
            visible.push(id);
        }
    }
    changes.union_changed(visible);
}

/// Release removed nodes and compute what drawing layers should redraw
pub(crate) fn finalize(changes: &mut ChangeSet, pass: &mut Pass<'_>) {
    for &id in &changes.removed {
        if let Some(graphics) = pass.store.get(id).and_then(|n| n.graphics) {
            pass.canvas.release(graphics);
        }
        pass.store.bury(id);
    }

    let mut updates = changes.changed.clone();
    updates.extend(
        changes
            .added
            .iter()
            .copied()
            .filter(|id| pass.store.get(*id).is_some_and(|n| n.is_visible())),
    );
    changes.updates = updates;
}
