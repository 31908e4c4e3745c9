//! Node sets: lazily evaluated selections of render nodes
//!
//! A node set never owns nodes and never materializes at construction time.
//! Membership is read at iteration time, so a set built before a redraw
//! reflects the nodes that exist after it.
//!
//! Filtered logical sets remember a fully consumed traversal, tagged with the
//! layer revision it was taken at. A stale revision or a new filter means the
//! snapshot is never reused.

use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::data::{truthy, Datum};
use crate::error::Result;
use crate::layer::LayerId;
use crate::list::ListIter;
use crate::node::{NodeId, NodeStore};
use crate::scene::{RenderReport, Scene};

/// Function computing the tested value of an item
pub type TestFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// What a filter tests on each item
#[derive(Clone)]
pub enum Test {
    /// Value of a field
    Field(String),
    /// Result of a function of the item
    Func(TestFn),
    /// Result of a function of a field's value
    FieldFunc(String, TestFn),
}

impl fmt::Debug for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Test::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Test::Func(_) => write!(f, "Func"),
            Test::FieldFunc(name, _) => f.debug_tuple("FieldFunc").field(name).finish(),
        }
    }
}

impl Test {
    pub fn field(name: impl Into<String>) -> Self {
        Test::Field(name.into())
    }

    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Test::Func(Arc::new(f))
    }

    fn eval(&self, item: &Value) -> Value {
        match self {
            Test::Field(name) => item.get(name.as_str()).cloned().unwrap_or(Value::Null),
            Test::Func(f) => f(item),
            Test::FieldFunc(name, f) => f(item.get(name.as_str()).unwrap_or(&Value::Null)),
        }
    }
}

#[derive(Clone, Debug)]
enum Predicate {
    Never,
    Truthy(Test),
    Equals(Test, Value),
    AnyOf(Test, Vec<Value>),
}

/// Predicate over node data
#[derive(Clone, Debug)]
pub struct Filter {
    predicate: Predicate,
}

impl Filter {
    /// Build a predicate from a test and optional literal match values
    ///
    /// No test, or an empty match list, never matches. Without match values
    /// the tested value must be truthy.
    pub fn new(test: Option<Test>, matches: Option<Vec<Value>>) -> Self {
        let predicate = match (test, matches) {
            (None, _) => Predicate::Never,
            (Some(test), None) => Predicate::Truthy(test),
            (Some(test), Some(mut values)) => match values.len() {
                0 => Predicate::Never,
                1 => Predicate::Equals(test, values.remove(0)),
                _ => Predicate::AnyOf(test, values),
            },
        };
        Self { predicate }
    }

    pub fn never() -> Self {
        Self {
            predicate: Predicate::Never,
        }
    }

    pub fn matches(&self, item: &Value) -> bool {
        match &self.predicate {
            Predicate::Never => false,
            Predicate::Truthy(test) => truthy(&test.eval(item)),
            Predicate::Equals(test, value) => test.eval(item) == *value,
            Predicate::AnyOf(test, values) => {
                let tested = test.eval(item);
                values.contains(&tested)
            }
        }
    }
}

struct Snapshot {
    revision: u64,
    nodes: Vec<NodeId>,
}

enum Selection {
    Logical {
        layer: LayerId,
        filter: Option<Filter>,
        cache: Option<Mutex<Option<Snapshot>>>,
    },
    Single {
        layer: LayerId,
        node: NodeId,
        filter: Option<Filter>,
    },
    Multi(Vec<NodeSet>),
}

/// A lazily evaluated selection of render nodes
#[derive(Clone)]
pub struct NodeSet {
    selection: Arc<Selection>,
}

impl fmt::Debug for NodeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.selection {
            Selection::Logical { layer, filter, cache } => f
                .debug_struct("Logical")
                .field("layer", layer)
                .field("filter", filter)
                .field("cached", &cache.is_some())
                .finish(),
            Selection::Single { layer, node, .. } => {
                f.debug_struct("Single").field("layer", layer).field("node", node).finish()
            }
            Selection::Multi(sets) => f.debug_tuple("Multi").field(sets).finish(),
        }
    }
}

impl NodeSet {
    fn from_selection(selection: Selection) -> Self {
        Self {
            selection: Arc::new(selection),
        }
    }

    /// Every node of a layer, unfiltered
    pub fn layer(layer: LayerId) -> Self {
        Self::from_selection(Selection::Logical {
            layer,
            filter: None,
            cache: None,
        })
    }

    /// Exactly one node
    pub fn single(layer: LayerId, node: NodeId) -> Self {
        Self::from_selection(Selection::Single {
            layer,
            node,
            filter: None,
        })
    }

    /// Select nodes whose data passes `test` against `matches`
    ///
    /// Replaces any previous filter and starts with an empty cache. A union
    /// applies the filter to each member.
    pub fn filter(&self, test: Option<Test>, matches: Option<Vec<Value>>) -> Self {
        self.with_filter(Filter::new(test, matches), true)
    }

    /// Like [`NodeSet::filter`] but never caches its traversal
    pub fn filter_uncached(&self, test: Option<Test>, matches: Option<Vec<Value>>) -> Self {
        self.with_filter(Filter::new(test, matches), false)
    }

    fn with_filter(&self, filter: Filter, cached: bool) -> Self {
        match &*self.selection {
            Selection::Logical { layer, .. } => Self::from_selection(Selection::Logical {
                layer: *layer,
                filter: Some(filter),
                cache: cached.then(|| Mutex::new(None)),
            }),
            Selection::Single { layer, node, .. } => Self::from_selection(Selection::Single {
                layer: *layer,
                node: *node,
                filter: Some(filter),
            }),
            Selection::Multi(sets) => Self::from_selection(Selection::Multi(
                sets.iter().map(|s| s.with_filter(filter.clone(), cached)).collect(),
            )),
        }
    }

    /// Union with another set; no deduplication
    pub fn and(&self, other: &NodeSet) -> Self {
        let mut members = Vec::new();
        for set in [self, other] {
            match &*set.selection {
                Selection::Multi(sets) => members.extend(sets.iter().cloned()),
                _ => members.push(set.clone()),
            }
        }
        Self::from_selection(Selection::Multi(members))
    }

    /// Layers this set can contain nodes of, in first-seen order
    pub fn layers(&self) -> Vec<LayerId> {
        let mut out = Vec::new();
        self.collect_layers(&mut out);
        out
    }

    fn collect_layers(&self, out: &mut Vec<LayerId>) {
        match &*self.selection {
            Selection::Logical { layer, .. } | Selection::Single { layer, .. } => {
                if !out.contains(layer) {
                    out.push(*layer);
                }
            }
            Selection::Multi(sets) => sets.iter().for_each(|s| s.collect_layers(out)),
        }
    }

    pub fn has_layer(&self, layer: LayerId) -> bool {
        match &*self.selection {
            Selection::Logical { layer: l, .. } | Selection::Single { layer: l, .. } => *l == layer,
            Selection::Multi(sets) => sets.iter().any(|s| s.has_layer(layer)),
        }
    }

    /// Iterate the selected nodes of one layer
    pub fn nodes<'a>(&'a self, scene: &'a Scene, layer: LayerId) -> Nodes<'a> {
        let store = scene.node_store();
        match &*self.selection {
            Selection::Logical { layer: l, .. } if *l != layer => Nodes::empty(),
            Selection::Logical { filter, cache, .. } => {
                let Some(owner) = scene.layer(layer) else {
                    return Nodes::empty();
                };
                let revision = owner.revision();
                let head = owner.nodes().head();

                match (filter, cache) {
                    (Some(filter), Some(cache)) => {
                        if let Some(snapshot) = cache.lock().as_ref() {
                            if snapshot.revision == revision {
                                return Nodes {
                                    inner: Inner::Listed(snapshot.nodes.clone().into_iter()),
                                };
                            }
                        }
                        Nodes::walk(store, head, Some(filter), Some(Recorder::new(cache, revision)))
                    }
                    (filter, _) => Nodes::walk(store, head, filter.as_ref(), None),
                }
            }
            Selection::Single { layer: l, node, filter } => {
                let selected = *l == layer
                    && store.get(*node).is_some_and(|n| {
                        n.layer() == Some(layer) && filter.as_ref().map_or(true, |f| f.matches(n.data()))
                    });
                let nodes = if selected { vec![*node] } else { Vec::new() };
                Nodes {
                    inner: Inner::Listed(nodes.into_iter()),
                }
            }
            Selection::Multi(sets) => Nodes {
                inner: Inner::Chain(Box::new(
                    sets.iter()
                        .filter(move |s| s.has_layer(layer))
                        .flat_map(move |s| s.nodes(scene, layer)),
                )),
            },
        }
    }

    /// Iterate the data items of the selected nodes of one layer
    pub fn data<'a>(&'a self, scene: &'a Scene, layer: LayerId) -> impl Iterator<Item = &'a Datum> + 'a {
        self.nodes(scene, layer)
            .filter_map(move |id| scene.node(id).map(|n| n.data()))
    }

    /// Remove the selected items from their layers' data
    pub fn remove(&self, scene: &mut Scene) -> Result<usize> {
        scene.remove_node_set(self)
    }

    /// Redraw the scene targeting this set
    pub fn redraw(&self, scene: &mut Scene) -> RenderReport {
        scene.redraw(self)
    }
}

struct Recorder<'a> {
    slot: &'a Mutex<Option<Snapshot>>,
    revision: u64,
    nodes: Vec<NodeId>,
}

impl<'a> Recorder<'a> {
    fn new(slot: &'a Mutex<Option<Snapshot>>, revision: u64) -> Self {
        Self {
            slot,
            revision,
            nodes: Vec::new(),
        }
    }

    fn commit(self) {
        *self.slot.lock() = Some(Snapshot {
            revision: self.revision,
            nodes: self.nodes,
        });
    }
}

enum Inner<'a> {
    Walk {
        walk: ListIter<'a>,
        store: &'a NodeStore,
        filter: Option<&'a Filter>,
        recorder: Option<Recorder<'a>>,
    },
    Listed(std::vec::IntoIter<NodeId>),
    Chain(Box<dyn Iterator<Item = NodeId> + 'a>),
}

/// Iterator over the nodes of a node set for one layer
pub struct Nodes<'a> {
    inner: Inner<'a>,
}

impl<'a> Nodes<'a> {
    fn empty() -> Self {
        Self {
            inner: Inner::Listed(Vec::new().into_iter()),
        }
    }

    fn walk(
        store: &'a NodeStore,
        head: Option<NodeId>,
        filter: Option<&'a Filter>,
        recorder: Option<Recorder<'a>>,
    ) -> Self {
        Self {
            inner: Inner::Walk {
                walk: ListIter::from_head(store, head),
                store,
                filter,
                recorder,
            },
        }
    }
}

impl Iterator for Nodes<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        match &mut self.inner {
            Inner::Walk {
                walk,
                store,
                filter,
                recorder,
            } => loop {
                let Some(id) = walk.next() else {
                    // only a complete traversal is remembered
                    if let Some(recorder) = recorder.take() {
                        recorder.commit();
                    }
                    return None;
                };
                let keep = match filter {
                    Some(filter) => store.get(id).is_some_and(|n| filter.matches(n.data())),
                    None => true,
                };
                if keep {
                    if let Some(recorder) = recorder.as_mut() {
                        recorder.nodes.push(id);
                    }
                    return Some(id);
                }
            },
            Inner::Listed(ids) => ids.next(),
            Inner::Chain(chain) => chain.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_forms() {
        let item = json!({"kind": "a", "size": 0});

        assert!(!Filter::new(None, None).matches(&item));
        assert!(!Filter::new(Some(Test::field("kind")), Some(vec![])).matches(&item));
        assert!(Filter::new(Some(Test::field("kind")), Some(vec![json!("a")])).matches(&item));
        assert!(Filter::new(Some(Test::field("kind")), Some(vec![json!("b"), json!("a")])).matches(&item));
        assert!(!Filter::new(Some(Test::field("kind")), Some(vec![json!("b"), json!("c")])).matches(&item));
        assert!(Filter::new(Some(Test::field("kind")), None).matches(&item));
        assert!(!Filter::new(Some(Test::field("size")), None).matches(&item));
    }

    #[test]
    fn test_function_tests() {
        let item = json!({"size": 4});
        let big = Test::func(|v| json!(v["size"].as_i64().unwrap_or(0) > 3));
        assert!(Filter::new(Some(big), None).matches(&item));

        let doubled = Test::FieldFunc("size".to_string(), Arc::new(|v| json!(v.as_i64().unwrap_or(0) * 2)));
        assert!(Filter::new(Some(doubled), Some(vec![json!(8)])).matches(&item));
    }

    #[test]
    fn test_union_layers() {
        let a = NodeSet::layer(LayerId::from_raw(1));
        let b = NodeSet::layer(LayerId::from_raw(2));
        let c = a.and(&b).and(&a);

        assert_eq!(c.layers(), vec![LayerId::from_raw(1), LayerId::from_raw(2)]);
        assert!(c.has_layer(LayerId::from_raw(2)));
        assert!(!c.has_layer(LayerId::from_raw(3)));
    }
}
