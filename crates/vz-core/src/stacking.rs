//! Z-order control for the graphics of a node set

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use vz_render::GraphicsId;

use crate::data::DataSource;
use crate::layer::LayerId;
use crate::node::NodeId;
use crate::node_set::NodeSet;
use crate::scene::Scene;

/// Comparator over the mapped values of one property
pub type CompareFn = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;

/// Order in which selected nodes are restacked
#[derive(Clone, Default)]
pub enum StackOrder {
    /// Data order
    #[default]
    Data,
    /// Group by the mapped value of `property`, one plane per listed value
    Planes { property: String, values: Vec<Value> },
    /// Stable sort by the mapped value of `property`
    Compare { property: String, compare: CompareFn },
}

impl fmt::Debug for StackOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackOrder::Data => write!(f, "Data"),
            StackOrder::Planes { property, values } => f
                .debug_struct("Planes")
                .field("property", property)
                .field("values", values)
                .finish(),
            StackOrder::Compare { property, .. } => f.debug_struct("Compare").field("property", property).finish(),
        }
    }
}

impl StackOrder {
    pub fn planes(property: impl Into<String>, values: Vec<Value>) -> Self {
        StackOrder::Planes {
            property: property.into(),
            values,
        }
    }

    pub fn compare<F>(property: impl Into<String>, compare: F) -> Self
    where
        F: Fn(&Value, &Value) -> Ordering + Send + Sync + 'static,
    {
        StackOrder::Compare {
            property: property.into(),
            compare: Arc::new(compare),
        }
    }
}

impl Scene {
    /// Raise the selected nodes' graphics; the last one in `order` ends on top
    pub fn to_front(&mut self, set: &NodeSet, order: &StackOrder) -> usize {
        let mut moved = 0;
        for layer in set.layers() {
            for g in self.stacking_sequence(set, layer, order) {
                self.canvas_mut().to_front(g, None);
                moved += 1;
            }
        }
        moved
    }

    /// Lower the selected nodes' graphics; the first one in `order` ends at the bottom
    pub fn to_back(&mut self, set: &NodeSet, order: &StackOrder) -> usize {
        let mut moved = 0;
        for layer in set.layers() {
            for g in self.stacking_sequence(set, layer, order).into_iter().rev() {
                self.canvas_mut().to_back(g, None);
                moved += 1;
            }
        }
        moved
    }

    fn stacking_sequence(&self, set: &NodeSet, layer: LayerId, order: &StackOrder) -> Vec<GraphicsId> {
        let Some(owner) = self.layer(layer) else {
            return Vec::new();
        };
        // inherited layers hold one node per parent node; nothing to order
        if matches!(owner.source(), DataSource::Inherit) {
            tracing::debug!("Layer {} inherits its data, skipping restack", layer);
            return Vec::new();
        }

        let plane = |id: &NodeId| -> Option<(NodeId, Value)> {
            let node = self.node(*id)?;
            let property = match order {
                StackOrder::Planes { property, .. } | StackOrder::Compare { property, .. } => property,
                StackOrder::Data => return Some((*id, Value::Null)),
            };
            Some((*id, owner.value_for(property, node.data(), Value::Null, node.index())))
        };
        let keyed: Vec<(NodeId, Value)> = set.nodes(self, layer).filter_map(|id| plane(&id)).collect();

        let sequence: Vec<NodeId> = match order {
            StackOrder::Data => keyed.into_iter().map(|(id, _)| id).collect(),
            StackOrder::Planes { values, .. } => values
                .iter()
                .flat_map(|v| keyed.iter().filter(move |(_, p)| p == v).map(|(id, _)| *id))
                .collect(),
            StackOrder::Compare { compare, .. } => {
                let mut keyed = keyed;
                keyed.sort_by(|a, b| compare(&a.1, &b.1));
                keyed.into_iter().map(|(id, _)| id).collect()
            }
        };

        sequence
            .into_iter()
            .filter_map(|id| self.node(id).and_then(|n| n.graphics()))
            .collect()
    }
}
