//! Mark layer: one canvas element per visible node

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vz_core::{ChangeSet, LayerRenderer, NodeId, RenderContext, RenderNode};
use vz_render::{Attributes, Binding, ElementId};

/// User-data key holding a node's element
const ELEMENT_KEY: &str = "vz_views.mark";

/// Configuration for a mark layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkConfig {
    /// Element kind created on the canvas
    pub kind: String,

    /// Mapped properties copied into element attributes
    pub properties: Vec<String>,

    /// Values for properties the layer leaves unmapped
    pub defaults: Attributes,
}

impl Default for MarkConfig {
    fn default() -> Self {
        Self {
            kind: "circle".to_string(),
            properties: vec!["x".to_string(), "y".to_string(), "r".to_string(), "fill".to_string()],
            defaults: Attributes::new(),
        }
    }
}

impl MarkConfig {
    pub fn new(kind: impl Into<String>, properties: &[&str]) -> Self {
        Self {
            kind: kind.into(),
            properties: properties.iter().map(|p| p.to_string()).collect(),
            defaults: Attributes::new(),
        }
    }

    pub fn with_default(mut self, property: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(property.into(), value);
        self
    }
}

/// Draws every node in `updates` as one element and keeps it bound to the node
#[derive(Debug, Default)]
pub struct MarkRenderer {
    config: MarkConfig,
    drawn: usize,
}

impl MarkRenderer {
    pub fn new(config: MarkConfig) -> Self {
        Self { config, drawn: 0 }
    }

    pub fn config(&self) -> &MarkConfig {
        &self.config
    }

    /// Number of element writes so far
    pub fn drawn(&self) -> usize {
        self.drawn
    }

    /// The element drawn for a node, if any
    pub fn element_of(node: &RenderNode) -> Option<ElementId> {
        node.user_data.get::<ElementId>(ELEMENT_KEY).copied()
    }

    fn attributes(&self, cx: &RenderContext<'_>, node: NodeId) -> Attributes {
        let mut attrs = Attributes::new();
        for property in &self.config.properties {
            let default = self.config.defaults.get(property).cloned().unwrap_or(Value::Null);
            let value = cx.value_for(property, node, default);
            if !value.is_null() {
                attrs.insert(property.clone(), value);
            }
        }
        attrs
    }
}

impl LayerRenderer for MarkRenderer {
    fn render(&mut self, cx: &mut RenderContext<'_>, changes: &ChangeSet) {
        for &id in &changes.updates {
            let attrs = self.attributes(cx, id);
            let Some(node) = cx.node(id) else {
                continue;
            };
            let binding = Binding {
                node: id.raw(),
                index: node.index(),
            };

            let element = match (Self::element_of(node), node.graphics()) {
                (Some(element), _) => {
                    cx.canvas.update_element(element, &attrs);
                    element
                }
                (None, Some(graphics)) => match cx.canvas.create_element(graphics, &self.config.kind, &attrs) {
                    Some(element) => {
                        if let Some(node) = cx.node_mut(id) {
                            node.user_data.insert(ELEMENT_KEY, element);
                        }
                        element
                    }
                    None => {
                        tracing::warn!("Canvas refused a '{}' element for node {}", self.config.kind, id);
                        continue;
                    }
                },
                (None, None) => continue,
            };

            // the item's index moves on reorder
            cx.canvas.bind(element, binding);
            self.drawn += 1;
        }

        tracing::debug!(
            "Layer {} drew {} marks ({} removed)",
            cx.layer.id(),
            changes.updates.len(),
            changes.removed.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use vz_core::{IdSpec, LayerId, Mapping, NodeSet, Scene};
    use vz_render::{MemoryCanvas, NativeEvent};

    fn memory(scene: &Scene) -> &MemoryCanvas {
        scene.canvas().as_any().downcast_ref::<MemoryCanvas>().unwrap()
    }

    fn element(scene: &Scene, node: NodeId) -> ElementId {
        MarkRenderer::element_of(scene.node(node).unwrap()).unwrap()
    }

    fn marks_scene() -> (Scene, LayerId) {
        let mut scene = Scene::new(MemoryCanvas::new());
        let marks = scene.add_leaf(None, "marks").unwrap();
        scene
            .layer_mut(marks)
            .unwrap()
            .map("x", Mapping::field("x"))
            .map("fill", Mapping::constant("steelblue"))
            .set_renderer(MarkRenderer::new(
                MarkConfig::new("circle", &["x", "fill", "r"]).with_default("r", json!(3)),
            ));
        (scene, marks)
    }

    #[test]
    fn test_config_from_json() {
        let config: MarkConfig = serde_json::from_value(json!({"kind": "rect"})).unwrap();
        assert_eq!(config.kind, "rect");
        assert_eq!(config.properties, MarkConfig::default().properties);
    }

    #[test]
    fn test_elements_follow_nodes() {
        let (mut scene, marks) = marks_scene();
        scene
            .layer_mut(marks)
            .unwrap()
            .all(json!([{"id": 1, "x": 10}, {"id": 2, "x": 20}]), IdSpec::Keep);
        scene.redraw_all();

        let nodes = scene.nodes_of(marks);
        let first = element(&scene, nodes[0]);
        assert_eq!(memory(&scene).element_kind(first), Some("circle"));
        assert_eq!(
            memory(&scene).element_attrs(first).unwrap(),
            json!({"x": 10, "fill": "steelblue", "r": 3}).as_object().unwrap()
        );

        scene
            .layer_mut(marks)
            .unwrap()
            .all(json!([{"id": 1, "x": 15}]), IdSpec::Keep);
        scene.redraw(&NodeSet::layer(marks).filter(None, None));

        assert_eq!(element(&scene, nodes[0]), first);
        assert_eq!(memory(&scene).element_attrs(first).unwrap()["x"], json!(15));
        // the removed node's graphics took its element along
        assert_eq!(memory(&scene).live_count(), 1);
    }

    #[test]
    fn test_clicks_resolve_to_data() {
        let (mut scene, marks) = marks_scene();
        let clicked = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&clicked);
        scene
            .on(marks, "click", move |event| {
                *sink.lock() = Some((event.data["id"].clone(), event.index));
                true
            })
            .unwrap();
        scene
            .layer_mut(marks)
            .unwrap()
            .all(json!([{"id": "a", "x": 1}, {"id": "b", "x": 2}]), IdSpec::Keep);
        scene.redraw_all();

        let target = element(&scene, scene.nodes_of(marks)[1]);
        let mut event = NativeEvent::new("click", Some(target));
        assert!(scene.dispatch(&mut event));
        assert_eq!(*clicked.lock(), Some((json!("b"), 1)));
    }
}
