//! Canvas abstraction layer
//!
//! This crate defines the narrow contract the layer tree uses to talk to a
//! drawing backend. The core never touches backend drawing primitives; it only
//! creates, parents, shows, hides, restacks and releases graphics contexts and
//! routes events back from drawable elements.

mod memory;

pub use memory::MemoryCanvas;

use serde::{Deserialize, Serialize};
use std::any::Any;

/// Attribute bag handed to backends when creating or updating an element
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Handle to a graphics context (a group of drawables) owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphicsId(pub u64);

/// Handle to a single drawable element inside a graphics context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

/// Key identifying who registered an event listener (a layer)
pub type ListenerKey = u64;

/// Opaque (data, index) pair associated with a drawable element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Render node the element was drawn for
    pub node: u64,
    /// Index of the node's data item within its parent's items
    pub index: usize,
}

/// An event as delivered by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct NativeEvent {
    /// Event type, e.g. `"click"` or `"drag"`
    pub kind: String,
    /// Element the event hit, if any
    pub element: Option<ElementId>,
    /// Drag offset
    pub dx: Option<f64>,
    pub dy: Option<f64>,
    propagation_stopped: bool,
}

impl NativeEvent {
    /// Create an event aimed at an element
    pub fn new(kind: impl Into<String>, element: Option<ElementId>) -> Self {
        Self {
            kind: kind.into(),
            element,
            dx: None,
            dy: None,
            propagation_stopped: false,
        }
    }

    /// Create a drag event carrying an offset
    pub fn drag(kind: impl Into<String>, element: Option<ElementId>, dx: f64, dy: f64) -> Self {
        Self {
            dx: Some(dx),
            dy: Some(dy),
            ..Self::new(kind, element)
        }
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

/// Trait for canvas backends
///
/// Implementations must tolerate calls on handles they already released;
/// releasing a graphics context releases everything parented under it.
pub trait Canvas: Send {
    /// The root graphics context everything else is parented under
    fn root(&self) -> GraphicsId;

    /// Create a child graphics context under `parent`
    ///
    /// Returns `None` if the parent is unknown to the backend.
    fn create_graphics(&mut self, parent: GraphicsId) -> Option<GraphicsId>;

    /// Show or hide a graphics context
    fn set_visible(&mut self, graphics: GraphicsId, visible: bool);

    /// Move a graphics context (or one of its elements) to the top of its siblings
    fn to_front(&mut self, graphics: GraphicsId, element: Option<ElementId>);

    /// Move a graphics context (or one of its elements) to the bottom of its siblings
    fn to_back(&mut self, graphics: GraphicsId, element: Option<ElementId>);

    /// Remove a graphics context and release its resources
    fn release(&mut self, graphics: GraphicsId);

    /// Attach a named-event listener bound to a layer
    fn listen(&mut self, graphics: GraphicsId, event: &str, listener: ListenerKey);

    /// Detach a named-event listener
    fn unlisten(&mut self, graphics: GraphicsId, event: &str, listener: ListenerKey);

    /// Create a drawable element inside a graphics context
    fn create_element(&mut self, graphics: GraphicsId, kind: &str, attrs: &Attributes) -> Option<ElementId>;

    /// Replace the attributes of an element
    fn update_element(&mut self, element: ElementId, attrs: &Attributes);

    /// Associate an opaque (node, index) pair with an element
    fn bind(&mut self, element: ElementId, binding: Binding);

    /// Retrieve the pair associated with the element a native event hit
    fn resolve(&self, event: &NativeEvent) -> Option<Binding>;

    /// Get as any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Get as any mut for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
