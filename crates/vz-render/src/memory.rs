//! In-memory retained canvas
//!
//! Keeps the graphics tree, element attributes, listeners and bindings in plain
//! maps. Used by tests and by headless tooling that only needs to observe what
//! the layer tree asked the backend to do.

use ahash::AHashMap;
use std::any::Any;

use crate::{Attributes, Binding, Canvas, ElementId, GraphicsId, ListenerKey, NativeEvent};

#[derive(Debug, Clone)]
struct Group {
    parent: Option<GraphicsId>,
    children: Vec<GraphicsId>,
    elements: Vec<ElementId>,
    visible: bool,
    listeners: Vec<(String, ListenerKey)>,
}

impl Group {
    fn new(parent: Option<GraphicsId>) -> Self {
        Self {
            parent,
            children: Vec::new(),
            elements: Vec::new(),
            visible: true,
            listeners: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Element {
    graphics: GraphicsId,
    kind: String,
    attrs: Attributes,
    binding: Option<Binding>,
}

/// Canvas backend that records everything in memory
#[derive(Debug)]
pub struct MemoryCanvas {
    groups: AHashMap<GraphicsId, Group>,
    elements: AHashMap<ElementId, Element>,
    root: GraphicsId,
    next_id: u64,
    created: usize,
    released: usize,
}

impl Default for MemoryCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCanvas {
    /// Create an empty canvas with a visible root group
    pub fn new() -> Self {
        let root = GraphicsId(0);
        let mut groups = AHashMap::new();
        groups.insert(root, Group::new(None));

        Self {
            groups,
            elements: AHashMap::new(),
            root,
            next_id: 1,
            created: 0,
            released: 0,
        }
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Whether the handle still refers to a live graphics context
    pub fn contains(&self, graphics: GraphicsId) -> bool {
        self.groups.contains_key(&graphics)
    }

    /// Own visibility flag of a graphics context
    pub fn is_visible(&self, graphics: GraphicsId) -> Option<bool> {
        self.groups.get(&graphics).map(|g| g.visible)
    }

    /// Parent of a graphics context
    pub fn parent_of(&self, graphics: GraphicsId) -> Option<GraphicsId> {
        self.groups.get(&graphics).and_then(|g| g.parent)
    }

    /// Child contexts of a graphics context, back to front
    pub fn children(&self, graphics: GraphicsId) -> &[GraphicsId] {
        self.groups.get(&graphics).map(|g| g.children.as_slice()).unwrap_or(&[])
    }

    /// Elements drawn in a graphics context, back to front
    pub fn elements(&self, graphics: GraphicsId) -> &[ElementId] {
        self.groups.get(&graphics).map(|g| g.elements.as_slice()).unwrap_or(&[])
    }

    /// Event names listened for on a graphics context
    pub fn listeners(&self, graphics: GraphicsId) -> Vec<&str> {
        self.groups
            .get(&graphics)
            .map(|g| g.listeners.iter().map(|(name, _)| name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Attributes of an element
    pub fn element_attrs(&self, element: ElementId) -> Option<&Attributes> {
        self.elements.get(&element).map(|e| &e.attrs)
    }

    /// Kind of an element
    pub fn element_kind(&self, element: ElementId) -> Option<&str> {
        self.elements.get(&element).map(|e| e.kind.as_str())
    }

    /// Number of graphics contexts ever created (root excluded)
    pub fn created_count(&self) -> usize {
        self.created
    }

    /// Number of graphics contexts released, including descendants
    pub fn released_count(&self) -> usize {
        self.released
    }

    /// Number of live graphics contexts (root excluded)
    pub fn live_count(&self) -> usize {
        self.groups.len() - 1
    }

    fn release_recursive(&mut self, graphics: GraphicsId) {
        let Some(group) = self.groups.remove(&graphics) else {
            return;
        };
        self.released += 1;
        for element in group.elements {
            self.elements.remove(&element);
        }
        for child in group.children {
            self.release_recursive(child);
        }
    }

    fn restack<T: PartialEq + Copy>(items: &mut Vec<T>, item: T, front: bool) {
        if let Some(pos) = items.iter().position(|i| *i == item) {
            items.remove(pos);
            if front {
                items.push(item);
            } else {
                items.insert(0, item);
            }
        }
    }

    fn move_in_stack(&mut self, graphics: GraphicsId, element: Option<ElementId>, front: bool) {
        match element {
            Some(element) => {
                if let Some(group) = self.groups.get_mut(&graphics) {
                    Self::restack(&mut group.elements, element, front);
                }
            }
            None => {
                let parent = self.parent_of(graphics);
                if let Some(group) = parent.and_then(|p| self.groups.get_mut(&p)) {
                    Self::restack(&mut group.children, graphics, front);
                }
            }
        }
    }
}

impl Canvas for MemoryCanvas {
    fn root(&self) -> GraphicsId {
        self.root
    }

    fn create_graphics(&mut self, parent: GraphicsId) -> Option<GraphicsId> {
        if !self.groups.contains_key(&parent) {
            tracing::debug!("Cannot create graphics under unknown parent {:?}", parent);
            return None;
        }

        let id = GraphicsId(self.allocate());
        self.groups.insert(id, Group::new(Some(parent)));
        if let Some(group) = self.groups.get_mut(&parent) {
            group.children.push(id);
        }
        self.created += 1;
        Some(id)
    }

    fn set_visible(&mut self, graphics: GraphicsId, visible: bool) {
        if let Some(group) = self.groups.get_mut(&graphics) {
            group.visible = visible;
        }
    }

    fn to_front(&mut self, graphics: GraphicsId, element: Option<ElementId>) {
        self.move_in_stack(graphics, element, true);
    }

    fn to_back(&mut self, graphics: GraphicsId, element: Option<ElementId>) {
        self.move_in_stack(graphics, element, false);
    }

    fn release(&mut self, graphics: GraphicsId) {
        if graphics == self.root {
            return;
        }
        if let Some(parent) = self.parent_of(graphics) {
            if let Some(group) = self.groups.get_mut(&parent) {
                group.children.retain(|c| *c != graphics);
            }
        }
        self.release_recursive(graphics);
    }

    fn listen(&mut self, graphics: GraphicsId, event: &str, listener: ListenerKey) {
        if let Some(group) = self.groups.get_mut(&graphics) {
            let entry = (event.to_string(), listener);
            if !group.listeners.contains(&entry) {
                group.listeners.push(entry);
            }
        }
    }

    fn unlisten(&mut self, graphics: GraphicsId, event: &str, listener: ListenerKey) {
        if let Some(group) = self.groups.get_mut(&graphics) {
            group.listeners.retain(|(name, key)| !(name == event && *key == listener));
        }
    }

    fn create_element(&mut self, graphics: GraphicsId, kind: &str, attrs: &Attributes) -> Option<ElementId> {
        if !self.groups.contains_key(&graphics) {
            return None;
        }

        let id = ElementId(self.allocate());
        self.elements.insert(
            id,
            Element {
                graphics,
                kind: kind.to_string(),
                attrs: attrs.clone(),
                binding: None,
            },
        );
        if let Some(group) = self.groups.get_mut(&graphics) {
            group.elements.push(id);
        }
        Some(id)
    }

    fn update_element(&mut self, element: ElementId, attrs: &Attributes) {
        if let Some(e) = self.elements.get_mut(&element) {
            e.attrs = attrs.clone();
        }
    }

    fn bind(&mut self, element: ElementId, binding: Binding) {
        if let Some(e) = self.elements.get_mut(&element) {
            e.binding = Some(binding);
        }
    }

    fn resolve(&self, event: &NativeEvent) -> Option<Binding> {
        let element = self.elements.get(&event.element?)?;
        // events only reach elements whose group listens for them
        let group = self.groups.get(&element.graphics)?;
        if !group.listeners.iter().any(|(name, _)| *name == event.kind) {
            return None;
        }
        element.binding
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_removes_descendants() {
        let mut canvas = MemoryCanvas::new();
        let root = canvas.root();
        let a = canvas.create_graphics(root).unwrap();
        let b = canvas.create_graphics(a).unwrap();
        let e = canvas.create_element(b, "circle", &Attributes::new()).unwrap();

        canvas.release(a);

        assert!(!canvas.contains(a));
        assert!(!canvas.contains(b));
        assert!(canvas.element_attrs(e).is_none());
        assert_eq!(canvas.released_count(), 2);
        assert!(canvas.children(root).is_empty());

        // releasing twice is harmless
        canvas.release(a);
        assert_eq!(canvas.released_count(), 2);
    }

    #[test]
    fn test_restacking() {
        let mut canvas = MemoryCanvas::new();
        let root = canvas.root();
        let a = canvas.create_graphics(root).unwrap();
        let b = canvas.create_graphics(root).unwrap();
        let c = canvas.create_graphics(root).unwrap();

        canvas.to_front(a, None);
        assert_eq!(canvas.children(root), &[b, c, a]);

        canvas.to_back(c, None);
        assert_eq!(canvas.children(root), &[c, b, a]);
    }

    #[test]
    fn test_resolve_requires_listener() {
        let mut canvas = MemoryCanvas::new();
        let g = canvas.create_graphics(canvas.root()).unwrap();
        let e = canvas.create_element(g, "rect", &Attributes::new()).unwrap();
        canvas.bind(e, Binding { node: 7, index: 2 });

        let click = NativeEvent::new("click", Some(e));
        assert_eq!(canvas.resolve(&click), None);

        canvas.listen(g, "click", 1);
        assert_eq!(canvas.resolve(&click), Some(Binding { node: 7, index: 2 }));

        canvas.unlisten(g, "click", 1);
        assert_eq!(canvas.resolve(&click), None);
    }

    #[test]
    fn test_unknown_parent() {
        let mut canvas = MemoryCanvas::new();
        assert_eq!(canvas.create_graphics(GraphicsId(99)), None);
    }
}
