//! Per-layer intrusive node list
//!
//! The links live on the nodes themselves (`prev`/`next`), the list only keeps
//! head, tail and length. Insert-after and unlink are O(1).

use crate::node::{NodeId, NodeStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeList {
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl NodeList {
    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    pub fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Link `id` after `anchor`, or at the head when `anchor` is `None`
    pub(crate) fn insert_after(&mut self, store: &mut NodeStore, anchor: Option<NodeId>, id: NodeId) {
        let next = match anchor {
            Some(anchor) => store.get(anchor).and_then(|n| n.next),
            None => self.head,
        };

        if let Some(node) = store.get_mut(id) {
            node.prev = anchor;
            node.next = next;
        }
        match anchor {
            Some(anchor) => {
                if let Some(a) = store.get_mut(anchor) {
                    a.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        match next {
            Some(next) => {
                if let Some(n) = store.get_mut(next) {
                    n.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
        self.len += 1;
    }

    pub(crate) fn push_back(&mut self, store: &mut NodeStore, id: NodeId) {
        let tail = self.tail;
        self.insert_after(store, tail, id);
    }

    /// Remove `id` from the list, leaving its own links cleared
    pub(crate) fn unlink(&mut self, store: &mut NodeStore, id: NodeId) {
        let Some(node) = store.get_mut(id) else {
            return;
        };
        let (prev, next) = (node.prev.take(), node.next.take());

        match prev {
            Some(prev) => {
                if let Some(p) = store.get_mut(prev) {
                    p.next = next;
                }
            }
            None => {
                if self.head != Some(id) {
                    // not linked here
                    return;
                }
                self.head = next;
            }
        }
        match next {
            Some(next) => {
                if let Some(n) = store.get_mut(next) {
                    n.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        self.len -= 1;
    }

    /// Forget every node without touching their links
    ///
    /// Only valid when all of the current nodes are being destroyed.
    pub(crate) fn clear(&mut self) {
        *self = NodeList::default();
    }

    /// Rewrite the links so the list holds exactly `order`
    pub(crate) fn relink(&mut self, store: &mut NodeStore, order: &[NodeId]) {
        for (i, id) in order.iter().enumerate() {
            if let Some(node) = store.get_mut(*id) {
                node.prev = i.checked_sub(1).map(|p| order[p]);
                node.next = order.get(i + 1).copied();
            }
        }
        self.head = order.first().copied();
        self.tail = order.last().copied();
        self.len = order.len();
    }

    /// Walk the list, re-reading `next` at every step
    pub fn iter<'a>(&self, store: &'a NodeStore) -> ListIter<'a> {
        ListIter { store, next: self.head }
    }
}

/// Forward traversal of a node list
pub struct ListIter<'a> {
    store: &'a NodeStore,
    next: Option<NodeId>,
}

impl<'a> ListIter<'a> {
    pub(crate) fn from_head(store: &'a NodeStore, head: Option<NodeId>) -> Self {
        Self { store, next: head }
    }
}

impl Iterator for ListIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.store.get(current).and_then(|n| n.next);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn nodes(store: &mut NodeStore, n: usize) -> Vec<NodeId> {
        (0..n).map(|i| store.create(None, None, Arc::new(json!(i)))).collect()
    }

    fn backward(list: &NodeList, store: &NodeStore) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = list.tail();
        while let Some(id) = cur {
            out.push(id);
            cur = store.get(id).and_then(|n| n.prev());
        }
        out.reverse();
        out
    }

    #[test]
    fn test_push_and_unlink() {
        let mut store = NodeStore::new();
        let ids = nodes(&mut store, 4);
        let mut list = NodeList::default();
        for id in &ids {
            list.push_back(&mut store, *id);
        }
        assert_eq!(list.iter(&store).collect::<Vec<_>>(), ids);
        assert_eq!(list.len(), 4);

        list.unlink(&mut store, ids[0]);
        list.unlink(&mut store, ids[2]);
        list.unlink(&mut store, ids[3]);
        assert_eq!(list.iter(&store).collect::<Vec<_>>(), vec![ids[1]]);
        assert_eq!(backward(&list, &store), vec![ids[1]]);
        assert_eq!(list.len(), 1);
        assert_eq!(list.head(), list.tail());

        // unlinking twice does nothing
        list.unlink(&mut store, ids[0]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_insert_after() {
        let mut store = NodeStore::new();
        let ids = nodes(&mut store, 3);
        let mut list = NodeList::default();
        list.push_back(&mut store, ids[0]);
        list.insert_after(&mut store, None, ids[1]);
        list.insert_after(&mut store, Some(ids[1]), ids[2]);

        let expected = vec![ids[1], ids[2], ids[0]];
        assert_eq!(list.iter(&store).collect::<Vec<_>>(), expected);
        assert_eq!(backward(&list, &store), expected);
    }

    #[test]
    fn test_relink() {
        let mut store = NodeStore::new();
        let ids = nodes(&mut store, 3);
        let mut list = NodeList::default();
        for id in &ids {
            list.push_back(&mut store, *id);
        }

        let order = vec![ids[2], ids[0]];
        list.relink(&mut store, &order);
        assert_eq!(list.iter(&store).collect::<Vec<_>>(), order);
        assert_eq!(backward(&list, &store), order);
        assert_eq!(list.len(), 2);
    }
}
