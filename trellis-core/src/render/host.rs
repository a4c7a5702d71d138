//! Host Abstraction
//!
//! The reconciler never touches a concrete tree. It reads and mutates the
//! live tree through [`Host`], so the same diff drives a DOM, a terminal
//! canvas or the in-memory tree used by tests.
//!
//! Host nodes carry no framework metadata. The reconciler recovers which
//! host node belongs to which descriptor from tree position and key, using a
//! snapshot of each parent's children taken before mutating it.

use std::fmt::Debug;

use super::props::EventHandler;

/// A mutable host tree.
pub trait Host {
    /// Handle to a host node. Equal handles name the same node.
    type Node: Clone + PartialEq + Debug;

    fn create_element(&mut self, tag: &str) -> Self::Node;

    fn create_text(&mut self, text: &str) -> Self::Node;

    fn set_text(&mut self, node: &Self::Node, text: &str);

    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str);

    fn remove_attribute(&mut self, node: &Self::Node, name: &str);

    /// Register `handler` for `event`, replacing any previous listener for it.
    fn add_listener(&mut self, node: &Self::Node, event: &str, handler: EventHandler);

    fn remove_listener(&mut self, node: &Self::Node, event: &str);

    /// Snapshot of `parent`'s children, in order.
    fn children(&self, parent: &Self::Node) -> Vec<Self::Node>;

    /// Insert `child` so that it ends up at `index`.
    fn insert_child(&mut self, parent: &Self::Node, child: &Self::Node, index: usize);

    fn remove_child(&mut self, parent: &Self::Node, child: &Self::Node);

    /// Move an attached child to `index`, counted after removing it from its
    /// current position.
    fn move_child(&mut self, parent: &Self::Node, child: &Self::Node, index: usize) {
        self.remove_child(parent, child);
        self.insert_child(parent, child, index);
    }
}
