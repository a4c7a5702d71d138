//! In-Memory Host
//!
//! An arena-backed [`Host`] used by tests and as the reference backend.
//! Nodes are never freed; a removed node is simply detached. Every mutation
//! is counted so tests can assert how much work a reconcile did.

use std::fmt;

use indexmap::IndexMap;
use tracing::warn;

use super::host::Host;
use super::props::{Event, EventHandler};

/// Index of a node in a [`MemoryHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(usize);

impl HostId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Debug)]
enum MemoryKind {
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
        listeners: IndexMap<String, EventHandler>,
    },
    Text(String),
}

#[derive(Debug)]
struct MemoryNode {
    kind: MemoryKind,
    parent: Option<HostId>,
    children: Vec<HostId>,
}

/// An in-memory host tree.
#[derive(Debug)]
pub struct MemoryHost {
    nodes: Vec<MemoryNode>,
    root: HostId,
    mutations: usize,
}

impl MemoryHost {
    /// Create a host with an empty root container.
    pub fn new() -> Self {
        let mut host = Self {
            nodes: Vec::new(),
            root: HostId(0),
            mutations: 0,
        };
        host.root = host.alloc(MemoryKind::Element {
            tag: "root".to_string(),
            attributes: IndexMap::new(),
            listeners: IndexMap::new(),
        });
        host
    }

    pub fn root(&self) -> HostId {
        self.root
    }

    fn alloc(&mut self, kind: MemoryKind) -> HostId {
        let id = HostId(self.nodes.len());
        self.nodes.push(MemoryNode {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Number of host mutations performed so far. Node creation does not
    /// count; attaching the created node does.
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    pub fn reset_mutation_count(&mut self) {
        self.mutations = 0;
    }

    pub fn tag(&self, node: HostId) -> Option<&str> {
        match &self.nodes.get(node.0)?.kind {
            MemoryKind::Element { tag, .. } => Some(tag),
            MemoryKind::Text(_) => None,
        }
    }

    pub fn text(&self, node: HostId) -> Option<&str> {
        match &self.nodes.get(node.0)?.kind {
            MemoryKind::Text(text) => Some(text),
            MemoryKind::Element { .. } => None,
        }
    }

    pub fn attribute(&self, node: HostId, name: &str) -> Option<&str> {
        match &self.nodes.get(node.0)?.kind {
            MemoryKind::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            MemoryKind::Text(_) => None,
        }
    }

    pub fn has_listener(&self, node: HostId, event: &str) -> bool {
        match self.nodes.get(node.0).map(|n| &n.kind) {
            Some(MemoryKind::Element { listeners, .. }) => listeners.contains_key(event),
            _ => false,
        }
    }

    pub fn parent(&self, node: HostId) -> Option<HostId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    /// The listener registered on `node` for `event`.
    pub fn listener(&self, node: HostId, event: &str) -> Option<EventHandler> {
        match self.nodes.get(node.0).map(|n| &n.kind) {
            Some(MemoryKind::Element { listeners, .. }) => listeners.get(event).cloned(),
            _ => None,
        }
    }

    /// Deliver `event` to the listener registered on `node`.
    ///
    /// Returns `false` if there is none. Events do not bubble. The handler
    /// runs while the caller borrows the host, so a handler that re-renders
    /// into this same host must be fetched with [`listener`](Self::listener)
    /// and called after the borrow ends.
    pub fn dispatch(&self, node: HostId, event: &Event) -> bool {
        match self.listener(node, &event.name) {
            Some(handler) => {
                handler.call(event);
                true
            }
            None => false,
        }
    }

    /// Render the children of `node` as markup.
    pub fn inner_markup(&self, node: HostId) -> String {
        let mut out = String::new();
        if let Some(n) = self.nodes.get(node.0) {
            for child in &n.children {
                self.write_markup(*child, &mut out);
            }
        }
        out
    }

    /// Render `node` and its subtree as markup.
    pub fn markup(&self, node: HostId) -> String {
        let mut out = String::new();
        self.write_markup(node, &mut out);
        out
    }

    fn write_markup(&self, node: HostId, out: &mut String) {
        let Some(n) = self.nodes.get(node.0) else {
            return;
        };
        match &n.kind {
            MemoryKind::Text(text) => out.push_str(&escape(text)),
            MemoryKind::Element { tag, attributes, .. } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    if !value.is_empty() {
                        out.push_str("=\"");
                        out.push_str(&escape(value));
                        out.push('"');
                    }
                }
                out.push('>');
                for child in &n.children {
                    self.write_markup(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    fn element_mut(&mut self, node: HostId) -> Option<(&mut IndexMap<String, String>, &mut IndexMap<String, EventHandler>)> {
        match self.nodes.get_mut(node.0).map(|n| &mut n.kind) {
            Some(MemoryKind::Element {
                attributes,
                listeners,
                ..
            }) => Some((attributes, listeners)),
            _ => {
                warn!(node = %node, "expected an element node");
                None
            }
        }
    }

    fn detach(&mut self, child: HostId) {
        let Some(parent) = self.nodes.get(child.0).and_then(|n| n.parent) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.nodes.get_mut(child.0) {
            c.parent = None;
        }
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl Host for MemoryHost {
    type Node = HostId;

    fn create_element(&mut self, tag: &str) -> HostId {
        self.alloc(MemoryKind::Element {
            tag: tag.to_string(),
            attributes: IndexMap::new(),
            listeners: IndexMap::new(),
        })
    }

    fn create_text(&mut self, text: &str) -> HostId {
        self.alloc(MemoryKind::Text(text.to_string()))
    }

    fn set_text(&mut self, node: &HostId, text: &str) {
        match self.nodes.get_mut(node.0).map(|n| &mut n.kind) {
            Some(MemoryKind::Text(current)) => {
                *current = text.to_string();
                self.mutations += 1;
            }
            _ => warn!(node = %node, "set_text on a non-text node"),
        }
    }

    fn set_attribute(&mut self, node: &HostId, name: &str, value: &str) {
        if let Some((attributes, _)) = self.element_mut(*node) {
            attributes.insert(name.to_string(), value.to_string());
            self.mutations += 1;
        }
    }

    fn remove_attribute(&mut self, node: &HostId, name: &str) {
        if let Some((attributes, _)) = self.element_mut(*node) {
            if attributes.shift_remove(name).is_some() {
                self.mutations += 1;
            }
        }
    }

    fn add_listener(&mut self, node: &HostId, event: &str, handler: EventHandler) {
        if let Some((_, listeners)) = self.element_mut(*node) {
            listeners.insert(event.to_string(), handler);
            self.mutations += 1;
        }
    }

    fn remove_listener(&mut self, node: &HostId, event: &str) {
        if let Some((_, listeners)) = self.element_mut(*node) {
            if listeners.shift_remove(event).is_some() {
                self.mutations += 1;
            }
        }
    }

    fn children(&self, parent: &HostId) -> Vec<HostId> {
        self.nodes
            .get(parent.0)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn insert_child(&mut self, parent: &HostId, child: &HostId, index: usize) {
        if parent.0 >= self.nodes.len() || child.0 >= self.nodes.len() {
            warn!(parent = %parent, child = %child, "insert with an unknown node");
            return;
        }
        self.detach(*child);
        let siblings = &mut self.nodes[parent.0].children;
        let index = index.min(siblings.len());
        siblings.insert(index, *child);
        self.nodes[child.0].parent = Some(*parent);
        self.mutations += 1;
    }

    fn remove_child(&mut self, parent: &HostId, child: &HostId) {
        if self.parent(*child) != Some(*parent) {
            warn!(parent = %parent, child = %child, "remove of a node that is not a child");
            return;
        }
        self.detach(*child);
        self.mutations += 1;
    }

    fn move_child(&mut self, parent: &HostId, child: &HostId, index: usize) {
        if self.parent(*child) != Some(*parent) {
            warn!(parent = %parent, child = %child, "move of a node that is not a child");
            return;
        }
        let siblings = &mut self.nodes[parent.0].children;
        siblings.retain(|c| c != child);
        let index = index.min(siblings.len());
        siblings.insert(index, *child);
        self.mutations += 1;
    }
}
