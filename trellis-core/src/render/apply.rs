//! Patch Application
//!
//! Executes a patch list against a [`Host`] and materializes new subtrees.

use tracing::trace;

use super::host::Host;
use super::patch::{NodeChange, Patch};
use super::props::{event_name, PropValue};
use super::vnode::VNode;

/// Apply `patches` in order.
pub fn apply<H: Host>(host: &mut H, patches: &[Patch<H::Node>]) {
    for patch in patches {
        trace!(kind = patch.kind(), "applying patch");
        match patch {
            Patch::Insert {
                parent,
                index,
                node,
            } => {
                let nodes = materialize(host, node);
                insert_all(host, parent, &nodes, *index);
            }
            Patch::Remove { parent, target, .. } => host.remove_child(parent, target),
            Patch::Replace {
                parent,
                index,
                target,
                node,
            } => {
                let nodes = materialize(host, node);
                host.remove_child(parent, target);
                insert_all(host, parent, &nodes, *index);
            }
            Patch::Move {
                parent, target, to, ..
            } => host.move_child(parent, target, *to),
            Patch::Update { target, change } => apply_change(host, target, change),
        }
    }
}

fn insert_all<H: Host>(host: &mut H, parent: &H::Node, nodes: &[H::Node], index: usize) {
    for (offset, node) in nodes.iter().enumerate() {
        host.insert_child(parent, node, index + offset);
    }
}

/// Build detached host nodes for `node`.
///
/// A fragment yields its flattened children; everything else yields one node.
pub fn materialize<H: Host>(host: &mut H, node: &VNode) -> Vec<H::Node> {
    let mut out = Vec::with_capacity(node.host_len());
    materialize_into(host, node, &mut out);
    out
}

fn materialize_into<H: Host>(host: &mut H, node: &VNode, out: &mut Vec<H::Node>) {
    match node {
        VNode::Text(text) => out.push(host.create_text(text)),
        VNode::Element(element) => {
            let created = host.create_element(&element.tag);
            for (name, value) in element.props.host_props() {
                if !matches!(value, PropValue::Bool(false)) {
                    set_prop(host, &created, name, value);
                }
            }

            let mut children = Vec::new();
            for child in &element.children {
                materialize_into(host, child, &mut children);
            }
            insert_all(host, &created, &children, 0);
            out.push(created);
        }
        VNode::Fragment(fragment) => {
            for child in &fragment.children {
                materialize_into(host, child, out);
            }
        }
    }
}

fn apply_change<H: Host>(host: &mut H, target: &H::Node, change: &NodeChange) {
    match change {
        NodeChange::Text(text) => host.set_text(target, text),
        NodeChange::SetProp { name, value } => set_prop(host, target, name, value),
        NodeChange::RemoveProp { name, value } => match value {
            PropValue::Handler(_) => host.remove_listener(target, &event_name(name)),
            _ => host.remove_attribute(target, name),
        },
    }
}

fn set_prop<H: Host>(host: &mut H, target: &H::Node, name: &str, value: &PropValue) {
    match value {
        PropValue::Handler(handler) => host.add_listener(target, &event_name(name), handler.clone()),
        other => match other.to_attribute() {
            Some(attribute) => host.set_attribute(target, name, &attribute),
            None => host.remove_attribute(target, name),
        },
    }
}
