//! Virtual Nodes
//!
//! A [`VNode`] is an immutable description of a host node. Trees are built
//! fresh on every render, compared against the previous tree by the
//! reconciler, then dropped.

use std::fmt;
use std::sync::Arc;

use super::props::Props;

/// Sibling identity used to match children across renders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Arc<str>);

impl Key {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Self(Arc::from(key))
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

macro_rules! key_from_integer {
    ($($int:ty),*) => {
        $(
            impl From<$int> for Key {
                fn from(key: $int) -> Self {
                    Self(Arc::from(key.to_string()))
                }
            }
        )*
    };
}

key_from_integer!(i32, i64, u32, u64, usize);

/// A node descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum VNode {
    /// A text node. Text nodes are matched by position only.
    Text(String),
    Element(Element),
    /// A group of siblings with no host node of its own.
    Fragment(Fragment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub props: Props,
    pub children: Vec<VNode>,
    pub key: Option<Key>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub children: Vec<VNode>,
    pub key: Option<Key>,
}

/// Create a text node.
pub fn text(value: impl Into<String>) -> VNode {
    VNode::Text(value.into())
}

/// Create an element node.
pub fn element(tag: impl Into<String>, props: Props, children: Vec<VNode>) -> VNode {
    VNode::Element(Element {
        tag: tag.into(),
        props,
        children,
        key: None,
    })
}

/// Create a fragment.
pub fn fragment(children: Vec<VNode>) -> VNode {
    VNode::Fragment(Fragment {
        children,
        key: None,
    })
}

impl VNode {
    /// Attach a key. Text nodes cannot carry one and are returned unchanged.
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        match &mut self {
            VNode::Element(element) => element.key = Some(key.into()),
            VNode::Fragment(fragment) => fragment.key = Some(key.into()),
            VNode::Text(_) => {}
        }
        self
    }

    pub fn key(&self) -> Option<&Key> {
        match self {
            VNode::Element(element) => element.key.as_ref(),
            VNode::Fragment(fragment) => fragment.key.as_ref(),
            VNode::Text(_) => None,
        }
    }

    /// Children of an element or fragment; empty for text.
    pub fn children(&self) -> &[VNode] {
        match self {
            VNode::Element(element) => &element.children,
            VNode::Fragment(fragment) => &fragment.children,
            VNode::Text(_) => &[],
        }
    }

    /// Number of host nodes this descriptor occupies in its parent.
    ///
    /// Fragments are flattened, so an empty fragment occupies none.
    pub fn host_len(&self) -> usize {
        match self {
            VNode::Text(_) | VNode::Element(_) => 1,
            VNode::Fragment(fragment) => fragment.children.iter().map(VNode::host_len).sum(),
        }
    }

    /// Check whether `other` can be updated in place of `self`.
    pub fn same_kind(&self, other: &VNode) -> bool {
        match (self, other) {
            (VNode::Text(_), VNode::Text(_)) => true,
            (VNode::Element(a), VNode::Element(b)) => a.tag == b.tag,
            (VNode::Fragment(_), VNode::Fragment(_)) => true,
            _ => false,
        }
    }
}

impl From<&str> for VNode {
    fn from(value: &str) -> Self {
        text(value)
    }
}

impl From<String> for VNode {
    fn from(value: String) -> Self {
        text(value)
    }
}
