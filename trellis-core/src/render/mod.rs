//! Rendering
//!
//! This module implements the virtual tree and its reconciler.
//!
//! # Overview
//!
//! - [`VNode`] trees describe what a host tree should look like. They are
//!   built with [`text`], [`element`] and [`fragment`].
//! - A [`Reconciler`] compares the previous tree with the next one against
//!   the live tree behind a [`Host`], producing an ordered list of
//!   [`Patch`]es, and applies them.
//! - [`mount`] ties a render closure to the reactive graph so the host is
//!   reconciled whenever a signal the closure read changes.
//!
//! [`MemoryHost`] is a complete in-memory host, used by the tests.

mod apply;
mod diff;
mod host;
mod memory;
mod mount;
mod order;
mod patch;
mod props;
mod vnode;

pub use apply::{apply, materialize};
pub use diff::{reconcile, Reconciler};
pub use host::Host;
pub use memory::{HostId, MemoryHost};
pub use mount::{mount, Mount};
pub use patch::{NodeChange, Patch};
pub use props::{event_name, is_reserved, Event, EventHandler, PropValue, Props, RESERVED_PROPS};
pub use vnode::{element, fragment, text, Element, Fragment, Key, VNode};
