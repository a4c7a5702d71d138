//! Mounting
//!
//! Glue between the reactive graph and the reconciler: an effect renders a
//! tree, reconciles it against the tree it rendered last time and keeps the
//! new one. Any signal the render closure reads re-renders the mount when
//! it changes.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::ReconcileError;
use crate::reactive::{Effect, Runtime};

use super::diff::Reconciler;
use super::host::Host;
use super::vnode::VNode;

/// A live mount. Like any effect, it keeps rendering until
/// [`unmount`](Self::unmount) or [`Runtime::dispose`]; dropping the handle
/// does not stop it.
pub struct Mount<H: Host> {
    effect: Effect,
    host: Arc<Mutex<H>>,
    container: H::Node,
    tree: Arc<Mutex<Option<VNode>>>,
    reconciler: Reconciler,
}

/// Render `render()` into `container` and keep it up to date.
///
/// Duplicate keys follow the runtime's configured [`KeyPolicy`](crate::config::KeyPolicy).
/// A render that fails to reconcile is logged like any failing effect and
/// leaves the host showing the previous tree.
///
/// The host lock is taken while reconciling, so event handlers that write
/// signals must not run while the caller holds it.
pub fn mount<H, F>(runtime: &Runtime, host: Arc<Mutex<H>>, container: H::Node, render: F) -> Mount<H>
where
    H: Host + Send + 'static,
    H::Node: Send + Sync + 'static,
    F: Fn() -> Option<VNode> + Send + Sync + 'static,
{
    let reconciler = Reconciler::new(runtime.config().key_policy);
    let tree: Arc<Mutex<Option<VNode>>> = Arc::new(Mutex::new(None));

    let effect = {
        let host = Arc::clone(&host);
        let container = container.clone();
        let tree = Arc::clone(&tree);
        runtime.effect(move || -> Result<(), ReconcileError> {
            let next = render();
            let mut previous = tree.lock();
            let patches =
                reconciler.reconcile(&mut *host.lock(), &container, previous.as_ref(), next.as_ref())?;
            debug!(patches = patches.len(), "rendered");
            *previous = next;
            Ok(())
        })
    };

    Mount {
        effect,
        host,
        container,
        tree,
        reconciler,
    }
}

impl<H: Host> Mount<H> {
    /// Stop re-rendering and remove the rendered tree from the container.
    pub fn unmount(self) -> Result<(), ReconcileError> {
        self.effect.stop();

        let mut tree = self.tree.lock();
        if let Some(previous) = tree.take() {
            self.reconciler
                .reconcile(&mut *self.host.lock(), &self.container, Some(&previous), None)?;
        }
        Ok(())
    }

    /// The tree currently rendered into the host.
    pub fn tree(&self) -> Option<VNode> {
        self.tree.lock().clone()
    }

    pub fn container(&self) -> &H::Node {
        &self.container
    }

    /// Number of renders so far, including the initial one.
    pub fn render_count(&self) -> usize {
        self.effect.run_count()
    }

    pub fn is_mounted(&self) -> bool {
        self.effect.is_active()
    }
}

impl<H: Host> fmt::Debug for Mount<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("container", &self.container)
            .field("effect", &self.effect)
            .finish()
    }
}
