//! Reactive Sources
//!
//! [`Reactive`] lets an API accept "a signal or a computed" without caring
//! which one it got. Plain values are not reactive; wrap them in a signal.

use std::fmt::{self, Debug};

use crate::graph::NodeId;

use super::computed::Computed;
use super::signal::Signal;

/// Something that can be read reactively.
pub enum Reactive<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Signal(Signal<T>),
    Computed(Computed<T>),
}

impl<T> Reactive<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Read the current value, tracking the read.
    pub fn get(&self) -> T {
        match self {
            Reactive::Signal(signal) => signal.get(),
            Reactive::Computed(computed) => computed.get(),
        }
    }

    /// Read the current value without tracking.
    pub fn peek(&self) -> T {
        match self {
            Reactive::Signal(signal) => signal.peek(),
            Reactive::Computed(computed) => computed.peek(),
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            Reactive::Signal(signal) => signal.id(),
            Reactive::Computed(computed) => computed.id(),
        }
    }

    /// The underlying signal, if this is one. Only signals are writable.
    pub fn as_signal(&self) -> Option<&Signal<T>> {
        match self {
            Reactive::Signal(signal) => Some(signal),
            Reactive::Computed(_) => None,
        }
    }
}

impl<T> Clone for Reactive<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        match self {
            Reactive::Signal(signal) => Reactive::Signal(signal.clone()),
            Reactive::Computed(computed) => Reactive::Computed(computed.clone()),
        }
    }
}

impl<T> From<Signal<T>> for Reactive<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn from(signal: Signal<T>) -> Self {
        Reactive::Signal(signal)
    }
}

impl<T> From<Computed<T>> for Reactive<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn from(computed: Computed<T>) -> Self {
        Reactive::Computed(computed)
    }
}

impl<T> Debug for Reactive<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reactive::Signal(signal) => f.debug_tuple("Signal").field(signal).finish(),
            Reactive::Computed(computed) => f.debug_tuple("Computed").field(computed).finish(),
        }
    }
}
